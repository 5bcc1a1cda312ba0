//! ---
//! hps_section: "07-resilience-fault-tolerance"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Safety interlock evaluation and source arbitration."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Threshold-driven safety state machine for the wind generator and the
//! source arbitration policy. Everything in this crate is a pure function
//! of a telemetry snapshot plus configuration, which keeps protection
//! decisions deterministic and testable.

pub mod arbitration;
pub mod assessment;
pub mod evaluator;

/// Shared result type for safety operations.
pub type Result<T> = std::result::Result<T, SafetyError>;

/// Errors raised by operator-facing safety checks.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SafetyError {
    /// Brake release refused: one or more checks are still at or above
    /// their warning threshold.
    #[error("unsafe to release brake: {}", reasons.join("; "))]
    UnsafeToRelease {
        /// The offending checks, with measured values and thresholds.
        reasons: Vec<String>,
    },
}

pub use arbitration::{classify, RoutingPriority, RENEWABLES_COVERAGE_THRESHOLD};
pub use assessment::{DangerLevel, ProtectiveAction, SafetyAssessment};
pub use evaluator::{check_release, evaluate};
