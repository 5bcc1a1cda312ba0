//! ---
//! hps_section: "01-core-functionality"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Primary orchestration and lifecycle management."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Supervisor runtime tying the snapshot store, command protocol, and
//! safety evaluator together: one evaluation task per device, one ack
//! pump, and an operator surface on the returned handle.

pub mod board;
pub mod supervisor;

use hps_common::ThresholdError;
use hps_protocol::CommandError;
use hps_safety::SafetyError;
use hps_telemetry::TelemetryError;

/// Shared result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors surfaced through the operator surface.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The target device is not registered.
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    /// No telemetry has been ingested for the device yet, so a request
    /// that needs current conditions cannot be honoured.
    #[error("no telemetry available for device {0}")]
    NoTelemetry(String),
    /// Replacement thresholds violate a structural invariant.
    #[error(transparent)]
    InvalidThresholds(#[from] ThresholdError),
    /// Refused by the safety interlock.
    #[error(transparent)]
    Safety(#[from] SafetyError),
    /// Failure in the command protocol.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Failure in the snapshot store.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

pub use board::ObservationBoard;
pub use supervisor::{ReleaseSequence, Supervisor, SupervisorHandle};
