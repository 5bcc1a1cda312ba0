//! ---
//! hps_section: "02-messaging-ipc-data-model"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Telemetry snapshot schema and snapshot store."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Telemetry snapshot model and the point-in-time snapshot store shared by
//! the evaluator, the arbitration policy, and the display layer.

pub mod snapshot;
pub mod store;

/// Shared result type for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by the snapshot store.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TelemetryError {
    /// A snapshot or relay confirmation referenced a device that was never
    /// registered (or has been removed).
    #[error("unknown device: {0}")]
    UnknownDevice(String),
}

pub use snapshot::{Relay, RelayState, TelemetrySnapshot};
pub use store::SnapshotStore;
