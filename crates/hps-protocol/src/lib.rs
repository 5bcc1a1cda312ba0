//! ---
//! hps_section: "02-messaging-ipc-data-model"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Command dispatch and acknowledgment protocol."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Request/acknowledgment handshake for actuating relays on a remote
//! hybrid controller: bounded-budget ack waits, per-relay dispatch
//! exclusivity, and idempotent acknowledgment delivery.

pub mod ack;
pub mod command;
pub mod dispatcher;
pub mod pending;
pub mod transport;

/// Shared result type for protocol operations.
pub type Result<T> = std::result::Result<T, CommandError>;

/// Errors raised by the dispatcher and acknowledgment tracker.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The target device is not registered with the snapshot store.
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    /// The command/parameter combination is outside the fixed vocabulary.
    #[error("invalid command {command}: {reason}")]
    InvalidCommand {
        /// Offending command name.
        command: command::CommandName,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// A dispatch for the same `(device, command)` pair is still awaiting
    /// its acknowledgment; racing relay toggles are refused.
    #[error("command {command} already pending for device {device_id}")]
    CommandAlreadyPending {
        /// Target device.
        device_id: String,
        /// Command already in flight.
        command: command::CommandName,
    },
    /// No dispatched command carries this identifier.
    #[error("unknown command id: {0}")]
    UnknownCommandId(command::CommandId),
    /// `await_ack` was already called for this command; a command has a
    /// single waiter.
    #[error("acknowledgment for command {0} is already being awaited")]
    AlreadyAwaited(command::CommandId),
    /// Underlying transport failure.
    #[error(transparent)]
    Transport(#[from] transport::TransportError),
}

pub use ack::{AckNotification, AckStatus, AckTracker};
pub use command::{
    CommandFrame, CommandId, CommandName, CommandOutcome, CommandState, PendingCommand,
    RelayAction,
};
pub use dispatcher::CommandDispatcher;
pub use pending::PendingTable;
pub use transport::{InMemoryTransport, Transport, TransportError, WebSocketTransport};
