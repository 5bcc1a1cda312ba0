//! ---
//! hps_section: "02-messaging-ipc-data-model"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Command dispatch and acknowledgment protocol."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{CommandId, CommandOutcome, CommandState};
use crate::pending::PendingTable;
use crate::transport::Transport;

/// Acknowledgment verdict reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Command received and applied.
    Acked,
    /// Command received but refused by the device.
    Rejected,
}

/// Inbound acknowledgment notification, pushed or polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckNotification {
    /// Identifier echoed from the command frame.
    pub command_id: CommandId,
    /// Device verdict.
    pub status: AckStatus,
}

/// Matches inbound acknowledgments to outstanding dispatched commands.
#[derive(Clone)]
pub struct AckTracker {
    table: Arc<PendingTable>,
}

impl AckTracker {
    /// Build a tracker over the shared pending table.
    pub fn new(table: Arc<PendingTable>) -> Self {
        Self { table }
    }

    /// Apply one acknowledgment notification.
    ///
    /// Acks for unknown or already-terminal commands are logged and
    /// dropped; delivering the same ack twice leaves the terminal state
    /// unchanged.
    pub fn deliver(&self, notification: AckNotification) {
        let outcome = match notification.status {
            AckStatus::Acked => CommandOutcome::Acked,
            AckStatus::Rejected => CommandOutcome::Failed,
        };
        match self.table.resolve(notification.command_id, outcome) {
            Some(CommandState::Acked) => {
                info!(command_id = notification.command_id, "command acknowledged");
            }
            Some(state) => {
                warn!(command_id = notification.command_id, state = %state, "command rejected by device");
            }
            None => {
                debug!(
                    command_id = notification.command_id,
                    status = ?notification.status,
                    "late or unknown acknowledgment ignored"
                );
            }
        }
    }

    /// Drain every acknowledgment the transport currently holds.
    pub fn drain(&self, transport: &dyn Transport) -> usize {
        let mut delivered = 0;
        while let Some(notification) = transport.poll_ack() {
            self.deliver(notification);
            delivered += 1;
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandName, RelayAction};

    #[test]
    fn duplicate_ack_leaves_terminal_state_unchanged() {
        let table = Arc::new(PendingTable::new());
        let tracker = AckTracker::new(table.clone());
        let id = table
            .allocate("dev1", CommandName::Wind, Some(RelayAction::Off))
            .expect("allocate");

        let ack = AckNotification {
            command_id: id,
            status: AckStatus::Acked,
        };
        tracker.deliver(ack);
        tracker.deliver(ack);

        assert_eq!(
            table.command(id).expect("tracked").state,
            CommandState::Acked
        );
    }

    #[test]
    fn rejected_ack_fails_the_command() {
        let table = Arc::new(PendingTable::new());
        let tracker = AckTracker::new(table.clone());
        let id = table
            .allocate("dev1", CommandName::Brake, Some(RelayAction::On))
            .expect("allocate");

        tracker.deliver(AckNotification {
            command_id: id,
            status: AckStatus::Rejected,
        });

        assert_eq!(
            table.command(id).expect("tracked").state,
            CommandState::Failed
        );
    }

    #[test]
    fn unknown_ack_is_ignored() {
        let table = Arc::new(PendingTable::new());
        let tracker = AckTracker::new(table);
        tracker.deliver(AckNotification {
            command_id: 404,
            status: AckStatus::Acked,
        });
    }
}
