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
use std::time::Duration;

use tracing::{info, warn};

use hps_common::ProtocolConfig;
use hps_telemetry::SnapshotStore;

use crate::command::{CommandFrame, CommandId, CommandName, CommandOutcome, RelayAction};
use crate::pending::PendingTable;
use crate::transport::Transport;
use crate::{CommandError, Result};

/// Sends actuation requests to remote devices and exposes the bounded
/// acknowledgment wait.
///
/// Dispatch never blocks on the device: the pending command is allocated,
/// the frame handed to the transport, and the id returned. No automatic
/// retry happens here; a `timed_out` or `failed` outcome is surfaced for
/// the operator or a policy layered on top.
pub struct CommandDispatcher {
    store: Arc<SnapshotStore>,
    transport: Arc<dyn Transport>,
    table: Arc<PendingTable>,
    ack_timeout: Duration,
}

impl CommandDispatcher {
    /// Build a dispatcher over the shared store, transport, and table.
    pub fn new(
        store: Arc<SnapshotStore>,
        transport: Arc<dyn Transport>,
        table: Arc<PendingTable>,
        config: &ProtocolConfig,
    ) -> Self {
        Self {
            store,
            transport,
            table,
            ack_timeout: config.ack_timeout,
        }
    }

    /// Dispatch a command and return its identifier immediately.
    ///
    /// A transport send failure resolves the command `failed` on the spot;
    /// the id is still returned so the terminal state stays observable.
    pub fn dispatch(
        &self,
        device_id: &str,
        command: CommandName,
        parameter: Option<RelayAction>,
    ) -> Result<CommandId> {
        if !self.store.contains(device_id) {
            return Err(CommandError::UnknownDevice(device_id.to_owned()));
        }
        validate_parameter(command, parameter)?;

        let command_id = self.table.allocate(device_id, command, parameter)?;
        let frame = CommandFrame::new(command_id, command, parameter);
        match self.transport.send(device_id, &frame) {
            Ok(()) => {
                info!(
                    device = device_id,
                    command_id,
                    command = %command,
                    parameter = ?parameter,
                    transport = self.transport.name(),
                    "command dispatched"
                );
            }
            Err(err) => {
                warn!(
                    device = device_id,
                    command_id,
                    command = %command,
                    error = %err,
                    "transport send failed; command marked failed"
                );
                self.table.resolve(command_id, CommandOutcome::Failed);
            }
        }
        Ok(command_id)
    }

    /// Wait for the command's acknowledgment with the configured budget.
    pub async fn await_ack(&self, command_id: CommandId) -> Result<CommandOutcome> {
        self.table.await_ack(command_id, self.ack_timeout).await
    }

    /// Wait for the command's acknowledgment with an explicit budget.
    pub async fn await_ack_with_timeout(
        &self,
        command_id: CommandId,
        timeout: Duration,
    ) -> Result<CommandOutcome> {
        self.table.await_ack(command_id, timeout).await
    }

    /// The shared pending table (for the ack tracker and observers).
    pub fn table(&self) -> Arc<PendingTable> {
        self.table.clone()
    }

    /// The configured acknowledgment budget.
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }
}

fn validate_parameter(command: CommandName, parameter: Option<RelayAction>) -> Result<()> {
    match (command, parameter) {
        (CommandName::AllOff, None) => Ok(()),
        (CommandName::AllOff, Some(_)) => Err(CommandError::InvalidCommand {
            command,
            reason: "all_off takes no parameter",
        }),
        (_, Some(_)) => Ok(()),
        (_, None) => Err(CommandError::InvalidCommand {
            command,
            reason: "relay commands require an on/off parameter",
        }),
    }
}
