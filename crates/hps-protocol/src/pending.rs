//! ---
//! hps_section: "02-messaging-ipc-data-model"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Command dispatch and acknowledgment protocol."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::command::{CommandId, CommandName, CommandOutcome, PendingCommand, RelayAction};
use crate::{CommandError, Result};

/// How many resolved commands are retained per device. Older terminal
/// entries are evicted so a device stuck in a dispatch/timeout loop
/// cannot grow the table for the life of the daemon.
const TERMINAL_HISTORY_PER_DEVICE: usize = 64;

#[derive(Debug, Default)]
struct TableState {
    next_id: CommandId,
    commands: HashMap<CommandId, PendingCommand>,
    outcomes: HashMap<CommandId, CommandOutcome>,
    waiters: HashMap<CommandId, oneshot::Sender<CommandOutcome>>,
    receivers: HashMap<CommandId, oneshot::Receiver<CommandOutcome>>,
    in_flight: HashMap<(String, CommandName), CommandId>,
}

impl TableState {
    /// Evict the oldest terminal commands of `device_id` beyond the
    /// retention cap. Non-terminal entries are never touched.
    fn prune_terminal_history(&mut self, device_id: &str) {
        let mut terminal: Vec<CommandId> = self
            .commands
            .values()
            .filter(|c| c.device_id == device_id && c.state.is_terminal())
            .map(|c| c.command_id)
            .collect();
        if terminal.len() <= TERMINAL_HISTORY_PER_DEVICE {
            return;
        }
        terminal.sort_unstable();
        let excess = terminal.len() - TERMINAL_HISTORY_PER_DEVICE;
        for command_id in terminal.into_iter().take(excess) {
            self.commands.remove(&command_id);
            self.outcomes.remove(&command_id);
        }
    }
}

/// Tracks every dispatched command from allocation until resolution.
///
/// The single mutex is the arbitration point for the ack/timeout race:
/// whichever event locks first performs the one allowed transition out of
/// `awaiting_ack`; the loser finds a terminal state and is discarded.
#[derive(Debug, Default)]
pub struct PendingTable {
    inner: Mutex<TableState>,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new pending command in `awaiting_ack`.
    ///
    /// Fails with [`CommandError::CommandAlreadyPending`] when the
    /// `(device, command)` pair already has a command awaiting its ack.
    pub fn allocate(
        &self,
        device_id: &str,
        command: CommandName,
        parameter: Option<RelayAction>,
    ) -> Result<CommandId> {
        let mut inner = self.inner.lock();
        let key = (device_id.to_owned(), command);
        if inner.in_flight.contains_key(&key) {
            return Err(CommandError::CommandAlreadyPending {
                device_id: device_id.to_owned(),
                command,
            });
        }
        inner.next_id += 1;
        let command_id = inner.next_id;
        let (tx, rx) = oneshot::channel();
        inner.commands.insert(
            command_id,
            PendingCommand {
                command_id,
                device_id: device_id.to_owned(),
                command,
                parameter,
                dispatched_at: Utc::now(),
                state: crate::CommandState::AwaitingAck,
            },
        );
        inner.waiters.insert(command_id, tx);
        inner.receivers.insert(command_id, rx);
        inner.in_flight.insert(key, command_id);
        Ok(command_id)
    }

    /// Transition a command out of `awaiting_ack`.
    ///
    /// Returns the new terminal state, or `None` when the command is
    /// unknown or already terminal (the event is discarded, per the
    /// idempotence rule).
    pub fn resolve(&self, command_id: CommandId, outcome: CommandOutcome) -> Option<crate::CommandState> {
        let mut inner = self.inner.lock();
        let entry = inner.commands.get_mut(&command_id)?;
        if entry.state.is_terminal() {
            debug!(command_id, state = %entry.state, discarded = %outcome, "event for terminal command ignored");
            return None;
        }
        let state = outcome.state();
        entry.state = state;
        let key = (entry.device_id.clone(), entry.command);
        inner.in_flight.remove(&key);
        inner.outcomes.insert(command_id, outcome);
        inner.receivers.remove(&command_id);
        if let Some(tx) = inner.waiters.remove(&command_id) {
            let _ = tx.send(outcome);
        }
        inner.prune_terminal_history(&key.0);
        Some(state)
    }

    /// Resolve every awaiting command for a removed device with
    /// [`CommandOutcome::DeviceRemoved`]. Returns how many were resolved.
    pub fn fail_device(&self, device_id: &str) -> usize {
        let awaiting: Vec<CommandId> = {
            let inner = self.inner.lock();
            inner
                .commands
                .values()
                .filter(|c| c.device_id == device_id && !c.state.is_terminal())
                .map(|c| c.command_id)
                .collect()
        };
        awaiting
            .iter()
            .filter(|id| self.resolve(**id, CommandOutcome::DeviceRemoved).is_some())
            .count()
    }

    /// Forget every tracked command for a removed device. Returns how
    /// many entries were dropped.
    ///
    /// Call [`PendingTable::fail_device`] first so in-progress waiters
    /// receive [`CommandOutcome::DeviceRemoved`] through their channel;
    /// lookups after the purge report the id as unknown.
    pub fn purge_device(&self, device_id: &str) -> usize {
        let mut inner = self.inner.lock();
        let ids: Vec<CommandId> = inner
            .commands
            .values()
            .filter(|c| c.device_id == device_id)
            .map(|c| c.command_id)
            .collect();
        for command_id in &ids {
            inner.commands.remove(command_id);
            inner.outcomes.remove(command_id);
            inner.waiters.remove(command_id);
            inner.receivers.remove(command_id);
        }
        inner.in_flight.retain(|(device, _), _| device != device_id);
        ids.len()
    }

    /// Wait for the command's resolution, bounded by `timeout`.
    ///
    /// If no acknowledgment arrives within the budget the command is
    /// transitioned to `timed_out` here; an ack that slips in between the
    /// timer firing and the state transition still wins the race.
    pub async fn await_ack(
        &self,
        command_id: CommandId,
        timeout: Duration,
    ) -> Result<CommandOutcome> {
        let rx = {
            let mut inner = self.inner.lock();
            let entry = inner
                .commands
                .get(&command_id)
                .ok_or(CommandError::UnknownCommandId(command_id))?;
            if entry.state.is_terminal() {
                let outcome = inner
                    .outcomes
                    .get(&command_id)
                    .copied()
                    .unwrap_or(CommandOutcome::Failed);
                return Ok(outcome);
            }
            inner
                .receivers
                .remove(&command_id)
                .ok_or(CommandError::AlreadyAwaited(command_id))?
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_closed)) => {
                let inner = self.inner.lock();
                Ok(inner
                    .outcomes
                    .get(&command_id)
                    .copied()
                    .unwrap_or(CommandOutcome::Failed))
            }
            Err(_elapsed) => {
                if self.resolve(command_id, CommandOutcome::TimedOut).is_some() {
                    Ok(CommandOutcome::TimedOut)
                } else {
                    // the ack won the race while the timer was firing
                    let inner = self.inner.lock();
                    Ok(inner
                        .outcomes
                        .get(&command_id)
                        .copied()
                        .unwrap_or(CommandOutcome::TimedOut))
                }
            }
        }
    }

    /// Look up one tracked command.
    pub fn command(&self, command_id: CommandId) -> Option<PendingCommand> {
        self.inner.lock().commands.get(&command_id).cloned()
    }

    /// All tracked commands for one device, newest dispatch last.
    pub fn commands_for_device(&self, device_id: &str) -> Vec<PendingCommand> {
        let inner = self.inner.lock();
        let mut commands: Vec<PendingCommand> = inner
            .commands
            .values()
            .filter(|c| c.device_id == device_id)
            .cloned()
            .collect();
        commands.sort_by_key(|c| c.command_id);
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandState;

    #[test]
    fn ids_are_monotonic_and_start_at_one() {
        let table = PendingTable::new();
        let first = table
            .allocate("dev1", CommandName::Wind, Some(RelayAction::Off))
            .expect("allocate");
        let second = table
            .allocate("dev1", CommandName::Brake, Some(RelayAction::On))
            .expect("allocate");
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn same_pair_cannot_be_dispatched_twice() {
        let table = PendingTable::new();
        table
            .allocate("dev1", CommandName::Wind, Some(RelayAction::Off))
            .expect("first dispatch");
        let err = table
            .allocate("dev1", CommandName::Wind, Some(RelayAction::On))
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::CommandAlreadyPending { ref device_id, command: CommandName::Wind }
                if device_id == "dev1"
        ));
        // a different device or command is unaffected
        table
            .allocate("dev2", CommandName::Wind, Some(RelayAction::Off))
            .expect("other device");
    }

    #[test]
    fn pair_frees_up_after_resolution() {
        let table = PendingTable::new();
        let id = table
            .allocate("dev1", CommandName::Wind, Some(RelayAction::Off))
            .expect("allocate");
        table.resolve(id, CommandOutcome::Acked).expect("resolve");
        let next = table
            .allocate("dev1", CommandName::Wind, Some(RelayAction::On))
            .expect("pair is free again");
        assert_ne!(id, next);
    }

    #[test]
    fn second_resolution_is_discarded() {
        let table = PendingTable::new();
        let id = table
            .allocate("dev1", CommandName::Brake, Some(RelayAction::On))
            .expect("allocate");
        assert_eq!(
            table.resolve(id, CommandOutcome::Acked),
            Some(CommandState::Acked)
        );
        // late timeout loses the race and must not resurrect the command
        assert_eq!(table.resolve(id, CommandOutcome::TimedOut), None);
        assert_eq!(
            table.command(id).expect("tracked").state,
            CommandState::Acked
        );
    }

    #[test]
    fn fail_device_resolves_only_awaiting_commands() {
        let table = PendingTable::new();
        let done = table
            .allocate("dev1", CommandName::Solar, Some(RelayAction::On))
            .expect("allocate");
        table.resolve(done, CommandOutcome::Acked);
        table
            .allocate("dev1", CommandName::Wind, Some(RelayAction::Off))
            .expect("allocate");
        table
            .allocate("dev2", CommandName::Wind, Some(RelayAction::Off))
            .expect("allocate");

        assert_eq!(table.fail_device("dev1"), 1);
        assert_eq!(
            table.command(done).expect("tracked").state,
            CommandState::Acked
        );
    }

    #[test]
    fn terminal_history_is_bounded_per_device() {
        let table = PendingTable::new();
        let mut last = 0;
        for _ in 0..100 {
            last = table
                .allocate("dev1", CommandName::Wind, Some(RelayAction::Off))
                .expect("allocate");
            table.resolve(last, CommandOutcome::TimedOut).expect("resolve");
        }
        let retained = table.commands_for_device("dev1");
        assert_eq!(retained.len(), TERMINAL_HISTORY_PER_DEVICE);
        // newest entries survive, the oldest are evicted
        assert_eq!(retained.last().map(|c| c.command_id), Some(last));
        assert!(table.command(1).is_none());

        // an awaiting command is never evicted, however old
        let table = PendingTable::new();
        let awaiting = table
            .allocate("dev1", CommandName::Brake, Some(RelayAction::On))
            .expect("allocate");
        for _ in 0..(2 * TERMINAL_HISTORY_PER_DEVICE) {
            let id = table
                .allocate("dev1", CommandName::Wind, Some(RelayAction::Off))
                .expect("allocate");
            table.resolve(id, CommandOutcome::Acked).expect("resolve");
        }
        assert_eq!(
            table.command(awaiting).expect("still tracked").state,
            CommandState::AwaitingAck
        );
    }

    #[test]
    fn purge_device_forgets_every_tracked_command() {
        let table = PendingTable::new();
        let resolved = table
            .allocate("dev1", CommandName::Solar, Some(RelayAction::On))
            .expect("allocate");
        table.resolve(resolved, CommandOutcome::Acked);
        let awaiting = table
            .allocate("dev1", CommandName::Wind, Some(RelayAction::Off))
            .expect("allocate");
        let other = table
            .allocate("dev2", CommandName::Wind, Some(RelayAction::Off))
            .expect("allocate");

        table.fail_device("dev1");
        assert_eq!(table.purge_device("dev1"), 2);
        assert!(table.commands_for_device("dev1").is_empty());
        assert!(table.command(resolved).is_none());
        assert!(table.command(awaiting).is_none());
        // the pair is free for a re-registered device
        table
            .allocate("dev1", CommandName::Wind, Some(RelayAction::Off))
            .expect("pair is free after purge");
        // other devices are untouched
        assert_eq!(
            table.command(other).expect("tracked").state,
            CommandState::AwaitingAck
        );
    }
}
