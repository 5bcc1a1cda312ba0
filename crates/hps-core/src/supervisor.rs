//! ---
//! hps_section: "01-core-functionality"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Primary orchestration and lifecycle management."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hps_common::{AppConfig, Mode, ThresholdConfig};
use hps_protocol::{
    AckTracker, CommandDispatcher, CommandError, CommandId, CommandName, CommandOutcome,
    PendingCommand, PendingTable, RelayAction, Transport,
};
use hps_safety::{check_release, classify, evaluate, DangerLevel, RoutingPriority, SafetyAssessment};
use hps_telemetry::{Relay, RelayState, SnapshotStore, TelemetrySnapshot};

use crate::board::ObservationBoard;
use crate::{Result, SupervisorError};

type SharedThresholds = Arc<RwLock<IndexMap<String, ThresholdConfig>>>;

/// Supervisor entrypoint: wires the store, protocol, and evaluator
/// together and spawns the runtime tasks.
pub struct Supervisor {
    config: AppConfig,
    transport: Arc<dyn Transport>,
}

impl Supervisor {
    /// Build a supervisor over a transport chosen by the caller.
    pub fn new(config: AppConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Validate the configuration, spawn one evaluation task per device
    /// plus the ack pump, and return the operator handle.
    pub async fn start(self) -> anyhow::Result<SupervisorHandle> {
        self.config
            .validate()
            .context("invalid supervisor configuration")?;

        let (shutdown_tx, _) = broadcast::channel(16);
        let store = Arc::new(SnapshotStore::new());
        let table = Arc::new(PendingTable::new());
        let dispatcher = Arc::new(CommandDispatcher::new(
            store.clone(),
            self.transport.clone(),
            table.clone(),
            &self.config.protocol,
        ));
        let tracker = AckTracker::new(table.clone());
        let board = Arc::new(ObservationBoard::new());
        let thresholds: SharedThresholds = Arc::new(RwLock::new(
            self.config
                .devices
                .iter()
                .map(|(id, device)| (id.clone(), device.thresholds.clone()))
                .collect(),
        ));

        let handle = SupervisorHandle {
            store,
            table,
            dispatcher,
            board,
            thresholds,
            transport: self.transport,
            shutdown: shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            evaluation_interval: self.config.supervisor.evaluation_interval,
            mode: self.config.mode,
        };

        handle.spawn_ack_pump(tracker, self.config.protocol.ack_poll_interval);
        for device_id in self.config.devices.keys() {
            handle.store.register(device_id.clone());
            handle.spawn_device_task(device_id.clone());
        }

        info!(
            mode = ?self.config.mode,
            devices = self.config.devices.len(),
            transport = handle.transport.name(),
            "supervisor started"
        );
        Ok(handle)
    }
}

/// Operator ids of a brake release sequence. `None` means the relay was
/// already in the requested position and no command was needed; a
/// missing `wind_on` after a real `brake_off` means the release did not
/// acknowledge, so the generator was deliberately left isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseSequence {
    /// Command opening the brake resistor relay.
    pub brake_off: Option<CommandId>,
    /// Command reconnecting the wind generator.
    pub wind_on: Option<CommandId>,
}

/// Handle returned from supervisor startup; the entire operator surface.
pub struct SupervisorHandle {
    store: Arc<SnapshotStore>,
    table: Arc<PendingTable>,
    dispatcher: Arc<CommandDispatcher>,
    board: Arc<ObservationBoard>,
    thresholds: SharedThresholds,
    transport: Arc<dyn Transport>,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    evaluation_interval: Duration,
    mode: Mode,
}

impl SupervisorHandle {
    /// Operating mode the supervisor was started in.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Feed one inbound telemetry snapshot into the store.
    pub fn ingest(&self, snapshot: TelemetrySnapshot) -> Result<()> {
        self.store.ingest(snapshot)?;
        Ok(())
    }

    /// Replace the safety thresholds for one device.
    ///
    /// Rejected before acceptance when the replacement violates a
    /// structural invariant; the previous thresholds stay in force.
    pub fn update_thresholds(&self, device_id: &str, thresholds: ThresholdConfig) -> Result<()> {
        thresholds.validate()?;
        let mut current = self.thresholds.write();
        match current.get_mut(device_id) {
            Some(entry) => {
                *entry = thresholds;
                info!(device = device_id, "thresholds updated");
                Ok(())
            }
            None => Err(SupervisorError::UnknownDevice(device_id.to_owned())),
        }
    }

    /// Register a device at runtime and start its evaluation task.
    ///
    /// Re-registering an existing device only replaces its thresholds.
    pub fn register_device(&self, device_id: &str, thresholds: ThresholdConfig) -> Result<()> {
        thresholds.validate()?;
        if self.store.contains(device_id) {
            self.thresholds
                .write()
                .insert(device_id.to_owned(), thresholds);
            return Ok(());
        }
        self.store.register(device_id);
        self.thresholds
            .write()
            .insert(device_id.to_owned(), thresholds);
        self.spawn_device_task(device_id.to_owned());
        info!(device = device_id, "device registered");
        Ok(())
    }

    /// Remove a device: outstanding waiters resolve `device_removed`, the
    /// evaluation task stops, command history is purged, and published
    /// observations are forgotten.
    pub fn remove_device(&self, device_id: &str) -> Result<()> {
        if !self.store.remove(device_id) {
            return Err(SupervisorError::UnknownDevice(device_id.to_owned()));
        }
        let resolved = self.table.fail_device(device_id);
        let purged = self.table.purge_device(device_id);
        self.thresholds.write().shift_remove(device_id);
        self.board.clear(device_id);
        info!(
            device = device_id,
            resolved_commands = resolved,
            purged_commands = purged,
            "device removed"
        );
        Ok(())
    }

    /// Release the brake and reconnect the wind generator, guarded by the
    /// safety interlock against the telemetry current at the request.
    ///
    /// The brake must open before the generator reconnects; if the brake
    /// command does not acknowledge, the reconnect is not attempted.
    pub async fn request_brake_release(&self, device_id: &str) -> Result<ReleaseSequence> {
        let snapshot = self
            .store
            .latest(device_id)
            .ok_or_else(|| self.missing_telemetry(device_id))?;
        let config = self
            .thresholds
            .read()
            .get(device_id)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownDevice(device_id.to_owned()))?;
        check_release(&snapshot, &config)?;

        let brake_off = actuate(
            &self.dispatcher,
            &self.store,
            device_id,
            CommandName::Brake,
            RelayAction::Off,
        )
        .await;
        if let Some((brake_id, outcome)) = brake_off {
            if outcome != CommandOutcome::Acked {
                warn!(
                    device = device_id,
                    command_id = brake_id,
                    outcome = %outcome,
                    "brake release unacknowledged; wind generator left isolated"
                );
                return Ok(ReleaseSequence {
                    brake_off: Some(brake_id),
                    wind_on: None,
                });
            }
        }

        let wind_on = actuate(
            &self.dispatcher,
            &self.store,
            device_id,
            CommandName::Wind,
            RelayAction::On,
        )
        .await;
        Ok(ReleaseSequence {
            brake_off: brake_off.map(|(id, _)| id),
            wind_on: wind_on.map(|(id, _)| id),
        })
    }

    /// Open every relay on the device. Returns the command id without
    /// waiting for the acknowledgment; follow up with [`Self::await_ack`].
    pub fn emergency_stop(&self, device_id: &str) -> Result<CommandId> {
        let command_id = self
            .dispatcher
            .dispatch(device_id, CommandName::AllOff, None)?;
        warn!(device = device_id, command_id, "emergency stop dispatched");
        Ok(command_id)
    }

    /// Wait for a command's resolution with the configured budget, and
    /// record the confirmed (or unknown) relay position in the store.
    pub async fn await_ack(&self, command_id: CommandId) -> Result<CommandOutcome> {
        let outcome = self.dispatcher.await_ack(command_id).await?;
        if let Some(pending) = self.table.command(command_id) {
            settle(&self.store, &pending, outcome);
        }
        Ok(outcome)
    }

    /// Latest published safety assessment for the device.
    pub fn assessment(&self, device_id: &str) -> Option<SafetyAssessment> {
        self.board.assessment(device_id)
    }

    /// Latest published routing classification for the device.
    pub fn routing(&self, device_id: &str) -> Option<RoutingPriority> {
        self.board.routing(device_id)
    }

    /// One tracked command by id.
    pub fn command(&self, command_id: CommandId) -> Option<PendingCommand> {
        self.table.command(command_id)
    }

    /// Every tracked command for the device, oldest first.
    pub fn commands(&self, device_id: &str) -> Vec<PendingCommand> {
        self.table.commands_for_device(device_id)
    }

    /// Point-in-time read of the latest snapshot for the device.
    pub fn latest(&self, device_id: &str) -> Option<Arc<TelemetrySnapshot>> {
        self.store.latest(device_id)
    }

    /// Identifiers of all registered devices.
    pub fn devices(&self) -> Vec<String> {
        self.store.devices()
    }

    /// Stop every runtime task and wait for them to drain.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(());
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "runtime task join error");
            }
        }
        info!("supervisor shutdown complete");
        Ok(())
    }

    fn missing_telemetry(&self, device_id: &str) -> SupervisorError {
        if self.store.contains(device_id) {
            SupervisorError::NoTelemetry(device_id.to_owned())
        } else {
            SupervisorError::UnknownDevice(device_id.to_owned())
        }
    }

    fn spawn_device_task(&self, device_id: String) {
        let store = self.store.clone();
        let dispatcher = self.dispatcher.clone();
        let board = self.board.clone();
        let thresholds = self.thresholds.clone();
        let interval = self.evaluation_interval;
        let shutdown = self.shutdown.subscribe();
        let task = tokio::spawn(run_device(
            device_id, store, dispatcher, board, thresholds, interval, shutdown,
        ));
        self.tasks.lock().push(task);
    }

    fn spawn_ack_pump(&self, tracker: AckTracker, poll_interval: Duration) {
        let transport = self.transport.clone();
        let mut shutdown = self.shutdown.subscribe();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("ack pump shutdown");
                        break;
                    }
                    _ = interval.tick() => {
                        let drained = tracker.drain(transport.as_ref());
                        if drained > 0 {
                            debug!(drained, "acknowledgments drained");
                        }
                    }
                }
            }
        });
        self.tasks.lock().push(task);
    }
}

/// Per-device evaluation loop. One tick: read the latest snapshot, derive
/// the assessment and routing class, publish both, and on critical
/// conditions run the protective sequence. Exits when the device is
/// removed from the store.
async fn run_device(
    device_id: String,
    store: Arc<SnapshotStore>,
    dispatcher: Arc<CommandDispatcher>,
    board: Arc<ObservationBoard>,
    thresholds: SharedThresholds,
    evaluation_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(evaluation_interval);
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!(device = %device_id, "evaluation task shutdown");
                break;
            }
            _ = interval.tick() => {
                if !store.contains(&device_id) {
                    debug!(device = %device_id, "device removed; evaluation task exiting");
                    break;
                }
                let Some(snapshot) = store.latest(&device_id) else {
                    continue;
                };
                let Some(config) = thresholds.read().get(&device_id).cloned() else {
                    continue;
                };

                let assessment = evaluate(&snapshot, &config);
                let routing = classify(&snapshot);
                let danger_level = assessment.danger_level;
                let warnings = assessment.warnings.clone();
                let previous = board.publish(&device_id, assessment, routing);

                if previous != Some(danger_level) {
                    info!(
                        device = %device_id,
                        danger_level = %danger_level,
                        routing = %routing,
                        "danger level transition"
                    );
                }
                if danger_level == DangerLevel::Critical {
                    warn!(
                        device = %device_id,
                        warnings = ?warnings,
                        "critical conditions; engaging wind protection"
                    );
                    // isolate the generator first, brake only afterwards
                    actuate(&dispatcher, &store, &device_id, CommandName::Wind, RelayAction::Off)
                        .await;
                    actuate(&dispatcher, &store, &device_id, CommandName::Brake, RelayAction::On)
                        .await;
                }
            }
        }
    }
}

/// Dispatch one relay command and wait for its resolution.
///
/// Skipped (returns `None`) when the store already shows the relay in the
/// commanded position, or when the same command is still pending from an
/// earlier tick. Relay bookkeeping is applied on resolution.
async fn actuate(
    dispatcher: &CommandDispatcher,
    store: &SnapshotStore,
    device_id: &str,
    command: CommandName,
    action: RelayAction,
) -> Option<(CommandId, CommandOutcome)> {
    let desired = match action {
        RelayAction::On => RelayState::Connected,
        RelayAction::Off => RelayState::Disconnected,
    };
    if let (Some(relay), Some(snapshot)) = (command.relay(), store.latest(device_id)) {
        if snapshot.relay(relay) == Some(desired) {
            debug!(
                device = device_id,
                relay = %relay,
                state = %desired,
                "relay already in commanded position"
            );
            return None;
        }
    }

    let command_id = match dispatcher.dispatch(device_id, command, Some(action)) {
        Ok(id) => id,
        Err(CommandError::CommandAlreadyPending { .. }) => {
            debug!(device = device_id, command = %command, "command still pending from an earlier tick");
            return None;
        }
        Err(err) => {
            warn!(device = device_id, command = %command, error = %err, "dispatch failed");
            return None;
        }
    };
    let outcome = match dispatcher.await_ack(command_id).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(device = device_id, command_id, error = %err, "ack wait failed");
            return None;
        }
    };
    if let Some(pending) = dispatcher.table().command(command_id) {
        settle(store, &pending, outcome);
    }
    Some((command_id, outcome))
}

/// Record what a resolved command implies about relay positions.
///
/// Acked commands confirm the commanded position; timed-out commands mark
/// it unknown until the next telemetry snapshot reports it. `all_off`
/// confirms every relay open on ack.
fn settle(store: &SnapshotStore, pending: &PendingCommand, outcome: CommandOutcome) {
    let result = match (outcome, pending.command.relay(), pending.parameter) {
        (CommandOutcome::Acked, Some(relay), Some(action)) => {
            let state = match action {
                RelayAction::On => RelayState::Connected,
                RelayAction::Off => RelayState::Disconnected,
            };
            store.confirm_relay(&pending.device_id, relay, state)
        }
        (CommandOutcome::Acked, None, _) => {
            use strum::IntoEnumIterator;
            Relay::iter().try_for_each(|relay| {
                store.confirm_relay(&pending.device_id, relay, RelayState::Disconnected)
            })
        }
        (CommandOutcome::TimedOut, Some(relay), _) => {
            store.mark_relay_unknown(&pending.device_id, relay)
        }
        (CommandOutcome::TimedOut, None, _) => {
            use strum::IntoEnumIterator;
            Relay::iter()
                .try_for_each(|relay| store.mark_relay_unknown(&pending.device_id, relay))
        }
        _ => Ok(()),
    };
    if let Err(err) = result {
        debug!(
            device = %pending.device_id,
            command_id = pending.command_id,
            error = %err,
            "relay bookkeeping skipped"
        );
    }
}
