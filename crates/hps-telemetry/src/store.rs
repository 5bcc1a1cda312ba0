//! ---
//! hps_section: "02-messaging-ipc-data-model"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Telemetry snapshot schema and snapshot store."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::snapshot::{Relay, RelayState, TelemetrySnapshot};
use crate::{Result, TelemetryError};

#[derive(Debug, Default)]
struct DeviceEntry {
    latest: Option<Arc<TelemetrySnapshot>>,
}

/// Holds the latest known snapshot per registered device.
///
/// Single-writer-multiple-reader: every mutation swaps a fresh
/// `Arc<TelemetrySnapshot>` under the write lock, so readers always observe
/// a complete snapshot, never a partial update. Created at process start
/// and passed by handle; there are no ambient singletons.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: RwLock<HashMap<String, DeviceEntry>>,
}

impl SnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. Idempotent; an existing entry is kept.
    pub fn register(&self, device_id: impl Into<String>) {
        let device_id = device_id.into();
        let mut inner = self.inner.write();
        inner.entry(device_id.clone()).or_default();
        debug!(device = %device_id, "device registered in snapshot store");
    }

    /// Remove a device and its snapshot. Returns whether it existed.
    pub fn remove(&self, device_id: &str) -> bool {
        let mut inner = self.inner.write();
        inner.remove(device_id).is_some()
    }

    /// Whether the device is registered.
    pub fn contains(&self, device_id: &str) -> bool {
        self.inner.read().contains_key(device_id)
    }

    /// Identifiers of all registered devices.
    pub fn devices(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Store a new snapshot, fully replacing the previous one.
    pub fn ingest(&self, snapshot: TelemetrySnapshot) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .get_mut(&snapshot.device_id)
            .ok_or_else(|| TelemetryError::UnknownDevice(snapshot.device_id.clone()))?;
        entry.latest = Some(Arc::new(snapshot));
        Ok(())
    }

    /// Point-in-time read of the latest snapshot for a device.
    pub fn latest(&self, device_id: &str) -> Option<Arc<TelemetrySnapshot>> {
        self.inner.read().get(device_id)?.latest.clone()
    }

    /// Record a confirmed relay position after an acked command.
    ///
    /// Copy-on-write: the stored snapshot is cloned with the one relay
    /// updated and swapped in atomically. Measurement fields and the
    /// capture timestamp are untouched.
    pub fn confirm_relay(&self, device_id: &str, relay: Relay, state: RelayState) -> Result<()> {
        self.update_relay(device_id, relay, state)
    }

    /// Mark a relay position unknown after a timed-out command. The next
    /// ingested snapshot that reports the relay clears the marker.
    pub fn mark_relay_unknown(&self, device_id: &str, relay: Relay) -> Result<()> {
        self.update_relay(device_id, relay, RelayState::Unknown)
    }

    fn update_relay(&self, device_id: &str, relay: Relay, state: RelayState) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .get_mut(device_id)
            .ok_or_else(|| TelemetryError::UnknownDevice(device_id.to_owned()))?;
        let mut next = match &entry.latest {
            Some(current) => (**current).clone(),
            None => TelemetrySnapshot::empty(device_id),
        };
        next.relay_state.insert(relay, state);
        entry.latest = Some(Arc::new(next));
        debug!(device = device_id, relay = %relay, state = %state, "relay state updated");
        Ok(())
    }
}
