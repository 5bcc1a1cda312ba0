//! ---
//! hps_section: "02-messaging-ipc-data-model"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Telemetry snapshot schema and snapshot store."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// The fixed set of remote relays on the hybrid controller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Relay {
    /// Solar array input relay.
    Solar,
    /// Wind generator input relay.
    Wind,
    /// Grid backup relay.
    Grid,
    /// Consumer load relay.
    Load,
    /// Brake resistor relay for dynamic rotor braking.
    Brake,
}

/// Reported position of a relay.
///
/// `Unknown` is a store-side marker only: it is set after a command times
/// out (the physical position must not be assumed) and replaced by the next
/// telemetry snapshot that reports the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelayState {
    /// Relay closed, source/load connected to the bus.
    Connected,
    /// Relay open.
    Disconnected,
    /// Position unconfirmed after a timed-out command.
    Unknown,
}

/// One measurement set for one device. Immutable once stored; a newer
/// snapshot for the same device fully replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Opaque device identifier.
    pub device_id: String,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Battery state of charge, 0-100.
    pub battery_soc_percent: f64,
    /// Signed battery power; positive = charging, negative = discharging.
    pub battery_power_w: f64,
    /// Solar generation, non-negative.
    pub solar_power_w: f64,
    /// Wind generation, non-negative.
    pub wind_power_w: f64,
    /// Consumer load, non-negative.
    pub load_power_w: f64,
    /// Anemometer reading; `None` when unmeasured (distinct from zero).
    #[serde(default)]
    pub wind_speed_ms: Option<f64>,
    /// DC voltage after rectification, used as an overspeed proxy.
    #[serde(default)]
    pub rectified_voltage_v: Option<f64>,
    /// Rotor speed; `None` when the sensor is not fitted.
    #[serde(default)]
    pub rotor_rpm: Option<f64>,
    /// Last reported relay positions.
    #[serde(default)]
    pub relay_state: BTreeMap<Relay, RelayState>,
}

impl TelemetrySnapshot {
    /// Construct a snapshot with zeroed power figures, no optional
    /// measurements, and an empty relay map.
    pub fn empty(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: Utc::now(),
            battery_soc_percent: 0.0,
            battery_power_w: 0.0,
            solar_power_w: 0.0,
            wind_power_w: 0.0,
            load_power_w: 0.0,
            wind_speed_ms: None,
            rectified_voltage_v: None,
            rotor_rpm: None,
            relay_state: BTreeMap::new(),
        }
    }

    /// Combined renewable generation.
    pub fn total_generation_w(&self) -> f64 {
        self.solar_power_w + self.wind_power_w
    }

    /// Reported position of `relay`, if the device has reported it.
    pub fn relay(&self, relay: Relay) -> Option<RelayState> {
        self.relay_state.get(&relay).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_deserialize_as_absent() {
        let raw = r#"{
            "device_id": "inverter-1",
            "timestamp": "2026-08-27T12:00:00Z",
            "battery_soc_percent": 55.0,
            "battery_power_w": 120.0,
            "solar_power_w": 340.0,
            "wind_power_w": 80.0,
            "load_power_w": 400.0
        }"#;
        let snapshot: TelemetrySnapshot = serde_json::from_str(raw).expect("parses");
        assert_eq!(snapshot.wind_speed_ms, None);
        assert_eq!(snapshot.rotor_rpm, None);
        assert!(snapshot.relay_state.is_empty());
        assert_eq!(snapshot.total_generation_w(), 420.0);
    }

    #[test]
    fn relay_names_use_snake_case_on_the_wire() {
        let json = serde_json::to_string(&Relay::Brake).expect("serializes");
        assert_eq!(json, "\"brake\"");
    }
}
