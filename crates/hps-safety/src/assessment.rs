//! ---
//! hps_section: "07-resilience-fault-tolerance"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Safety interlock evaluation and source arbitration."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::Display;

/// Severity of the current conditions, ordered: critical is most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DangerLevel {
    /// All checks below their warning thresholds.
    #[default]
    Normal,
    /// At least one check in its warning band.
    Warning,
    /// At least one check at or above its maximum.
    Critical,
}

/// Protective relay actions, executed in sequence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProtectiveAction {
    /// Open the wind generator relay, isolating it from the bus.
    DisconnectWindRelay,
    /// Close the brake resistor relay. Only ever after the disconnect:
    /// engaging the brake on a connected generator back-feeds the
    /// resistor from the battery bus.
    EngageBrakeRelay,
    /// Open the brake resistor relay (operator-initiated only).
    ReleaseBrakeRelay,
    /// Close the wind generator relay again (operator-initiated only).
    ReconnectWindRelay,
}

/// Derived protection verdict; recomputed each evaluation tick, never
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SafetyAssessment {
    /// Maximum severity across the wind speed, voltage, and RPM checks.
    pub danger_level: DangerLevel,
    /// Ordered protective sequence; empty unless critical.
    pub required_actions: Vec<ProtectiveAction>,
    /// Advisory texts for display; no control semantics.
    pub warnings: Vec<String>,
}
