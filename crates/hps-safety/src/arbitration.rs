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

use hps_telemetry::TelemetrySnapshot;

/// Renewable coverage fraction at or above which the load runs straight
/// off solar plus wind.
pub const RENEWABLES_COVERAGE_THRESHOLD: f64 = 0.90;

/// State-of-charge band, in percent, inside which charge-priority routing
/// is considered healthy.
const CHARGE_SOC_MIN_PERCENT: f64 = 25.0;
const CHARGE_SOC_MAX_PERCENT: f64 = 80.0;

/// Advisory routing classification for one snapshot. Display-only: no
/// commands are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoutingPriority {
    /// Renewables cover at least 90% of the load.
    RenewablesDirect,
    /// The battery is charging within its healthy state-of-charge band.
    BatteryCharge,
    /// The battery backstops a shortfall.
    BatteryDischargeBackup,
}

/// Classify how the system is currently routing power.
///
/// Coverage is `(solar + wind) / load`; a zero load counts as fully
/// covered. The 90% boundary is closed: exact coverage classifies as
/// direct. Charging outside the 25-80% band falls through to the
/// discharge-backup bucket rather than inventing a fourth class.
pub fn classify(snapshot: &TelemetrySnapshot) -> RoutingPriority {
    let coverage = if snapshot.load_power_w == 0.0 {
        1.0
    } else {
        snapshot.total_generation_w() / snapshot.load_power_w
    };
    if coverage >= RENEWABLES_COVERAGE_THRESHOLD {
        return RoutingPriority::RenewablesDirect;
    }

    let charging = snapshot.battery_power_w > 0.0;
    let soc_in_band = snapshot.battery_soc_percent >= CHARGE_SOC_MIN_PERCENT
        && snapshot.battery_soc_percent <= CHARGE_SOC_MAX_PERCENT;
    if charging && soc_in_band {
        RoutingPriority::BatteryCharge
    } else {
        RoutingPriority::BatteryDischargeBackup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(soc: f64, battery: f64, solar: f64, wind: f64, load: f64) -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::empty("dev1");
        snapshot.battery_soc_percent = soc;
        snapshot.battery_power_w = battery;
        snapshot.solar_power_w = solar;
        snapshot.wind_power_w = wind;
        snapshot.load_power_w = load;
        snapshot
    }

    #[test]
    fn exact_ninety_percent_coverage_is_direct() {
        let direct = snapshot(50.0, 0.0, 300.0, 150.0, 500.0); // 450 / 500 = 0.90
        assert_eq!(classify(&direct), RoutingPriority::RenewablesDirect);

        let just_short = snapshot(50.0, -49.5, 300.0, 149.95, 500.0); // 0.8999
        assert_ne!(classify(&just_short), RoutingPriority::RenewablesDirect);
    }

    #[test]
    fn zero_load_counts_as_fully_covered() {
        let idle = snapshot(10.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(classify(&idle), RoutingPriority::RenewablesDirect);
    }

    #[test]
    fn charging_inside_the_soc_band_is_charge_priority() {
        // no generation, battery absorbing 120 W at 60% SoC
        let charging = snapshot(60.0, 120.0, 0.0, 0.0, 500.0);
        assert_eq!(classify(&charging), RoutingPriority::BatteryCharge);
    }

    #[test]
    fn discharge_covers_the_shortfall() {
        let backup = snapshot(70.0, -350.0, 100.0, 50.0, 500.0);
        assert_eq!(classify(&backup), RoutingPriority::BatteryDischargeBackup);
    }

    #[test]
    fn charging_outside_the_band_falls_through_to_backup() {
        let too_low = snapshot(20.0, 200.0, 0.0, 0.0, 500.0);
        let too_high = snapshot(85.0, 200.0, 0.0, 0.0, 500.0);
        assert_eq!(classify(&too_low), RoutingPriority::BatteryDischargeBackup);
        assert_eq!(classify(&too_high), RoutingPriority::BatteryDischargeBackup);

        let at_min = snapshot(25.0, 200.0, 0.0, 0.0, 500.0);
        let at_max = snapshot(80.0, 200.0, 0.0, 0.0, 500.0);
        assert_eq!(classify(&at_min), RoutingPriority::BatteryCharge);
        assert_eq!(classify(&at_max), RoutingPriority::BatteryCharge);
    }
}
