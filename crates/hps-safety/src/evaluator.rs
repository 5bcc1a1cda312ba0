//! ---
//! hps_section: "07-resilience-fault-tolerance"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Safety interlock evaluation and source arbitration."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use hps_common::ThresholdConfig;
use hps_telemetry::TelemetrySnapshot;

use crate::assessment::{DangerLevel, ProtectiveAction, SafetyAssessment};
use crate::{Result, SafetyError};

struct Check {
    name: &'static str,
    unit: &'static str,
    value: f64,
    warning: f64,
    max: f64,
}

impl Check {
    fn severity(&self) -> DangerLevel {
        if self.value >= self.max {
            DangerLevel::Critical
        } else if self.value >= self.warning {
            DangerLevel::Warning
        } else {
            DangerLevel::Normal
        }
    }

    fn warning_text(&self) -> Option<String> {
        match self.severity() {
            DangerLevel::Critical => Some(format!(
                "{} critical: {:.1} {} (max {:.1} {})",
                self.name, self.value, self.unit, self.max, self.unit
            )),
            DangerLevel::Warning => Some(format!(
                "{} high: {:.1} {} ({:.1} {} below max {:.1} {})",
                self.name,
                self.value,
                self.unit,
                self.max - self.value,
                self.unit,
                self.max,
                self.unit
            )),
            DangerLevel::Normal => None,
        }
    }
}

/// The three independent overspeed checks; an unmeasured quantity is not
/// applicable and produces no check at all.
fn checks(snapshot: &TelemetrySnapshot, config: &ThresholdConfig) -> Vec<Check> {
    let mut checks = Vec::with_capacity(3);
    if let Some(value) = snapshot.wind_speed_ms {
        checks.push(Check {
            name: "wind speed",
            unit: "m/s",
            value,
            warning: config.warning_wind_speed_ms,
            max: config.max_wind_speed_ms,
        });
    }
    if let Some(value) = snapshot.rectified_voltage_v {
        checks.push(Check {
            name: "rectified voltage",
            unit: "V",
            value,
            warning: config.warning_voltage_v,
            max: config.max_rectified_voltage_v,
        });
    }
    if let (Some(value), Some(max), Some(warning)) =
        (snapshot.rotor_rpm, config.max_rotor_rpm, config.warning_rpm)
    {
        checks.push(Check {
            name: "rotor rpm",
            unit: "rpm",
            value,
            warning,
            max,
        });
    }
    checks
}

/// Compute the safety assessment for one snapshot against one threshold
/// set. Pure function; never fails for valid inputs.
///
/// On critical conditions the protective sequence is always
/// `[disconnect_wind_relay, engage_brake_relay]`, in that order: the
/// generator must be electrically isolated before the brake engages.
/// Brake release is never emitted here; see [`check_release`].
pub fn evaluate(snapshot: &TelemetrySnapshot, config: &ThresholdConfig) -> SafetyAssessment {
    if !config.protection_enabled {
        return SafetyAssessment::default();
    }

    let mut danger_level = DangerLevel::Normal;
    let mut warnings = Vec::new();
    for check in checks(snapshot, config) {
        danger_level = danger_level.max(check.severity());
        if let Some(text) = check.warning_text() {
            warnings.push(text);
        }
    }

    let required_actions = if danger_level == DangerLevel::Critical {
        vec![
            ProtectiveAction::DisconnectWindRelay,
            ProtectiveAction::EngageBrakeRelay,
        ]
    } else {
        Vec::new()
    };

    SafetyAssessment {
        danger_level,
        required_actions,
        warnings,
    }
}

/// Gate for the operator's brake release request, evaluated against the
/// telemetry at the moment of the request.
///
/// Refused while any check is at or above its warning threshold. The
/// guard applies even when `protection_enabled` is false: the master
/// switch disables automatic protection, not the release interlock.
pub fn check_release(snapshot: &TelemetrySnapshot, config: &ThresholdConfig) -> Result<()> {
    let reasons: Vec<String> = checks(snapshot, config)
        .iter()
        .filter(|check| check.severity() >= DangerLevel::Warning)
        .map(|check| {
            format!(
                "{} at {:.1} {} (warning {:.1} {})",
                check.name, check.value, check.unit, check.warning, check.unit
            )
        })
        .collect();
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(SafetyError::UnsafeToRelease { reasons })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hps_telemetry::TelemetrySnapshot;

    fn snapshot(
        wind: Option<f64>,
        voltage: Option<f64>,
        rpm: Option<f64>,
    ) -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::empty("dev1");
        snapshot.wind_speed_ms = wind;
        snapshot.rectified_voltage_v = voltage;
        snapshot.rotor_rpm = rpm;
        snapshot
    }

    fn thresholds() -> ThresholdConfig {
        ThresholdConfig {
            max_wind_speed_ms: 25.0,
            warning_wind_speed_ms: 22.5,
            max_rectified_voltage_v: 65.0,
            warning_voltage_v: 58.5,
            max_rotor_rpm: Some(500.0),
            warning_rpm: Some(450.0),
            protection_enabled: true,
        }
    }

    #[test]
    fn disabled_protection_always_reads_normal() {
        let config = ThresholdConfig {
            protection_enabled: false,
            ..thresholds()
        };
        let assessment = evaluate(&snapshot(Some(40.0), Some(90.0), Some(800.0)), &config);
        assert_eq!(assessment.danger_level, DangerLevel::Normal);
        assert!(assessment.required_actions.is_empty());
    }

    #[test]
    fn critical_wind_triggers_isolate_then_brake() {
        // wind 26 over a 25 m/s cut-out, voltage well inside limits
        let assessment = evaluate(&snapshot(Some(26.0), Some(50.0), None), &thresholds());
        assert_eq!(assessment.danger_level, DangerLevel::Critical);
        assert_eq!(
            assessment.required_actions,
            vec![
                ProtectiveAction::DisconnectWindRelay,
                ProtectiveAction::EngageBrakeRelay,
            ]
        );
    }

    #[test]
    fn overvoltage_orders_disconnect_before_brake() {
        let assessment = evaluate(&snapshot(Some(10.0), Some(65.0), None), &thresholds());
        assert_eq!(assessment.danger_level, DangerLevel::Critical);
        let disconnect = assessment
            .required_actions
            .iter()
            .position(|a| *a == ProtectiveAction::DisconnectWindRelay)
            .expect("disconnect present");
        let brake = assessment
            .required_actions
            .iter()
            .position(|a| *a == ProtectiveAction::EngageBrakeRelay)
            .expect("brake present");
        assert!(disconnect < brake);
    }

    #[test]
    fn danger_level_steps_monotonically_with_wind_speed() {
        let config = thresholds();
        let levels: Vec<DangerLevel> = [20.0, 22.4, 22.5, 24.9, 25.0, 30.0]
            .iter()
            .map(|wind| evaluate(&snapshot(Some(*wind), Some(30.0), None), &config).danger_level)
            .collect();
        assert_eq!(
            levels,
            vec![
                DangerLevel::Normal,
                DangerLevel::Normal,
                DangerLevel::Warning,
                DangerLevel::Warning,
                DangerLevel::Critical,
                DangerLevel::Critical,
            ]
        );
        // never skips backward while the reading keeps rising
        assert!(levels.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn severity_is_the_maximum_across_checks() {
        // voltage in the warning band, rpm critical
        let assessment = evaluate(&snapshot(Some(5.0), Some(60.0), Some(520.0)), &thresholds());
        assert_eq!(assessment.danger_level, DangerLevel::Critical);
        assert_eq!(assessment.warnings.len(), 2);
    }

    #[test]
    fn unmeasured_quantities_are_not_applicable() {
        let assessment = evaluate(&snapshot(None, None, None), &thresholds());
        assert_eq!(assessment.danger_level, DangerLevel::Normal);
        assert!(assessment.warnings.is_empty());

        // rpm measured but thresholds unconfigured: check not applicable
        let config = ThresholdConfig {
            max_rotor_rpm: None,
            warning_rpm: None,
            ..thresholds()
        };
        let assessment = evaluate(&snapshot(None, None, Some(9_000.0)), &config);
        assert_eq!(assessment.danger_level, DangerLevel::Normal);
    }

    #[test]
    fn warning_band_produces_advisory_text_with_margin() {
        let assessment = evaluate(&snapshot(Some(23.0), None, None), &thresholds());
        assert_eq!(assessment.danger_level, DangerLevel::Warning);
        assert!(assessment.required_actions.is_empty());
        assert_eq!(assessment.warnings.len(), 1);
        assert!(assessment.warnings[0].contains("wind speed"));
        assert!(assessment.warnings[0].contains("2.0 m/s below max"));
    }

    #[test]
    fn release_is_rejected_at_every_warning_boundary() {
        let config = thresholds();
        // (wind, voltage, rpm, expect_safe)
        let table = [
            (Some(22.5), Some(30.0), Some(100.0), false), // wind at warning
            (Some(10.0), Some(58.5), Some(100.0), false), // voltage at warning
            (Some(10.0), Some(30.0), Some(450.0), false), // rpm at warning
            (Some(26.0), Some(30.0), None, false),        // wind above max
            (Some(22.4), Some(58.4), Some(449.9), true),  // all just below warning
            (None, None, None, true),                     // nothing measured
            (Some(22.5), Some(58.5), Some(450.0), false), // everything at warning
        ];
        for (wind, voltage, rpm, expect_safe) in table {
            let result = check_release(&snapshot(wind, voltage, rpm), &config);
            assert_eq!(
                result.is_ok(),
                expect_safe,
                "wind={wind:?} voltage={voltage:?} rpm={rpm:?}"
            );
        }
    }

    #[test]
    fn release_guard_ignores_the_protection_master_switch() {
        let config = ThresholdConfig {
            protection_enabled: false,
            ..thresholds()
        };
        let err = check_release(&snapshot(Some(26.0), None, None), &config).unwrap_err();
        let SafetyError::UnsafeToRelease { reasons } = err;
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("wind speed"));
    }

    #[test]
    fn evaluate_never_emits_release_actions() {
        for wind in [10.0, 23.0, 26.0] {
            let assessment = evaluate(&snapshot(Some(wind), None, None), &thresholds());
            assert!(!assessment
                .required_actions
                .contains(&ProtectiveAction::ReleaseBrakeRelay));
            assert!(!assessment
                .required_actions
                .contains(&ProtectiveAction::ReconnectWindRelay));
        }
    }
}
