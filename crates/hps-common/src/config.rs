//! ---
//! hps_section: "01-core-functionality"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Shared primitives and utilities for the supervisor runtime."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use thiserror::Error;
use tracing::debug;

use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_max_wind_speed() -> f64 {
    25.0
}

fn default_warning_wind_speed() -> f64 {
    22.5
}

fn default_max_voltage() -> f64 {
    65.0
}

fn default_warning_voltage() -> f64 {
    58.5
}

fn default_protection_enabled() -> bool {
    true
}

fn default_ack_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_ack_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_evaluation_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the HPS runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default)]
    pub devices: IndexMap<String, DeviceConfig>,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "HPS_CONFIG";

    /// Load configuration from disk together with the effective source
    /// path, respecting the `HPS_CONFIG` override.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve a device configuration by identifier.
    pub fn device(&self, device_id: &str) -> Option<&DeviceConfig> {
        self.devices.get(device_id)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(anyhow!("configuration must contain at least one device"));
        }
        for (device_id, device) in &self.devices {
            device
                .thresholds
                .validate()
                .with_context(|| format!("invalid thresholds for device '{}'", device_id))?;
        }
        self.protocol.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            devices: IndexMap::new(),
            protocol: ProtocolConfig::default(),
            supervisor: SupervisorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Operating mode for the supervisor.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Per-device configuration: identity plus safety thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

/// Violations of the threshold invariants, rejected before acceptance.
#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("{check}: warning threshold {warning} exceeds maximum {max}")]
    WarningAboveMax {
        check: &'static str,
        warning: f64,
        max: f64,
    },
    #[error("rotor rpm thresholds must be configured as a pair (max + warning)")]
    IncompleteRpmPair,
    #[error("{check}: thresholds must be positive, got {value}")]
    NonPositive { check: &'static str, value: f64 },
}

/// Safety thresholds for one device, mutable by operator action.
///
/// Defaults mirror the field-proven cut-out values of the reference
/// controller: 25 m/s wind, 65 V rectified, 500 RPM, warnings at 90 %.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_max_wind_speed")]
    pub max_wind_speed_ms: f64,
    #[serde(default = "default_warning_wind_speed")]
    pub warning_wind_speed_ms: f64,
    #[serde(default = "default_max_voltage")]
    pub max_rectified_voltage_v: f64,
    #[serde(default = "default_warning_voltage")]
    pub warning_voltage_v: f64,
    #[serde(default)]
    pub max_rotor_rpm: Option<f64>,
    #[serde(default)]
    pub warning_rpm: Option<f64>,
    #[serde(default = "default_protection_enabled")]
    pub protection_enabled: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            max_wind_speed_ms: default_max_wind_speed(),
            warning_wind_speed_ms: default_warning_wind_speed(),
            max_rectified_voltage_v: default_max_voltage(),
            warning_voltage_v: default_warning_voltage(),
            max_rotor_rpm: Some(500.0),
            warning_rpm: Some(450.0),
            protection_enabled: true,
        }
    }
}

impl ThresholdConfig {
    /// Enforce `warning_* <= max_*` for every configured pair.
    pub fn validate(&self) -> std::result::Result<(), ThresholdError> {
        check_pair(
            "wind speed",
            self.warning_wind_speed_ms,
            self.max_wind_speed_ms,
        )?;
        check_pair(
            "rectified voltage",
            self.warning_voltage_v,
            self.max_rectified_voltage_v,
        )?;
        match (self.max_rotor_rpm, self.warning_rpm) {
            (Some(max), Some(warning)) => check_pair("rotor rpm", warning, max)?,
            (None, None) => {}
            _ => return Err(ThresholdError::IncompleteRpmPair),
        }
        Ok(())
    }
}

fn check_pair(check: &'static str, warning: f64, max: f64) -> Result<(), ThresholdError> {
    if max <= 0.0 {
        return Err(ThresholdError::NonPositive { check, value: max });
    }
    if warning <= 0.0 {
        return Err(ThresholdError::NonPositive {
            check,
            value: warning,
        });
    }
    if warning > max {
        return Err(ThresholdError::WarningAboveMax {
            check,
            warning,
            max,
        });
    }
    Ok(())
}

/// Timing contract for the command/acknowledgment handshake.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Total acknowledgment budget per command (default 10 s, i.e. ten
    /// one-second polls of the reference implementation).
    #[serde(default = "default_ack_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub ack_timeout: Duration,
    /// Interval at which the ack pump drains the transport.
    #[serde(default = "default_ack_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub ack_poll_interval: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            ack_timeout: default_ack_timeout(),
            ack_poll_interval: default_ack_poll_interval(),
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ack_timeout < self.ack_poll_interval {
            return Err(anyhow!(
                "ack_timeout ({:?}) must be at least one poll interval ({:?})",
                self.ack_timeout,
                self.ack_poll_interval
            ));
        }
        Ok(())
    }
}

/// Evaluation loop cadence for the supervisor.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_evaluation_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub evaluation_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            evaluation_interval: default_evaluation_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_with_source_walks_the_candidate_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let present = dir.path().join("hps.toml");
        std::fs::write(&present, "[devices.inverter-1]\n").expect("write config");
        let missing = dir.path().join("absent.toml");

        let loaded =
            AppConfig::load_with_source(&[missing, present.clone()]).expect("load config");
        assert_eq!(loaded.source, present);
        assert!(loaded.config.devices.contains_key("inverter-1"));
    }

    #[test]
    fn default_thresholds_are_valid() {
        assert_eq!(ThresholdConfig::default().validate(), Ok(()));
    }

    #[test]
    fn warning_above_max_is_rejected() {
        let config = ThresholdConfig {
            warning_wind_speed_ms: 26.0,
            max_wind_speed_ms: 25.0,
            ..ThresholdConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ThresholdError::WarningAboveMax {
                check: "wind speed",
                warning: 26.0,
                max: 25.0,
            })
        );
    }

    #[test]
    fn voltage_warning_above_max_is_rejected() {
        let config = ThresholdConfig {
            warning_voltage_v: 70.0,
            ..ThresholdConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ThresholdError::WarningAboveMax {
                check: "rectified voltage",
                ..
            })
        ));
    }

    #[test]
    fn rpm_pair_must_be_complete() {
        let config = ThresholdConfig {
            max_rotor_rpm: Some(500.0),
            warning_rpm: None,
            ..ThresholdConfig::default()
        };
        assert_eq!(config.validate(), Err(ThresholdError::IncompleteRpmPair));
    }

    #[test]
    fn unmeasured_rotor_is_valid() {
        let config = ThresholdConfig {
            max_rotor_rpm: None,
            warning_rpm: None,
            ..ThresholdConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn warning_equal_to_max_is_accepted() {
        let config = ThresholdConfig {
            warning_wind_speed_ms: 25.0,
            max_wind_speed_ms: 25.0,
            ..ThresholdConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn config_parses_from_toml() {
        let raw = r#"
            mode = "simulation"

            [devices.inverter-1]
            description = "hybrid inverter, roof array"

            [devices.inverter-1.thresholds]
            max_wind_speed_ms = 25.0
            warning_wind_speed_ms = 22.5

            [protocol]
            ack_timeout = 10
            ack_poll_interval = 1
        "#;
        let config: AppConfig = raw.parse().expect("config parses");
        assert!(config.mode.is_simulation());
        assert_eq!(config.devices.len(), 1);
        let device = config.device("inverter-1").expect("device present");
        assert_eq!(device.thresholds.max_wind_speed_ms, 25.0);
        assert_eq!(config.protocol.ack_timeout, Duration::from_secs(10));
    }

    #[test]
    fn empty_device_list_is_rejected() {
        let raw = "mode = \"production\"";
        let parsed: std::result::Result<AppConfig, _> = raw.parse();
        assert!(parsed.is_err());
    }

    #[test]
    fn invalid_device_thresholds_fail_validation() {
        let raw = r#"
            [devices.inverter-1.thresholds]
            max_wind_speed_ms = 20.0
            warning_wind_speed_ms = 24.0
        "#;
        let parsed: std::result::Result<AppConfig, _> = raw.parse();
        assert!(parsed.is_err());
    }
}
