//! ---
//! hps_section: "01-core-functionality"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Shared primitives and utilities for the supervisor runtime."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
//! Core shared primitives for the HPS supervisor workspace.
//! This crate exposes configuration loading, threshold validation, and
//! logging bootstrap utilities consumed across the workspace.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, DeviceConfig, LoadedAppConfig, LoggingConfig, Mode, ProtocolConfig,
    SupervisorConfig, ThresholdConfig, ThresholdError,
};
pub use logging::{init_tracing, LogFormat};
