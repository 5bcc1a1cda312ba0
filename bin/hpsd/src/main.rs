//! ---
//! hps_section: "01-core-functionality"
//! hps_subsection: "binary"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Binary entrypoint for the HPS daemon."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use hps_common::config::AppConfig;
use hps_common::logging::init_tracing;
use hps_common::Mode;
use hps_core::Supervisor;
use hps_protocol::{InMemoryTransport, Transport, WebSocketTransport};
use tokio::signal;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "HPS daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the supervisor")]
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.prod.toml"));
    candidates.push(PathBuf::from("configs/example.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    init_tracing("hpsd", &config.logging)?;
    info!(config_path = %loaded.source.display(), "configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
    }
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    // simulation wires a loopback transport so the full control loop runs
    // without hardware
    let transport: Arc<dyn Transport> = if config.mode.is_simulation() {
        Arc::new(InMemoryTransport::loopback())
    } else {
        Arc::new(WebSocketTransport)
    };

    let handle = Supervisor::new(config, transport).start().await?;

    info!(mode = ?handle.mode(), "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    handle.shutdown().await?;
    Ok(())
}
