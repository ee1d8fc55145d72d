//! Switchboard registry - main entry point.
//!
//! Loads configuration, opens the registry on its JSON catalog, starts the
//! health monitor and runs until interrupted. Transports that expose the
//! registry's operations are hosted by the embedding application.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use switchboard_core::registry::{HttpEndpointProbe, JsonFileStore, Registry};
use switchboard_core::Config;

#[derive(Debug, Parser)]
#[command(name = "switchboard", version, about = "Registry and health monitor for tool servers")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog file; overrides the configured registry_file.
    #[arg(long)]
    registry_file: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env()?;
    if let Some(path) = cli.registry_file {
        config.registry.registry_file = path;
    }
    if cli.json_logs {
        config.observability.json_logs = true;
    }

    switchboard_core::observability::init_tracing(&config.observability);

    let store = Arc::new(JsonFileStore::new(&config.registry.registry_file));
    let prober = Arc::new(HttpEndpointProbe::new(config.registry.probe_timeout)?);
    let registry = Registry::open(&config, store, prober).await;

    tracing::info!(
        name = %config.server.name,
        version = %config.server.version,
        registry_file = %config.registry.registry_file.display(),
        operations = registry.list_operations().len(),
        "switchboard_starting"
    );

    registry.start_monitoring().await;
    tokio::signal::ctrl_c().await?;

    tracing::info!("switchboard_shutting_down");
    registry.stop_monitoring().await;
    Ok(())
}
