//! `executor-ws`: WebSocket hub relaying submitted orders to executors.

use anyhow::Result;
use broker_server::{run_executor_ws, shutdown_on_ctrl_c, AppConfig, Services};
use clap::Parser;
use tracing::info;

/// Executor WebSocket hub
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via BROKER_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    broker_telemetry::init_logging()?;

    info!("Starting executor-ws v{}", env!("CARGO_PKG_VERSION"));

    let config_path = AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");
    let config = AppConfig::load(&config_path)?;
    info!(
        addr = %config.hub.listen_addr(),
        max_connections = config.hub.max_connections,
        "Configuration loaded"
    );

    let services = Services::connect(config).await?;
    run_executor_ws(services, shutdown_on_ctrl_c()).await?;
    Ok(())
}
