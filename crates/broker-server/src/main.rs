//! `broker-api`: REST API issuing broker order and payment signatures.

use anyhow::Result;
use broker_server::{run_api, shutdown_on_ctrl_c, AppConfig, Services};
use clap::Parser;
use tracing::info;

/// Broker signing API
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

    info!("Starting broker-api v{}", env!("CARGO_PKG_VERSION"));

    let config_path = AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");
    let config = AppConfig::load(&config_path)?;
    info!(
        addr = %config.api.listen_addr(),
        base_fee_tbps = config.api.base_fee_tbps,
        "Configuration loaded"
    );

    let services = Services::connect(config).await?;
    run_api(services, shutdown_on_ctrl_c()).await?;
    Ok(())
}
