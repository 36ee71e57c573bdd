//! Nexa Manager realtime consumer - Entry Point

use anyhow::Result;
use clap::Parser;
use nexa_live::{AppConfig, Application};
use tracing::info;

/// Nexa Manager realtime consumer
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via NEXA_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Realtime server URL, overrides `ws_url` from the configuration
    #[arg(long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any wss:// connection
    nexa_realtime::init_crypto();

    let args = Args::parse();

    nexa_telemetry::init_logging()?;

    info!("Starting nexa-live v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match args.config {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            AppConfig::from_file(&path)?
        }
        None => AppConfig::load()?,
    };

    if let Some(url) = args.url {
        config.ws_url = url;
        config.validate()?;
    }
    info!(ws_url = %config.ws_url, "Configuration loaded");

    let app = Application::new(config)?;
    app.run().await?;

    Ok(())
}
