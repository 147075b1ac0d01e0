use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jobwatch_client::JobwatchClient;

/// Watches the process table for configured command patterns and fires one
/// webhook alarm per finished process.
#[derive(Parser, Debug)]
#[command(name = "jobwatch", version)]
struct Args {
    /// Path to the JSON configuration file, reloaded while running.
    #[arg(default_value = "jobwatch.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    info!(config = %args.config.display(), "starting jobwatch");

    let client = JobwatchClient::new(args.config);
    client.start().await;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    client.stop().await;

    Ok(())
}
