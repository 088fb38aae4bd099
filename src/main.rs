use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use warden::config::Config;
use warden::shutdown;
use warden::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version)]
#[command(about = "Process supervisor for the image processing worker")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Grace period in milliseconds between shutdown signal and forced exit
    #[arg(long, default_value_t = 1000)]
    grace_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = Config::load(&args.config).await?;
    let instance_id = config.ensure_instance_id(&args.config).await?;
    tracing::info!(
        instance_id = %instance_id,
        host = %config.host,
        "Configuration loaded"
    );

    let token = shutdown::install_shutdown_handler(Duration::from_millis(args.grace_ms));

    let supervisor = Supervisor::new(config, instance_id, token)?;
    supervisor.run().await?;

    Ok(())
}
