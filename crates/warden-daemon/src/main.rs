//! Pixel Warden daemon
//!
//! Watches a canvas region against a template, attributes every broken pixel
//! to its painter and reports offenders to Discord.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_daemon::{DaemonConfig, DaemonError, DaemonResult, RunOptions, Server};

/// Pixel Warden daemon CLI
#[derive(Parser)]
#[command(name = "wardend")]
#[command(about = "Pixel Warden - canvas template guard", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WARDEN_CONFIG")]
    config: Option<String>,

    /// Operator API listen address (overrides the config file)
    #[arg(short, long, env = "WARDEN_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (overrides the config file)
    #[arg(long, env = "WARDEN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "WARDEN_LOG_JSON")]
    json: bool,

    /// Log notifications instead of sending them; never write the ledger
    #[arg(long, env = "WARDEN_DRY_RUN")]
    dry_run: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        tile = %format!("{}/{}", config.canvas.tile_x, config.canvas.tile_y),
        template = %config.template.path.display(),
        channels = config.notifier.channels.len(),
        dry_run = cli.dry_run,
        "Starting Pixel Warden"
    );

    let options = RunOptions {
        dry_run: cli.dry_run,
        once: cli.once,
    };

    let server = Server::new(config, options).await?;
    server.run().await
}
