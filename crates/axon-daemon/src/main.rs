//! Axon Daemon - Main entry point
//!
//! Starts the bridge on the configured driver and serves the device tree
//! over HTTP and WebSocket until interrupted, then flushes the driver
//! configuration of every network.

mod api;
mod config;
mod server;
mod state;
mod ws;

use anyhow::Result;
use axon_bridge::{Bridge, SessionEvent};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "axon")]
#[command(about = "Z-Wave device tree bridge daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "axon.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print the device tree once the network is queried, then exit
    #[arg(long)]
    print_tree: bool,

    /// Write a default configuration file and exit
    #[arg(long)]
    write_default_config: bool,
}

/// How long `--print-tree` waits for the driver to finish its queries
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Axon v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Default configuration written");
        return Ok(());
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        device = %config.driver.device,
        config_dir = %config.driver.config_dir.display(),
        "Configuration loaded"
    );

    let driver = state::create_driver(&config.driver)?;
    let bridge = Bridge::start(driver, &config.bridge)?;
    let mut events = bridge.subscribe();
    bridge.add_controller(&config.driver.device)?;

    if args.print_tree {
        // Single snapshot mode
        let settled = tokio::time::timeout(QUERY_TIMEOUT, async {
            while let Ok(event) = events.recv().await {
                if matches!(event, SessionEvent::QueriesComplete { .. }) {
                    break;
                }
            }
        })
        .await;
        if settled.is_err() {
            warn!("Network queries did not complete in time, printing the tree as it is");
        }

        let tree = bridge.snapshot().await?;
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        // Daemon mode - serve until interrupted
        drop(events);
        let app_state = state::AppState::new(config.clone(), &bridge);
        server::run(app_state, &config.daemon.bind, shutdown_signal()).await?;
    }

    let flushed = bridge.shutdown().await?;
    info!(networks = flushed.len(), "Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
