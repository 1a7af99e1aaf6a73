//! IRToy GW - Rust implementation
//!
//! Daemon bridging a USB IR Toy transceiver to key injection, remote-control
//! peers, and scripted actions.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use irtoy_gw::config::AppConfig;
use irtoy_gw::server::Server;

/// IRToy Gateway - route IR remote buttons to keymaps and actuators
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long)]
    config: Option<String>,

    /// IR device path, e.g. /dev/ttyACM* (overrides the config file)
    #[arg(short = 'i', long)]
    device: Option<String>,

    /// Command server port (overrides the config file)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Additional control files with button/keymap entries
    #[arg(short = 'c', long = "controls")]
    controls: Vec<PathBuf>,

    /// Capture log file for received packets (overrides the config file)
    #[arg(short = 'o', long)]
    capture_log: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting IRToy GW...");

    let mut config = match &args.config {
        Some(path) => {
            info!("Configuration file: {}", path);
            AppConfig::load(path).await?
        }
        None => AppConfig::default(),
    };

    // Command-line flags override the config file.
    if let Some(device) = args.device {
        config.device = Some(device);
    }
    if let Some(port) = args.port {
        config.command_port = Some(port);
    }
    if let Some(path) = args.capture_log {
        config.capture_log = Some(path);
    }
    config.controls.extend(args.controls);

    let mut server = Server::new(config)?;
    server.load_controls()?;
    server.start().await?;

    tokio::select! {
        result = server.run() => result,
        _ = shutdown_signal() => {
            info!("IRToy GW shutdown complete");
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
