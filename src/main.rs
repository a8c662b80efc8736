//! watchmux binary: load configuration, bind the listener, serve.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use watchmux::config::{load_config, ProxyConfig};
use watchmux::observability;
use watchmux::HttpServer;

/// Streaming reverse proxy aggregating upstream watch streams.
#[derive(Debug, Parser)]
#[command(name = "watchmux", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Override the upstream target URL.
    #[arg(long)]
    target: Option<String>,

    /// Log every dial and forwarded frame.
    #[arg(long)]
    trace_frames: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    observability::logging::init();
    tracing::info!("watchmux v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(target) = cli.target {
        config.upstream.target = target;
    }
    if cli.trace_frames {
        config.observability.trace_frames = true;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        target = %config.upstream.target,
        trace_frames = config.observability.trace_frames,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
