use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use turnstile::config::TurnstileConfig;
use turnstile::http::HttpServer;
use turnstile::ratelimit::Sweeper;

#[derive(Parser, Debug)]
#[command(name = "turnstile")]
#[command(about = "Fixed-window request admission service for HTTP APIs")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Turnstile Request Admission Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Load configuration
    let mut config = match args.config.as_deref() {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    // Build the limiters; invalid policy values abort startup here
    let limiters = Arc::new(config.rate_limiting.build_limiters()?);
    info!("Rate limiters initialized");

    // Start the eviction sweep
    let sweeper = Sweeper::start(Arc::clone(&limiters), config.rate_limiting.sweep_interval());

    // Run the server with graceful shutdown on Ctrl+C
    let server = HttpServer::new(config.server.listen_addr, limiters);
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.stop().await;

    info!("Turnstile Request Admission Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
