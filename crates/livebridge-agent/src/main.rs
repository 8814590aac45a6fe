//! # livebridge-agent
//!
//! Relay server binary — loads configuration, installs logging and metrics,
//! and serves the HTTP/WebSocket surface until interrupted.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use livebridge_server::{AppState, Settings, metrics, router};

/// Livebridge relay server.
#[derive(Parser, Debug)]
#[command(name = "livebridge-agent", about = "Livebridge relay server")]
struct Cli {
    /// Host to bind (overrides `LIVEBRIDGE_HOST`).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides `LIVEBRIDGE_PORT`; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Skip installing the Prometheus recorder; `/metrics` returns 404.
    #[arg(long)]
    no_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut settings = Settings::from_env().context("failed to load configuration")?;
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }

    let recorder = if args.no_metrics {
        None
    } else {
        Some(metrics::install_recorder())
    };

    let bind = format!("{}:{}", settings.host, settings.port);
    info!(
        bind = %bind,
        model = %settings.upstream.model_id,
        location = %settings.upstream.location,
        "starting relay server"
    );

    let app = router(AppState::new(settings, recorder));
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
