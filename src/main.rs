//! Presence coordinator - authoritative session ledger and mode authority
//!
//! Serves the JSON API devices and operators talk to.
//!
//! Module structure:
//! - `domain/` - Core types (identities, sessions, modes, wire payloads)
//! - `io/` - External interfaces (HTTP API, HTTP client, sensor drivers)
//! - `services/` - Business logic (ledger, coordinator, device loops)
//! - `infra/` - Infrastructure (config, metrics, logging)

use anyhow::Context;
use clap::Parser;
use presence_gateway::infra::logging::init_tracing;
use presence_gateway::infra::{Config, Metrics};
use presence_gateway::io::start_api_server;
use presence_gateway::services::{Ledger, SessionCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Presence coordinator - session ledger and HTTP API
#[derive(Parser, Debug)]
#[command(name = "presence-coordinator", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/presence.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    info!(git_hash = env!("GIT_HASH"), "presence-coordinator starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        bind_address = %config.bind_address(),
        port = %config.port(),
        database = %config.database(),
        min_checkout_minutes = %config.min_checkout_minutes(),
        "config_loaded"
    );

    // Storage is the one fatal dependency
    let ledger = Ledger::open(config.database())
        .with_context(|| format!("Failed to open ledger {}", config.database()))?;

    let metrics = Arc::new(Metrics::new());
    let coordinator =
        Arc::new(SessionCoordinator::new(ledger, config.min_checkout_minutes(), metrics.clone()));
    info!(mode = %coordinator.mode(), "coordinator_ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Periodic metrics summary
    let metrics_interval = config.metrics_interval_secs();
    let mut metrics_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => metrics.report().log(),
                _ = metrics_shutdown.changed() => return,
            }
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    if let Err(e) =
        start_api_server(config.bind_address(), config.port(), coordinator, shutdown_rx).await
    {
        error!(error = %e, "api_server_error");
        return Err(e).with_context(|| {
            format!("Failed to serve on {}:{}", config.bind_address(), config.port())
        });
    }

    info!("presence-coordinator shutdown complete");
    Ok(())
}
