//! Fraud Detection Gateway - Main Entry Point
//!
//! Serves `/api/v1/detect` in front of the primary detector and the fallback
//! engine until Ctrl-C or SIGTERM.

use anyhow::Result;
use fraud_gateway::{config::AppConfig, gateway::Gateway, server, stats::StatsReporter};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Starting Fraud Detection Gateway");

    let config = AppConfig::load()?;
    config.log_summary();

    let gateway = Arc::new(Gateway::from_config(&config)?);

    // Periodic summary of the running statistics
    if config.stats.report_interval_secs > 0 {
        let reporter = StatsReporter::new(
            gateway.dispatcher().stats().clone(),
            config.stats.report_interval_secs,
        );
        tokio::spawn(async move {
            reporter.start().await;
        });
    }

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        server::shutdown_signal().await;
        trigger.cancel();
    });

    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    let result = server::serve(gateway.clone(), config.server.port, grace, shutdown).await;

    info!("Gateway shutting down...");
    let cache = gateway.dispatcher().cache();
    cache.shutdown(grace).await;
    let counters = cache.counters();
    info!(
        written = counters.written,
        failed = counters.failed,
        dropped = counters.dropped,
        "Result cache closed"
    );
    gateway.dispatcher().stats().log_summary();

    result
}

fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("fraud_gateway=info,tower_http=info"))?;

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}
