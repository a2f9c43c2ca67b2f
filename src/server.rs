//! Listener lifecycle: bind, serve, drain on shutdown.

use crate::gateway::Gateway;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Serve the gateway on `0.0.0.0:port` until `shutdown` is cancelled.
///
/// After cancellation no new connections are accepted and in-flight requests
/// get `grace` to finish. Failing to bind is the only fatal error.
pub async fn serve(
    gateway: Arc<Gateway>,
    port: u16,
    grace: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Gateway listening");

    let app = gateway
        .router()
        .into_make_service_with_connect_info::<SocketAddr>();

    let signal = shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        signal.cancelled().await;
        info!("Shutdown requested, no longer accepting connections");
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server => return Ok(result??),
        _ = shutdown.cancelled() => {}
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => result??,
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "Grace period elapsed, abandoning in-flight requests");
            server.abort();
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
