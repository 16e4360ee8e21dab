//! HTTP server lifecycle
//!
//! Binds the configured address and serves the router until the shutdown
//! signal fires, then drains gracefully.

use crate::config::CaravanConfig;
use crate::domain::{CaravanError, Result};
use crate::http::router::{router, AppState};
use std::net::SocketAddr;
use tokio::sync::watch;

/// Serves the HTTP boundary until shutdown
///
/// # Errors
///
/// Returns an error if the bind address is invalid or the listener fails.
pub async fn serve(
    config: &CaravanConfig,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .map_err(|_| CaravanError::Configuration(format!(
            "Invalid bind address: {}",
            config.server.bind_addr
        )))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            tracing::info!("Shutdown signal received, draining HTTP server");
        })
        .await?;

    Ok(())
}
