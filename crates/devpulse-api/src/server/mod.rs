//! HTTP server wiring.

pub mod router;
pub mod types;

pub use router::create_router_with_state;
pub use types::ServerState;

use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::info;

/// Serve the API until the shutdown signal flips or its sender is dropped.
pub async fn run(
    addr: SocketAddr,
    state: ServerState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");

    let app = create_router_with_state(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    info!("HTTP API stopped");
    Ok(())
}
