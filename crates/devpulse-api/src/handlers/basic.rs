//! Basic handlers - health check.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use super::ServerState;

/// Liveness probe, echoing the configured ports.
pub async fn health_handler(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "tcp_port": state.tcp_port,
        "http_port": state.http_port,
    }))
}
