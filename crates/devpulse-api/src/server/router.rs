//! Application router configuration.

use axum::{
    routing::{get, put},
    Router,
};
use tower_http::cors::CorsLayer;

use super::types::ServerState;
use crate::handlers::{basic, devices, stats};

/// Create the application router.
pub fn create_router_with_state(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(basic::health_handler))
        .route("/api/devices", get(devices::list_devices_handler))
        .route("/api/devices/active", get(devices::list_active_devices_handler))
        .route("/api/devices/:device_id", get(devices::get_device_handler))
        .route(
            "/api/devices/:device_id/logs",
            get(devices::get_device_logs_handler),
        )
        .route(
            "/api/devices/:device_id/status",
            put(devices::update_device_status_handler),
        )
        .route("/api/stats", get(stats::get_stats_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
