//! Statistics API handlers.

use axum::extract::State;
use devpulse_storage::DeviceStats;
use serde::Serialize;

use super::common::HandlerResult;
use super::ServerState;

/// Stats response wrapper.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: DeviceStats,
}

/// Device counts: total, computed-active, and the remainder.
pub async fn get_stats_handler(State(state): State<ServerState>) -> HandlerResult<StatsResponse> {
    let stats = state.store.stats()?;
    Ok(axum::Json(StatsResponse {
        success: true,
        stats,
    }))
}
