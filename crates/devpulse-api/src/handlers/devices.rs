//! Device API handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use devpulse_storage::{DeviceRecord, DeviceStatus, LogEntry, DEFAULT_LOG_LIMIT};
use serde::{Deserialize, Serialize};

use super::common::{ApiError, HandlerResult};
use super::ServerState;

/// Device list response.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceListResponse {
    pub success: bool,
    pub count: usize,
    pub devices: Vec<DeviceRecord>,
}

/// Single device response.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceResponse {
    pub success: bool,
    pub device: DeviceRecord,
}

/// Device log list response.
#[derive(Debug, Clone, Serialize)]
pub struct LogListResponse {
    pub success: bool,
    pub count: usize,
    pub logs: Vec<LogEntry>,
}

/// Query parameters for the logs endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

/// Body of a status update request.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: Option<String>,
}

/// Status update response.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub message: &'static str,
    pub changes: usize,
}

/// All devices, most recently seen first.
pub async fn list_devices_handler(
    State(state): State<ServerState>,
) -> HandlerResult<DeviceListResponse> {
    let devices = state.store.list_all()?;
    Ok(Json(DeviceListResponse {
        success: true,
        count: devices.len(),
        devices,
    }))
}

/// Devices that are both flagged active and fresh.
pub async fn list_active_devices_handler(
    State(state): State<ServerState>,
) -> HandlerResult<DeviceListResponse> {
    let devices = state.store.list_active()?;
    Ok(Json(DeviceListResponse {
        success: true,
        count: devices.len(),
        devices,
    }))
}

/// One device by identity, or 404.
pub async fn get_device_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
) -> HandlerResult<DeviceResponse> {
    match state.store.get_by_id(&device_id)? {
        Some(device) => Ok(Json(DeviceResponse {
            success: true,
            device,
        })),
        None => Err(ApiError::not_found("Device not found")),
    }
}

/// Most recent log rows for a device, newest first.
pub async fn get_device_logs_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> HandlerResult<LogListResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    let logs = state.store.get_logs(&device_id, limit)?;
    Ok(Json(LogListResponse {
        success: true,
        count: logs.len(),
        logs,
    }))
}

/// Overwrite a device's status. 400 without a valid `status` field, 404 for
/// an unknown device.
pub async fn update_device_status_handler(
    State(state): State<ServerState>,
    Path(device_id): Path<String>,
    Json(body): Json<StatusUpdateRequest>,
) -> HandlerResult<StatusUpdateResponse> {
    let Some(status) = body.status else {
        return Err(ApiError::bad_request("Status is required"));
    };
    let status: DeviceStatus = status
        .parse()
        .map_err(|_| ApiError::bad_request("Status must be 'active' or 'inactive'"))?;

    let changes = state.store.set_status(&device_id, status)?;
    if changes == 0 {
        return Err(ApiError::not_found("Device not found"));
    }

    Ok(Json(StatusUpdateResponse {
        success: true,
        message: "Device status updated",
        changes,
    }))
}
