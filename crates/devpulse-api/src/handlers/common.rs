//! Shared handler plumbing: the error type and its 4xx/5xx mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Result type for handlers returning a JSON body.
pub type HandlerResult<T> = Result<Json<T>, ApiError>;

/// Handler error carrying the status code to respond with.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<devpulse_storage::Error> for ApiError {
    fn from(e: devpulse_storage::Error) -> Self {
        match e {
            devpulse_storage::Error::NotFound(msg) => ApiError::not_found(msg),
            devpulse_storage::Error::InvalidInput(msg) => ApiError::bad_request(msg),
            other => {
                tracing::error!(error = %other, "storage error in API handler");
                ApiError::internal("Storage operation failed")
            }
        }
    }
}
