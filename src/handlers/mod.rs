pub mod measurements;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::StoreError;

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound(err.to_string()),
            StoreError::MalformedCriteria { .. } | StoreError::InvalidRecord { .. } => {
                Self::BadRequest(err.to_string())
            }
            StoreError::Connection(_) => Self::Unavailable(err.to_string()),
            StoreError::Database { .. } | StoreError::Serialization(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), %message, "request failed");
        }

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
