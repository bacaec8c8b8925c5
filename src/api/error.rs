//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::fetch::{FetchError, ResourceError};
use crate::monitoring::MonitorError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Upstream rejected the request ({status}): {message}")]
    UpstreamRejected { status: u16, message: String },
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                detail.clone(),
            ),
            ApiError::NotFound(detail) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                detail.clone(),
            ),
            ApiError::UpstreamRejected { status, message } => {
                // Client errors pass through; anything else is our gateway's problem.
                let mapped = StatusCode::from_u16(*status)
                    .ok()
                    .filter(StatusCode::is_client_error)
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                (mapped, "UPSTREAM_REJECTED", message.clone())
            }
            ApiError::UpstreamUnavailable(detail) => {
                tracing::warn!(detail, "Upstream unavailable");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_UNAVAILABLE",
                    "Upstream service unavailable".to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ResourceError> for ApiError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Status { status, message } => {
                ApiError::UpstreamRejected { status, message }
            }
            ResourceError::Transport(detail) | ResourceError::Decode(detail) => {
                ApiError::UpstreamUnavailable(detail)
            }
            ResourceError::Cancelled | ResourceError::Superseded => {
                ApiError::UpstreamUnavailable("request superseded".into())
            }
            ResourceError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Resource(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
