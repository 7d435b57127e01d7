//! Shared API models for Pulse services
//!
//! Error bodies are deliberately flat:
//!
//! ```text
//! 400  {"error": "Validation failed", "details": [{"field", "message", "code"}]}
//! 400  {"error": "Missing required parameter: device_id"}
//! 500  {"error": "Internal server error"}
//! ```
//!
//! Server-side causes are logged and never echoed to the client.

use errors::{FieldError, PulseError};
use serde::{Deserialize, Serialize};

/// Generic message for every 5xx body
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Message for validation failures
pub const VALIDATION_FAILED_MESSAGE: &str = "Validation failed";

/// Error response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Field-level failures, present only for validation errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.details = Some(details);
        self
    }
}

// ============================================================================
// AppError - HTTP Error with proper status codes (requires axum feature)
// ============================================================================

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

/// Application error with HTTP status code
#[cfg(feature = "axum")]
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

#[cfg(feature = "axum")]
pub type ApiResult<T> = Result<T, AppError>;

#[cfg(feature = "axum")]
impl AppError {
    pub fn new(status: StatusCode, body: ErrorResponse) -> Self {
        Self { status, body }
    }

    /// 400 with a plain message
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorResponse::new(message))
    }

    /// 400 with field-level details
    pub fn validation(details: Vec<FieldError>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(VALIDATION_FAILED_MESSAGE).with_details(details),
        )
    }

    /// 500 with the generic message
    pub fn internal_error() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(INTERNAL_ERROR_MESSAGE),
        )
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, ErrorResponse::new(message))
    }
}

#[cfg(feature = "axum")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(feature = "axum")]
impl From<PulseError> for AppError {
    fn from(err: PulseError) -> Self {
        match err {
            PulseError::Validation(details) => Self::validation(details),
            PulseError::BadRequest(message) => Self::bad_request(message),
            PulseError::MissingParameter(_) => Self::bad_request(err.to_string()),
            PulseError::ServiceUnavailable(ref reason) => {
                tracing::warn!(code = err.error_code(), "Service unavailable: {}", reason);
                Self::service_unavailable("Service unavailable")
            },
            other => {
                tracing::error!(code = other.error_code(), "Request failed: {}", other);
                Self::internal_error()
            },
        }
    }
}

#[cfg(feature = "axum")]
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::from(PulseError::Other(err))
    }
}
