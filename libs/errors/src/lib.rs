//! Unified error handling for Pulse services
//!
//! One error enum shared by the stores, the consumer and the HTTP layer, plus the
//! field-level validation record returned to API clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// FieldError - validation failure record
// ============================================================================

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Offending field name (`body` when the payload itself is unusable)
    pub field: String,
    /// Human readable message
    pub message: String,
    /// Stable machine readable code (e.g. `missing`, `invalid_type`)
    pub code: String,
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

// ============================================================================
// PulseError - Main error type
// ============================================================================

/// Main error type for all Pulse crates
#[derive(Debug, Error)]
pub enum PulseError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Database Errors
    // ======================================
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    // ======================================
    // Queue Errors
    // ======================================
    #[error("Queue error: {0}")]
    Queue(String),

    // ======================================
    // Client Input Errors
    // ======================================
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {} field error(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    // ======================================
    // Message Processing Errors
    // ======================================
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Invalid event value: {0}")]
    InvalidValue(String),

    #[error("Injected failure for device {0}")]
    InjectedFailure(String),

    // ======================================
    // Serialization & Runtime Errors
    // ======================================
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PulseError
pub type PulseResult<T> = Result<T, PulseError>;

/// Error category - used for classification in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Database,
    Queue,
    Validation,
    Processing,
    Unavailable,
    Internal,
}

impl PulseError {
    /// Shorthand for a single field validation failure
    pub fn field(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation(vec![FieldError::new(field, message, code)])
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::BadRequest(_) | Self::Validation(_) | Self::MissingParameter(_) => 400,

            // 503 Service Unavailable
            Self::ServiceUnavailable(_) => 503,

            // Everything else is a server-side failure
            _ => 500,
        }
    }

    /// Stable error code for logs and API payloads
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Queue(_) => "QUEUE_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::MissingParameter(_) => "MISSING_PARAMETER",
            Self::MalformedMessage(_) => "MALFORMED_MESSAGE",
            Self::InvalidValue(_) => "INVALID_VALUE",
            Self::InjectedFailure(_) => "INJECTED_FAILURE",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,
            Self::Database(_) | Self::Sqlite(_) => ErrorCategory::Database,
            Self::Queue(_) => ErrorCategory::Queue,
            Self::BadRequest(_) | Self::Validation(_) | Self::MissingParameter(_) => {
                ErrorCategory::Validation
            },
            Self::MalformedMessage(_) | Self::InvalidValue(_) | Self::InjectedFailure(_) => {
                ErrorCategory::Processing
            },
            Self::ServiceUnavailable(_) => ErrorCategory::Unavailable,
            Self::Serialization(_) | Self::Io(_) | Self::Internal(_) | Self::Other(_) => {
                ErrorCategory::Internal
            },
        }
    }

    /// Whether the failure is the client's fault (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Field errors carried by a validation failure, empty otherwise
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Shorthand for [`PulseError::Configuration`]
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::PulseError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::PulseError::Configuration(format!($fmt, $($arg)*))
    };
}
