//! Pulse basic library
//!
//! Provides functions shared by all Pulse crates:
//! - logging bootstrap and HTTP access-log middleware
//! - graceful shutdown
//! - layered configuration loading
//! - SQLite connection setup
//! - HTTP error types

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod api_types;
pub mod config_loader;
pub mod logging;
pub mod shutdown;

// Test utilities (for use in test code only)
pub mod test_utils;

pub use api_types::ErrorResponse;

#[cfg(feature = "axum")]
pub use api_types::{ApiResult, AppError};

pub use config_loader::ConfigLoader;

// Re-export common dependencies
pub use anyhow;
pub use serde_json;
pub use tokio;
