//! Clock abstraction
//!
//! Record timestamps (`created_at`, `triggered_at`, `ingested_at`) come from
//! a provider so tests can pin them.

use std::time::{SystemTime, UNIX_EPOCH};

pub trait TimeProvider: Send + Sync + 'static {
    /// Current time in milliseconds since Unix epoch
    fn now_millis(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        // A clock before 1970 reads as 0
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

/// Always returns the same instant
#[derive(Clone, Copy, Debug)]
pub struct FixedTimeProvider {
    timestamp_ms: i64,
}

impl FixedTimeProvider {
    pub fn new(timestamp_ms: i64) -> Self {
        Self { timestamp_ms }
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now_millis(&self) -> i64 {
        self.timestamp_ms
    }
}
