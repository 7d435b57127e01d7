//! Key construction and resource naming

use errors::{PulseError, PulseResult};
use serde::{Deserialize, Serialize};

/// Partition prefix shared by events and alerts
pub const DEVICE_PREFIX: &str = "DEVICE#";

/// Partition key for a device: `DEVICE#<device_id>`
pub fn device_partition_key(device_id: &str) -> String {
    format!("{}{}", DEVICE_PREFIX, device_id)
}

/// Table and queue names are interpolated into SQL, so only `[A-Za-z0-9_]+` is allowed
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Resource identifiers injected at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    pub rules: String,
    pub alerts: String,
    pub events: String,
    pub queue: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            rules: "rules".to_string(),
            alerts: "alerts".to_string(),
            events: "events".to_string(),
            queue: "events_queue".to_string(),
        }
    }
}

impl TableNames {
    pub fn validate(&self) -> PulseResult<()> {
        for (field, name) in [
            ("rules", &self.rules),
            ("alerts", &self.alerts),
            ("events", &self.events),
            ("queue", &self.queue),
        ] {
            if !is_valid_identifier(name) {
                return Err(PulseError::InvalidConfig {
                    field: field.to_string(),
                    reason: format!("'{}' must match [A-Za-z0-9_]+", name),
                });
            }
        }
        Ok(())
    }

    /// Dead-letter table for the configured queue
    pub fn dead_letter_queue(&self) -> String {
        format!("{}_dlq", self.queue)
    }
}
