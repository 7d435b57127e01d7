//! Request and response bodies

use pulse_rules::{Alert, Rule, StoredEvent};
use pulse_store::QueueMessage;
use serde::{Deserialize, Serialize};

pub const RULE_CREATED_MESSAGE: &str = "Rule created successfully";
pub const EVENT_INGESTED_MESSAGE: &str = "Event ingested successfully";

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct DeviceFilter {
    pub device_id: Option<String>,
}

/// Time bounds kept as text so a bad integer is reported as a 400
#[derive(Debug, Default, Deserialize)]
pub struct TimeRangeQuery {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RuleCreatedResponse {
    pub message: String,
    pub rule_id: String,
    pub rule: Rule,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RuleListResponse {
    pub rules: Vec<Rule>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertListResponse {
    pub device_id: String,
    pub alerts: Vec<Alert>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventIngestedResponse {
    pub message: String,
    pub event_id: String,
    pub request_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventListResponse {
    pub device_id: String,
    pub events: Vec<StoredEvent>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeadLetterResponse {
    pub messages: Vec<QueueMessage>,
    pub count: usize,
}
