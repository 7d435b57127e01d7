//! Record type definitions
//!
//! - Rule: stored threshold condition for a (device, metric) pair
//! - DeviceEvent: one observation as delivered by the queue
//! - Alert: a rule satisfied by an event
//! - StoredEvent / EventMessage: ingestion-side records

use crate::evaluator::{coerce_numeric, Operator};
use errors::{PulseError, PulseResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved device id that forces a consumer failure when failure injection is enabled
pub const FAILURE_INJECTION_DEVICE: &str = "__fail_test__";

// ============================================================================
// Rule
// ============================================================================

/// Stored rule record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier, generated on creation
    pub rule_id: String,

    pub device_id: String,

    /// Metric name matched against the event `type`
    pub metric: String,

    pub operator: Operator,

    pub threshold: u64,

    /// Absent in a stored record means enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Creation time, epoch milliseconds
    pub created_at: i64,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    /// Whether this rule applies to an event of the given device and metric
    pub fn matches(&self, device_id: &str, metric: &str) -> bool {
        self.enabled && self.device_id == device_id && self.metric == metric
    }

    /// Evaluate this rule against an observed value
    pub fn is_triggered_by(&self, value: f64) -> bool {
        self.operator.evaluate(self.threshold as f64, value)
    }
}

/// Validated rule data before an identifier and timestamp are assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub device_id: String,
    pub metric: String,
    pub operator: Operator,
    pub threshold: u64,
    pub enabled: bool,
}

impl NewRule {
    pub fn into_rule(self, rule_id: impl Into<String>, created_at: i64) -> Rule {
        Rule {
            rule_id: rule_id.into(),
            device_id: self.device_id,
            metric: self.metric,
            operator: self.operator,
            threshold: self.threshold,
            enabled: self.enabled,
            created_at,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Device event as carried in a queue message body
///
/// Accepts `ts` or `timestamp` for the event time, `ts` winning when both
/// are present; ingestion adds `event_id` and `evaluated_at` which are not
/// required here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DeviceEventBody")]
pub struct DeviceEvent {
    pub device_id: String,

    #[serde(rename = "type")]
    pub metric: String,

    /// Raw value; numeric coercion happens at evaluation time
    pub value: Value,

    pub ts: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

#[derive(Deserialize)]
struct DeviceEventBody {
    device_id: String,
    #[serde(rename = "type")]
    metric: String,
    value: Value,
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    event_id: Option<String>,
}

impl TryFrom<DeviceEventBody> for DeviceEvent {
    type Error = String;

    fn try_from(body: DeviceEventBody) -> Result<Self, Self::Error> {
        let ts = body
            .ts
            .or(body.timestamp)
            .ok_or_else(|| "missing field `ts` or `timestamp`".to_string())?;
        Ok(Self {
            device_id: body.device_id,
            metric: body.metric,
            value: body.value,
            ts,
            event_id: body.event_id,
        })
    }
}

impl DeviceEvent {
    /// Numeric view of `value`
    ///
    /// Unparseable values are an error rather than a silent non-trigger.
    pub fn numeric_value(&self) -> PulseResult<f64> {
        coerce_numeric(&self.value).ok_or_else(|| {
            PulseError::InvalidValue(format!(
                "device {} metric {}: {} is not numeric",
                self.device_id, self.metric, self.value
            ))
        })
    }
}

/// Validated ingestion payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInput {
    pub device_id: String,
    #[serde(rename = "type")]
    pub metric: String,
    pub value: i64,
    pub ts: i64,
}

/// Event record persisted by ingestion, keyed by device partition and `ts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub device_id: String,
    pub ts: i64,
    pub event_id: String,
    #[serde(rename = "type")]
    pub metric: String,
    pub value: i64,
    /// Original request body
    pub raw: String,
    /// Ingestion time, epoch milliseconds
    pub ingested_at: i64,
    pub request_id: String,
}

/// Queue message body produced by ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub device_id: String,
    pub event_id: String,
    #[serde(rename = "type")]
    pub metric: String,
    pub value: i64,
    pub timestamp: i64,
    pub evaluated_at: i64,
}

impl EventMessage {
    pub fn from_stored(event: &StoredEvent, evaluated_at: i64) -> Self {
        Self {
            device_id: event.device_id.clone(),
            event_id: event.event_id.clone(),
            metric: event.metric.clone(),
            value: event.value,
            timestamp: event.ts,
            evaluated_at,
        }
    }
}

// ============================================================================
// Alert
// ============================================================================

/// Alert record: partitioned by device, sorted by detection time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub device_id: String,
    /// Detection time, epoch milliseconds
    pub triggered_at: i64,
    pub rule_id: String,
    pub metric: String,
    pub value: f64,
    pub threshold: u64,
}

impl Alert {
    pub fn for_rule(rule: &Rule, value: f64, triggered_at: i64) -> Self {
        Self {
            device_id: rule.device_id.clone(),
            triggered_at,
            rule_id: rule.rule_id.clone(),
            metric: rule.metric.clone(),
            value,
            threshold: rule.threshold,
        }
    }
}
