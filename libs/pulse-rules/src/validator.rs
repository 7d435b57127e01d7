//! Payload validation
//!
//! Request bodies arrive as untyped JSON and are checked field by field.
//! Every check produces a [`FieldError`]; callers map a non-empty list to a
//! 400 response.

use crate::evaluator::Operator;
use crate::types::{EventInput, NewRule};
use errors::FieldError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Loosely typed view of a create-rule body
///
/// Fields stay as raw JSON so that type mismatches are reported per field
/// instead of failing the whole deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRuleRequest {
    #[serde(default)]
    pub device_id: Option<Value>,
    #[serde(default)]
    pub metric: Option<Value>,
    #[serde(default)]
    pub operator: Option<Value>,
    #[serde(default)]
    pub threshold: Option<Value>,
    #[serde(default)]
    pub enabled: Option<Value>,
}

/// Loosely typed view of an ingest-event body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestEventRequest {
    #[serde(default)]
    pub device_id: Option<Value>,
    #[serde(default, rename = "type")]
    pub metric: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub ts: Option<Value>,
}

fn body_error() -> Vec<FieldError> {
    vec![FieldError::new(
        "body",
        "request body must be a JSON object",
        "invalid_type",
    )]
}

// ============================================================================
// Rule validation
// ============================================================================

/// Validate a create-rule payload, collecting every field error
pub fn validate_rule(body: &Value) -> Result<NewRule, Vec<FieldError>> {
    if !body.is_object() {
        return Err(body_error());
    }
    let request: CreateRuleRequest =
        serde_json::from_value(body.clone()).map_err(|_| body_error())?;

    let mut errors = Vec::new();

    let device_id = required_string(&mut errors, "device_id", request.device_id.as_ref());
    let metric = required_string(&mut errors, "metric", request.metric.as_ref());
    let operator = operator_field(&mut errors, request.operator.as_ref());
    let threshold = threshold_field(&mut errors, request.threshold.as_ref());

    let enabled = match request.enabled {
        None | Some(Value::Null) => Some(true),
        Some(Value::Bool(b)) => Some(b),
        Some(_) => {
            errors.push(FieldError::new(
                "enabled",
                "enabled must be a boolean",
                "invalid_type",
            ));
            None
        },
    };

    match (device_id, metric, operator, threshold, enabled) {
        (Some(device_id), Some(metric), Some(operator), Some(threshold), Some(enabled))
            if errors.is_empty() =>
        {
            Ok(NewRule {
                device_id,
                metric,
                operator,
                threshold,
                enabled,
            })
        },
        _ => Err(errors),
    }
}

fn required_string(errors: &mut Vec<FieldError>, field: &str, value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(
                field,
                format!("{} is required", field),
                "missing",
            ));
            None
        },
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(FieldError::new(
                field,
                format!("{} cannot be empty", field),
                "empty",
            ));
            None
        },
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            errors.push(FieldError::new(
                field,
                format!("{} must be a string", field),
                "invalid_type",
            ));
            None
        },
    }
}

fn operator_field(errors: &mut Vec<FieldError>, value: Option<&Value>) -> Option<Operator> {
    let allowed = Operator::ALL.map(Operator::as_str).join(", ");
    match value {
        None | Some(Value::Null) => {
            errors.push(FieldError::new("operator", "operator is required", "missing"));
            None
        },
        Some(Value::String(s)) => match s.trim().parse::<Operator>() {
            Ok(op) => Some(op),
            Err(_) => {
                errors.push(FieldError::new(
                    "operator",
                    format!("operator must be one of: {}", allowed),
                    "invalid_choice",
                ));
                None
            },
        },
        Some(_) => {
            errors.push(FieldError::new(
                "operator",
                format!("operator must be one of: {}", allowed),
                "invalid_type",
            ));
            None
        },
    }
}

/// Largest accepted threshold: every integer up to 2^53 is exact as `f64`
pub const MAX_THRESHOLD: u64 = 1 << 53;

fn threshold_field(errors: &mut Vec<FieldError>, value: Option<&Value>) -> Option<u64> {
    match value {
        None | Some(Value::Null) => {
            errors.push(FieldError::new("threshold", "threshold is required", "missing"));
            None
        },
        Some(Value::Number(n)) => {
            if let Some(t) = n.as_u64() {
                if t > MAX_THRESHOLD {
                    errors.push(FieldError::new(
                        "threshold",
                        format!("threshold must be less than or equal to {}", MAX_THRESHOLD),
                        "out_of_range",
                    ));
                    return None;
                }
                Some(t)
            } else if n.as_i64().is_some() {
                errors.push(FieldError::new(
                    "threshold",
                    "threshold must be greater than or equal to 0",
                    "out_of_range",
                ));
                None
            } else {
                // Any float, including 80.0, is rejected
                errors.push(FieldError::new(
                    "threshold",
                    "threshold must be an integer",
                    "invalid_type",
                ));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new(
                "threshold",
                "threshold must be an integer",
                "invalid_type",
            ));
            None
        },
    }
}

// ============================================================================
// Event validation
// ============================================================================

const EVENT_FIELDS: [&str; 4] = ["device_id", "type", "value", "ts"];

/// Validate an ingest-event payload
///
/// A missing field stops validation immediately; otherwise every field is
/// checked and all errors are returned together.
pub fn validate_event(body: &Value) -> Result<EventInput, Vec<FieldError>> {
    let Some(object) = body.as_object() else {
        return Err(body_error());
    };

    if let Some(missing) = EVENT_FIELDS.iter().find(|f| !object.contains_key(**f)) {
        return Err(vec![FieldError::new(
            *missing,
            format!("Missing required field: {}", missing),
            "missing",
        )]);
    }

    let request: IngestEventRequest =
        serde_json::from_value(body.clone()).map_err(|_| body_error())?;

    let mut errors = Vec::new();

    let device_id = non_empty_text(&mut errors, "device_id", request.device_id.as_ref());
    let metric = non_empty_text(&mut errors, "type", request.metric.as_ref());

    // A JSON null deserializes to None here
    let value = match integer_value(request.value.as_ref().unwrap_or(&Value::Null)) {
        Ok(v) => Some(v),
        Err(message) => {
            errors.push(FieldError::new("value", message, "invalid_type"));
            None
        },
    };

    let ts = match request.ts.as_ref().and_then(integer_timestamp) {
        Some(ts) => Some(ts),
        None => {
            errors.push(FieldError::new(
                "ts",
                "ts must be a valid integer timestamp",
                "invalid_type",
            ));
            None
        },
    };

    match (device_id, metric, value, ts) {
        (Some(device_id), Some(metric), Some(value), Some(ts)) if errors.is_empty() => {
            Ok(EventInput {
                device_id,
                metric,
                value,
                ts,
            })
        },
        _ => Err(errors),
    }
}

/// Event identifiers: strings (trimmed) or numbers rendered as text
fn non_empty_text(errors: &mut Vec<FieldError>, field: &str, value: Option<&Value>) -> Option<String> {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            errors.push(FieldError::new(
                field,
                format!("{} must be a string", field),
                "invalid_type",
            ));
            return None;
        },
    };
    if text.is_empty() {
        errors.push(FieldError::new(
            field,
            format!("{} cannot be empty", field),
            "empty",
        ));
        return None;
    }
    Some(text)
}

/// Integer event value: integral floats are normalized, fractional ones rejected
fn integer_value(value: &Value) -> Result<i64, &'static str> {
    const NOT_FLOAT: &str = "value must be an integer, not float";
    const INVALID: &str = "value must be a valid integer";

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() != 0.0 => Err(NOT_FLOAT),
                Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(INVALID),
            }
        },
        Value::String(s) if s.contains('.') => Err(NOT_FLOAT),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| INVALID),
        _ => Err(INVALID),
    }
}

fn integer_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
