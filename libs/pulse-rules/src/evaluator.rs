//! Threshold evaluation
//!
//! `value OP threshold` for the five supported comparison operators.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Comparison operator of a rule, serialized as its symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
}

impl Operator {
    /// Every supported operator, in the order used by error messages
    pub const ALL: [Operator; 5] = [
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::GreaterOrEqual,
        Operator::LessOrEqual,
        Operator::Equal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
        }
    }

    /// Compare an observed value against a threshold
    ///
    /// NaN on either side never triggers.
    pub fn evaluate(self, threshold: f64, value: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::LessOrEqual => value <= threshold,
            #[allow(clippy::float_cmp)]
            Self::Equal => value == threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported operator: {0}")]
pub struct ParseOperatorError(pub String);

impl FromStr for Operator {
    type Err = ParseOperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Self::GreaterThan),
            "<" => Ok(Self::LessThan),
            ">=" => Ok(Self::GreaterOrEqual),
            "<=" => Ok(Self::LessOrEqual),
            "==" => Ok(Self::Equal),
            other => Err(ParseOperatorError(other.to_string())),
        }
    }
}

/// Evaluate a typed operator
pub fn evaluate(operator: Operator, threshold: f64, value: f64) -> bool {
    operator.evaluate(threshold, value)
}

/// Evaluate a raw operator symbol; unknown symbols never trigger
pub fn evaluate_symbol(symbol: &str, threshold: f64, value: f64) -> bool {
    symbol
        .parse::<Operator>()
        .map(|op| op.evaluate(threshold, value))
        .unwrap_or(false)
}

/// Coerce a JSON value to a number
///
/// Numbers pass through, numeric strings are parsed. Everything else
/// (bool, null, arrays, objects, non-numeric strings) yields `None`.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
