//! Pulse Rules - threshold rule model and evaluation
//!
//! Pure building blocks shared by the HTTP handlers and the event consumer:
//! - Rule / Alert / event record types
//! - Rule and event payload validation (field-level errors, defaults filled)
//! - Five-operator threshold evaluation
//!
//! # Flow
//!
//! ```text
//! POST /rules ──▶ validate_rule ──▶ NewRule ──▶ Rule (id + created_at) ──▶ store
//!
//! queue message ──▶ DeviceEvent ──▶ evaluate(rule.operator, threshold, value)
//!                                        │
//!                                        └── true ──▶ Alert
//! ```

mod evaluator;
pub mod types;
mod validator;

// Re-export public API
pub use evaluator::{coerce_numeric, evaluate, evaluate_symbol, Operator, ParseOperatorError};
pub use types::{
    Alert, DeviceEvent, EventInput, EventMessage, NewRule, Rule, StoredEvent,
    FAILURE_INJECTION_DEVICE,
};
pub use validator::{
    validate_event, validate_rule, CreateRuleRequest, IngestEventRequest, MAX_THRESHOLD,
};
