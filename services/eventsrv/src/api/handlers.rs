//! HTTP handlers
//!
//! Thin adapters: decode the request, call the validator or a store, and
//! shape the response. Server-side failures are logged here or in the
//! [`AppError`] conversion and surface as a generic 500.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use bytes::Bytes;
use common::{ApiResult, AppError};
use errors::{FieldError, PulseError, PulseResult};
use pulse_rules::{validate_event, validate_rule, EventMessage, StoredEvent};
use pulse_store::{QueueStats, ALERT_QUERY_LIMIT, EVENT_QUERY_LIMIT, RULE_SCAN_LIMIT};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::models::*;
use crate::app::AppState;

/// Maximum dead-lettered messages returned
pub const DEAD_LETTER_QUERY_LIMIT: usize = 100;

fn parse_json(body: &[u8]) -> Result<Value, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        AppError::validation(vec![FieldError::new(
            "body",
            format!("request body must be valid JSON: {}", e),
            "invalid_json",
        )])
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Rules
// ============================================================================

/// POST /rules
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<RuleCreatedResponse>)> {
    let payload = parse_json(&body)?;
    let new_rule = validate_rule(&payload).map_err(AppError::validation)?;

    let rule = new_rule.into_rule(Uuid::new_v4().to_string(), state.clock.now_millis());
    state.rules.put_rule(&rule).await?;

    info!(
        rule_id = %rule.rule_id,
        device_id = %rule.device_id,
        "Rule created: {} {} {}",
        rule.metric,
        rule.operator,
        rule.threshold
    );

    Ok((
        StatusCode::CREATED,
        Json(RuleCreatedResponse {
            message: RULE_CREATED_MESSAGE.to_string(),
            rule_id: rule.rule_id.clone(),
            rule,
        }),
    ))
}

/// GET /rules?device_id=
///
/// Only enabled rules are returned.
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DeviceFilter>,
) -> ApiResult<Json<RuleListResponse>> {
    let mut rules = match non_empty(filter.device_id) {
        Some(device_id) => state.rules.rules_for_device(&device_id).await?,
        None => state.rules.scan_rules(RULE_SCAN_LIMIT).await?,
    };
    rules.retain(|r| r.enabled);

    Ok(Json(RuleListResponse {
        count: rules.len(),
        rules,
    }))
}

// ============================================================================
// Alerts
// ============================================================================

/// GET /alerts?device_id=
pub async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DeviceFilter>,
) -> ApiResult<Json<AlertListResponse>> {
    let device_id = non_empty(filter.device_id)
        .ok_or_else(|| PulseError::MissingParameter("device_id".to_string()))?;

    let alerts = state
        .alerts
        .recent_alerts(&device_id, ALERT_QUERY_LIMIT)
        .await?;

    Ok(Json(AlertListResponse {
        device_id,
        count: alerts.len(),
        alerts,
    }))
}

// ============================================================================
// Events
// ============================================================================

/// POST /events
///
/// Persists the event, then enqueues it for rule evaluation.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<EventIngestedResponse>)> {
    let mut payload = parse_json(&body)?;
    let input = validate_event(&payload).map_err(AppError::validation)?;

    // Keep the caller's body, with value and ts normalized
    if let Some(object) = payload.as_object_mut() {
        object.insert("value".to_string(), json!(input.value));
        object.insert("ts".to_string(), json!(input.ts));
    }

    let event = StoredEvent {
        device_id: input.device_id,
        ts: input.ts,
        event_id: Uuid::new_v4().to_string(),
        metric: input.metric,
        value: input.value,
        raw: payload.to_string(),
        ingested_at: state.clock.now_millis(),
        request_id: Uuid::new_v4().to_string(),
    };

    if let Err(e) = persist_and_enqueue(&state, &event).await {
        error!(
            action = "event_ingestion_failed",
            device_id = %event.device_id,
            request_id = %event.request_id,
            code = e.error_code(),
            "Event ingestion failed: {}",
            e
        );
        return Err(AppError::internal_error());
    }

    info!(
        action = "event_ingested",
        device_id = %event.device_id,
        event_id = %event.event_id,
        request_id = %event.request_id,
        "Event ingested"
    );

    Ok((
        StatusCode::CREATED,
        Json(EventIngestedResponse {
            message: EVENT_INGESTED_MESSAGE.to_string(),
            event_id: event.event_id,
            request_id: event.request_id,
        }),
    ))
}

async fn persist_and_enqueue(state: &AppState, event: &StoredEvent) -> PulseResult<String> {
    state.events.put_event(event).await?;
    let message = EventMessage::from_stored(event, state.clock.now_millis());
    let body = serde_json::to_string(&message)?;
    state.queue.send(&body).await
}

fn parse_bound(field: &str, raw: &str) -> Result<i64, AppError> {
    raw.trim().parse::<i64>().map_err(|_| {
        AppError::validation(vec![FieldError::new(
            field,
            format!("{} must be a valid integer timestamp", field),
            "invalid_type",
        )])
    })
}

/// GET /devices/{device_id}/events?start_time=&end_time=
///
/// The range applies only when both bounds are given.
pub async fn get_device_events(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Query(range): Query<TimeRangeQuery>,
) -> ApiResult<Json<EventListResponse>> {
    let bounds = match (non_empty(range.start_time), non_empty(range.end_time)) {
        (Some(start), Some(end)) => Some((
            parse_bound("start_time", &start)?,
            parse_bound("end_time", &end)?,
        )),
        _ => None,
    };

    let events = state
        .events
        .query_events(&device_id, bounds, EVENT_QUERY_LIMIT)
        .await
        .map_err(|e| {
            error!(
                action = "get_events_failed",
                device_id = %device_id,
                code = e.error_code(),
                "Event query failed: {}",
                e
            );
            AppError::internal_error()
        })?;

    Ok(Json(EventListResponse {
        device_id,
        count: events.len(),
        events,
    }))
}

// ============================================================================
// Health & queue
// ============================================================================

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (status_code, status) = match state.rules.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        },
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            service: state.config.service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// GET /queue/stats
pub async fn queue_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<QueueStats>> {
    Ok(Json(state.queue.stats().await?))
}

/// GET /queue/dead-letters
pub async fn dead_letters(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<DeadLetterResponse>> {
    let messages = state.queue.dead_letters(DEAD_LETTER_QUERY_LIMIT).await?;
    Ok(Json(DeadLetterResponse {
        count: messages.len(),
        messages,
    }))
}
