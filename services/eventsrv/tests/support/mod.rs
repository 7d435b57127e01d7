//! Shared fixtures for the eventsrv integration tests

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use eventsrv::{create_routes, AppState, EventsrvConfig};
use pulse_store::{FixedTimeProvider, SqliteQueue, SqliteStore};
use serde_json::{json, Value};
use tower::util::ServiceExt;

pub const NOW: i64 = 1_700_000_000_000;

/// State on a fresh in-memory SQLite database with a pinned clock
pub async fn sqlite_state(config: EventsrvConfig) -> anyhow::Result<Arc<AppState>> {
    let pool = common::test_utils::memory_pool().await?;
    let tables = config.table_names();
    let store = Arc::new(SqliteStore::from_pool(pool.clone(), tables.clone()).await?);
    let queue = SqliteQueue::from_pool(pool, &tables, config.queue.max_receive_count).await?;

    Ok(Arc::new(AppState {
        rules: store.clone(),
        alerts: store.clone(),
        events: store,
        queue: Arc::new(queue),
        clock: Arc::new(FixedTimeProvider::new(NOW)),
        config: Arc::new(config),
    }))
}

pub async fn create_test_router() -> anyhow::Result<(Router, Arc<AppState>)> {
    let state = sqlite_state(EventsrvConfig::default()).await?;
    Ok((create_routes(state.clone()), state))
}

/// Send a request and decode the JSON response
pub async fn json_request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body = match body {
        Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
        None => Body::empty(),
    };
    raw_request(app, method, uri, body).await
}

pub async fn raw_request(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let body: Value = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, body)
}
