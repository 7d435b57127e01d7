//! API routes for the event service

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::handlers::{
    create_rule, dead_letters, get_alerts, get_device_events, health_check, ingest_event,
    list_rules, queue_stats,
};
use crate::app::AppState;

/// Create all API routes with state
pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Rules and alerts
        .route("/rules", get(list_rules).post(create_rule))
        .route("/alerts", get(get_alerts))
        // Event ingestion
        .route("/events", post(ingest_event))
        .route("/devices/{device_id}/events", get(get_device_events))
        // Queue inspection
        .route("/queue/stats", get(queue_stats))
        .route("/queue/dead-letters", get(dead_letters))
        .layer(CorsLayer::permissive())
        // Apply HTTP request logging middleware
        .layer(axum::middleware::from_fn(common::logging::http_request_logger))
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::config::EventsrvConfig;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::util::ServiceExt;

    fn build_test_state() -> Arc<AppState> {
        Arc::new(AppState::in_memory(EventsrvConfig::default()))
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_ok() {
        let app = create_routes(build_test_state());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "eventsrv");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = create_routes(build_test_state());
        let req = Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_queue_stats_start_empty() {
        let app = create_routes(build_test_state());
        let req = Request::builder()
            .uri("/queue/stats")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"pending": 0, "in_flight": 0, "dead_letter": 0})
        );
    }
}
