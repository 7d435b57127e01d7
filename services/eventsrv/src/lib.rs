//! EventSrv Library
//!
//! Device event ingestion and threshold alerting for Pulse.
//!
//! ## Architecture
//!
//! - `api` / `routes`: HTTP surface for rules, alerts, events and queue inspection
//! - `consumer`: evaluates queued events against device rules and records alerts
//! - `worker`: polls the event queue and settles each batch
//! - `config`: layered service configuration

pub mod api;
pub mod app;
pub mod config;
pub mod consumer;
pub mod routes;
pub mod worker;

// Re-export app state and initialization
pub use app::{create_app_state, serve_http, AppState};

pub use config::{EventsrvConfig, StorageBackend};
pub use consumer::{BatchItemFailure, BatchResponse, EventConsumer};
pub use worker::{PollSummary, QueueWorker};

// Re-export route creation
pub use routes::create_routes;
