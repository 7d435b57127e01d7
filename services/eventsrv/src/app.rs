//! Application state and initialization logic

use std::sync::Arc;

use common::sqlite::SqliteClient;
use errors::PulseResult;
use pulse_store::{
    AlertStore, EventQueue, EventStore, MemoryQueue, MemoryStore, RuleStore, SqliteQueue,
    SqliteStore, SystemTimeProvider, TimeProvider,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{EventsrvConfig, StorageBackend};
use crate::consumer::EventConsumer;
use crate::routes::create_routes;
use crate::worker::QueueWorker;

/// Application state shared across all handlers
pub struct AppState {
    pub rules: Arc<dyn RuleStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub events: Arc<dyn EventStore>,
    pub queue: Arc<dyn EventQueue>,
    pub clock: Arc<dyn TimeProvider>,
    pub config: Arc<EventsrvConfig>,
}

impl AppState {
    /// State backed entirely by in-memory stores
    pub fn in_memory(config: EventsrvConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            rules: store.clone(),
            alerts: store.clone(),
            events: store,
            queue: Arc::new(MemoryQueue::new(config.queue.max_receive_count)),
            clock: Arc::new(SystemTimeProvider),
            config: Arc::new(config),
        }
    }

    /// Consumer wired to this state's stores
    pub fn consumer(&self) -> EventConsumer {
        EventConsumer::new(self.rules.clone(), self.alerts.clone(), self.clock.clone())
            .with_failure_injection(self.config.consumer.failure_injection)
    }

    /// Worker polling this state's queue
    pub fn worker(&self) -> QueueWorker {
        QueueWorker::new(
            self.queue.clone(),
            Arc::new(self.consumer()),
            self.config.queue.batch_size,
            self.config.poll_interval(),
        )
    }
}

/// Open the configured backend and build the shared state
pub async fn create_app_state(config: &EventsrvConfig) -> PulseResult<Arc<AppState>> {
    let state = match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage, data will not survive a restart");
            AppState::in_memory(config.clone())
        },
        StorageBackend::Sqlite => {
            let tables = config.table_names();
            let client = SqliteClient::new(&config.storage.database_path).await?;

            let store = Arc::new(SqliteStore::new(client.clone(), tables.clone())?);
            store.init_schema().await?;

            let queue = SqliteQueue::new(client, &tables, config.queue.max_receive_count)?;
            queue.init_schema().await?;
            debug!(
                "Storage ready: rules={}, alerts={}, events={}, queue={}",
                tables.rules, tables.alerts, tables.events, tables.queue
            );

            AppState {
                rules: store.clone(),
                alerts: store.clone(),
                events: store,
                queue: Arc::new(queue),
                clock: Arc::new(SystemTimeProvider),
                config: Arc::new(config.clone()),
            }
        },
    };
    Ok(Arc::new(state))
}

/// Serve the HTTP API until `token` is cancelled
pub async fn serve_http(state: Arc<AppState>, token: CancellationToken) -> PulseResult<()> {
    let addr = format!("{}:{}", state.config.api.host, state.config.api.port);
    let app = create_routes(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}
