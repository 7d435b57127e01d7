//! SQLite persistence for rules, alerts and events
//!
//! Table names are injected through [`TableNames`] and validated before any
//! statement is built, since they are interpolated into SQL text.
//!
//! | table  | key                                  |
//! |--------|--------------------------------------|
//! | rules  | rule_id, indexed by device_id        |
//! | alerts | seq, append-only, indexed by pk      |
//! | events | (pk, ts), replaced on repeat         |

use crate::keyspace::{device_partition_key, TableNames};
use crate::traits::{AlertStore, EventStore, RuleStore};
use async_trait::async_trait;
use common::sqlite::SqliteClient;
use errors::{PulseError, PulseResult};
use pulse_rules::{Alert, Operator, Rule, StoredEvent};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, info};

/// SQLite-backed rule, alert and event store
#[derive(Clone)]
pub struct SqliteStore {
    client: SqliteClient,
    tables: TableNames,
}

impl SqliteStore {
    /// Wrap a connected client; fails on invalid table names
    pub fn new(client: SqliteClient, tables: TableNames) -> PulseResult<Self> {
        tables.validate()?;
        Ok(Self { client, tables })
    }

    /// Build from a bare pool and create the schema (tests, embedded use)
    pub async fn from_pool(pool: SqlitePool, tables: TableNames) -> PulseResult<Self> {
        let store = Self::new(SqliteClient::from_pool(pool), tables)?;
        store.init_schema().await?;
        Ok(store)
    }

    fn pool(&self) -> &SqlitePool {
        self.client.pool()
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Create tables and indexes if they do not exist
    pub async fn init_schema(&self) -> PulseResult<()> {
        let TableNames {
            rules,
            alerts,
            events,
            ..
        } = &self.tables;

        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {rules} (
                    rule_id TEXT PRIMARY KEY,
                    device_id TEXT NOT NULL,
                    metric TEXT NOT NULL,
                    operator TEXT NOT NULL,
                    threshold INTEGER NOT NULL,
                    enabled INTEGER,
                    created_at INTEGER NOT NULL
                )
                "#
            ),
            format!("CREATE INDEX IF NOT EXISTS idx_{rules}_device_id ON {rules}(device_id)"),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {alerts} (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    pk TEXT NOT NULL,
                    triggered_at INTEGER NOT NULL,
                    rule_id TEXT NOT NULL,
                    device_id TEXT NOT NULL,
                    metric TEXT NOT NULL,
                    value REAL NOT NULL,
                    threshold INTEGER NOT NULL
                )
                "#
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{alerts}_pk_triggered ON {alerts}(pk, triggered_at)"
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {events} (
                    pk TEXT NOT NULL,
                    ts INTEGER NOT NULL,
                    device_id TEXT NOT NULL,
                    event_id TEXT NOT NULL,
                    type TEXT NOT NULL,
                    value INTEGER NOT NULL,
                    raw TEXT NOT NULL,
                    ingested_at INTEGER NOT NULL,
                    request_id TEXT NOT NULL,
                    PRIMARY KEY (pk, ts)
                )
                "#
            ),
        ];

        for sql in &statements {
            sqlx::query(sql).execute(self.pool()).await?;
        }
        info!("Schema ready: {}, {}, {}", rules, alerts, events);
        Ok(())
    }
}

// ============================================================================
// Row hydration
// ============================================================================

fn hydrate_rule(row: &SqliteRow) -> PulseResult<Rule> {
    let operator: String = row.try_get("operator")?;
    let operator = operator
        .parse::<Operator>()
        .map_err(|e| PulseError::Database(format!("corrupt rule row: {}", e)))?;
    let threshold: i64 = row.try_get("threshold")?;
    let enabled: Option<bool> = row.try_get("enabled")?;

    Ok(Rule {
        rule_id: row.try_get("rule_id")?,
        device_id: row.try_get("device_id")?,
        metric: row.try_get("metric")?,
        operator,
        threshold: u64::try_from(threshold)
            .map_err(|_| PulseError::Database(format!("negative threshold {}", threshold)))?,
        // NULL enabled reads as enabled
        enabled: enabled.unwrap_or(true),
        created_at: row.try_get("created_at")?,
    })
}

fn hydrate_alert(row: &SqliteRow) -> PulseResult<Alert> {
    let threshold: i64 = row.try_get("threshold")?;
    Ok(Alert {
        device_id: row.try_get("device_id")?,
        triggered_at: row.try_get("triggered_at")?,
        rule_id: row.try_get("rule_id")?,
        metric: row.try_get("metric")?,
        value: row.try_get("value")?,
        threshold: threshold.max(0) as u64,
    })
}

fn hydrate_event(row: &SqliteRow) -> PulseResult<StoredEvent> {
    Ok(StoredEvent {
        device_id: row.try_get("device_id")?,
        ts: row.try_get("ts")?,
        event_id: row.try_get("event_id")?,
        metric: row.try_get("type")?,
        value: row.try_get("value")?,
        raw: row.try_get("raw")?,
        ingested_at: row.try_get("ingested_at")?,
        request_id: row.try_get("request_id")?,
    })
}

fn storable_threshold(threshold: u64) -> PulseResult<i64> {
    i64::try_from(threshold).map_err(|_| {
        PulseError::Database(format!("threshold {} exceeds INTEGER range", threshold))
    })
}

const RULE_COLUMNS: &str = "rule_id, device_id, metric, operator, threshold, enabled, created_at";

#[async_trait]
impl RuleStore for SqliteStore {
    async fn put_rule(&self, rule: &Rule) -> PulseResult<()> {
        let threshold = storable_threshold(rule.threshold)?;
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.tables.rules, RULE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&rule.rule_id)
            .bind(&rule.device_id)
            .bind(&rule.metric)
            .bind(rule.operator.as_str())
            .bind(threshold)
            .bind(rule.enabled)
            .bind(rule.created_at)
            .execute(self.pool())
            .await?;
        debug!("Rule {} stored for device {}", rule.rule_id, rule.device_id);
        Ok(())
    }

    async fn get_rule(&self, rule_id: &str) -> PulseResult<Option<Rule>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE rule_id = ?",
            RULE_COLUMNS, self.tables.rules
        );
        let row = sqlx::query(&sql)
            .bind(rule_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(hydrate_rule).transpose()
    }

    async fn rules_for_device(&self, device_id: &str) -> PulseResult<Vec<Rule>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE device_id = ? ORDER BY created_at ASC, rule_id ASC",
            RULE_COLUMNS, self.tables.rules
        );
        let rows = sqlx::query(&sql)
            .bind(device_id)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(hydrate_rule).collect()
    }

    async fn scan_rules(&self, limit: usize) -> PulseResult<Vec<Rule>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY created_at ASC, rule_id ASC LIMIT ?",
            RULE_COLUMNS, self.tables.rules
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(hydrate_rule).collect()
    }

    async fn ping(&self) -> PulseResult<()> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn put_alert(&self, alert: &Alert) -> PulseResult<()> {
        let threshold = storable_threshold(alert.threshold)?;
        let sql = format!(
            r#"
            INSERT INTO {} (pk, triggered_at, rule_id, device_id, metric, value, threshold)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            self.tables.alerts
        );
        sqlx::query(&sql)
            .bind(device_partition_key(&alert.device_id))
            .bind(alert.triggered_at)
            .bind(&alert.rule_id)
            .bind(&alert.device_id)
            .bind(&alert.metric)
            .bind(alert.value)
            .bind(threshold)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn recent_alerts(&self, device_id: &str, limit: usize) -> PulseResult<Vec<Alert>> {
        let sql = format!(
            r#"
            SELECT device_id, triggered_at, rule_id, metric, value, threshold
            FROM {}
            WHERE pk = ?
            ORDER BY triggered_at DESC, seq DESC
            LIMIT ?
            "#,
            self.tables.alerts
        );
        let rows = sqlx::query(&sql)
            .bind(device_partition_key(device_id))
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(hydrate_alert).collect()
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn put_event(&self, event: &StoredEvent) -> PulseResult<()> {
        let sql = format!(
            r#"
            INSERT OR REPLACE INTO {}
                (pk, ts, device_id, event_id, type, value, raw, ingested_at, request_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            self.tables.events
        );
        sqlx::query(&sql)
            .bind(device_partition_key(&event.device_id))
            .bind(event.ts)
            .bind(&event.device_id)
            .bind(&event.event_id)
            .bind(&event.metric)
            .bind(event.value)
            .bind(&event.raw)
            .bind(event.ingested_at)
            .bind(&event.request_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn query_events(
        &self,
        device_id: &str,
        range: Option<(i64, i64)>,
        limit: usize,
    ) -> PulseResult<Vec<StoredEvent>> {
        let columns = "device_id, ts, event_id, type, value, raw, ingested_at, request_id";
        let pk = device_partition_key(device_id);
        let rows = match range {
            Some((start, end)) => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE pk = ? AND ts BETWEEN ? AND ? ORDER BY ts ASC LIMIT ?",
                    columns, self.tables.events
                );
                sqlx::query(&sql)
                    .bind(pk)
                    .bind(start)
                    .bind(end)
                    .bind(limit as i64)
                    .fetch_all(self.pool())
                    .await?
            },
            None => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE pk = ? ORDER BY ts ASC LIMIT ?",
                    columns, self.tables.events
                );
                sqlx::query(&sql)
                    .bind(pk)
                    .bind(limit as i64)
                    .fetch_all(self.pool())
                    .await?
            },
        };
        rows.iter().map(hydrate_event).collect()
    }
}
