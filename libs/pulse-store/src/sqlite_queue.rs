//! Durable event queue on SQLite
//!
//! ```text
//!  send ──▶ [pending] ──receive──▶ [in_flight] ──ack──▶ (deleted)
//!              ▲                        │
//!              └──── release ───────────┤
//!                  (receive_count < max)│
//!                                       └── release (receive_count >= max) ──▶ <queue>_dlq
//! ```
//!
//! Messages are served oldest first by insertion sequence, so a released
//! message is redelivered ahead of newer ones.

use crate::keyspace::TableNames;
use crate::time::{SystemTimeProvider, TimeProvider};
use crate::traits::{EventQueue, QueueMessage, QueueStats};
use async_trait::async_trait;
use common::sqlite::SqliteClient;
use errors::PulseResult;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{info, warn};

const STATE_PENDING: &str = "pending";
const STATE_IN_FLIGHT: &str = "in_flight";

#[derive(Clone)]
pub struct SqliteQueue {
    client: SqliteClient,
    table: String,
    dlq_table: String,
    max_receive_count: u32,
}

impl SqliteQueue {
    pub fn new(client: SqliteClient, tables: &TableNames, max_receive_count: u32) -> PulseResult<Self> {
        tables.validate()?;
        Ok(Self {
            client,
            table: tables.queue.clone(),
            dlq_table: tables.dead_letter_queue(),
            max_receive_count: max_receive_count.max(1),
        })
    }

    /// Build from a bare pool and create the queue tables
    pub async fn from_pool(
        pool: SqlitePool,
        tables: &TableNames,
        max_receive_count: u32,
    ) -> PulseResult<Self> {
        let queue = Self::new(SqliteClient::from_pool(pool), tables, max_receive_count)?;
        queue.init_schema().await?;
        Ok(queue)
    }

    fn pool(&self) -> &SqlitePool {
        self.client.pool()
    }

    pub async fn init_schema(&self) -> PulseResult<()> {
        let table = &self.table;
        let dlq = &self.dlq_table;
        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    message_id TEXT NOT NULL UNIQUE,
                    body TEXT NOT NULL,
                    receive_count INTEGER NOT NULL DEFAULT 0,
                    state TEXT NOT NULL DEFAULT 'pending',
                    enqueued_at INTEGER NOT NULL
                )
                "#
            ),
            format!("CREATE INDEX IF NOT EXISTS idx_{table}_state ON {table}(state, seq)"),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {dlq} (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    message_id TEXT NOT NULL UNIQUE,
                    body TEXT NOT NULL,
                    receive_count INTEGER NOT NULL,
                    enqueued_at INTEGER NOT NULL,
                    dead_lettered_at INTEGER NOT NULL
                )
                "#
            ),
        ];
        for sql in &statements {
            sqlx::query(sql).execute(self.pool()).await?;
        }
        info!("Queue ready: {} (dead letters: {})", table, dlq);
        Ok(())
    }

    async fn count(&self, sql: &str) -> PulseResult<u64> {
        let count: i64 = sqlx::query_scalar(sql).fetch_one(self.pool()).await?;
        Ok(count.max(0) as u64)
    }
}

fn hydrate_message(row: &SqliteRow) -> PulseResult<QueueMessage> {
    let receive_count: i64 = row.try_get("receive_count")?;
    Ok(QueueMessage {
        message_id: row.try_get("message_id")?,
        body: row.try_get("body")?,
        receive_count: receive_count.max(0) as u32,
        enqueued_at: row.try_get("enqueued_at")?,
    })
}

#[async_trait]
impl EventQueue for SqliteQueue {
    async fn send(&self, body: &str) -> PulseResult<String> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let sql = format!(
            "INSERT INTO {} (message_id, body, state, enqueued_at) VALUES (?, ?, ?, ?)",
            self.table
        );
        sqlx::query(&sql)
            .bind(&message_id)
            .bind(body)
            .bind(STATE_PENDING)
            .bind(SystemTimeProvider.now_millis())
            .execute(self.pool())
            .await?;
        Ok(message_id)
    }

    async fn receive(&self, max: usize) -> PulseResult<Vec<QueueMessage>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let mut tx = self.pool().begin().await?;

        let select = format!(
            r#"
            SELECT seq, message_id, body, receive_count, enqueued_at
            FROM {}
            WHERE state = ?
            ORDER BY seq ASC
            LIMIT ?
            "#,
            self.table
        );
        let rows = sqlx::query(&select)
            .bind(STATE_PENDING)
            .bind(max as i64)
            .fetch_all(&mut *tx)
            .await?;

        let update = format!(
            "UPDATE {} SET state = ?, receive_count = receive_count + 1 WHERE seq = ?",
            self.table
        );
        let mut batch = Vec::with_capacity(rows.len());
        for row in &rows {
            let seq: i64 = row.try_get("seq")?;
            sqlx::query(&update)
                .bind(STATE_IN_FLIGHT)
                .bind(seq)
                .execute(&mut *tx)
                .await?;
            let mut message = hydrate_message(row)?;
            message.receive_count += 1;
            batch.push(message);
        }

        tx.commit().await?;
        Ok(batch)
    }

    async fn ack(&self, message_ids: &[String]) -> PulseResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let sql = format!("DELETE FROM {} WHERE message_id = ?", self.table);
        let mut tx = self.pool().begin().await?;
        for id in message_ids {
            sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn release(&self, message_ids: &[String]) -> PulseResult<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let select = format!(
            "SELECT message_id, body, receive_count, enqueued_at FROM {} WHERE message_id = ? AND state = ?",
            self.table
        );
        let requeue = format!("UPDATE {} SET state = ? WHERE message_id = ?", self.table);
        let delete = format!("DELETE FROM {} WHERE message_id = ?", self.table);
        let dead_letter = format!(
            r#"
            INSERT OR REPLACE INTO {} (message_id, body, receive_count, enqueued_at, dead_lettered_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            self.dlq_table
        );

        let mut tx = self.pool().begin().await?;
        let mut dead_lettered = 0;
        for id in message_ids {
            let Some(row) = sqlx::query(&select)
                .bind(id)
                .bind(STATE_IN_FLIGHT)
                .fetch_optional(&mut *tx)
                .await?
            else {
                continue;
            };
            let message = hydrate_message(&row)?;

            if message.receive_count >= self.max_receive_count {
                sqlx::query(&dead_letter)
                    .bind(&message.message_id)
                    .bind(&message.body)
                    .bind(i64::from(message.receive_count))
                    .bind(message.enqueued_at)
                    .bind(SystemTimeProvider.now_millis())
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(&delete).bind(id).execute(&mut *tx).await?;
                warn!(
                    "Message {} dead-lettered after {} receives",
                    message.message_id, message.receive_count
                );
                dead_lettered += 1;
            } else {
                sqlx::query(&requeue)
                    .bind(STATE_PENDING)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(dead_lettered)
    }

    async fn dead_letters(&self, limit: usize) -> PulseResult<Vec<QueueMessage>> {
        let sql = format!(
            "SELECT message_id, body, receive_count, enqueued_at FROM {} ORDER BY seq ASC LIMIT ?",
            self.dlq_table
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(hydrate_message).collect()
    }

    async fn stats(&self) -> PulseResult<QueueStats> {
        let by_state = |state: &str| {
            format!(
                "SELECT COUNT(*) FROM {} WHERE state = '{}'",
                self.table, state
            )
        };
        Ok(QueueStats {
            pending: self.count(&by_state(STATE_PENDING)).await?,
            in_flight: self.count(&by_state(STATE_IN_FLIGHT)).await?,
            dead_letter: self
                .count(&format!("SELECT COUNT(*) FROM {}", self.dlq_table))
                .await?,
        })
    }

    async fn recover_in_flight(&self) -> PulseResult<u64> {
        let sql = format!("UPDATE {} SET state = ? WHERE state = ?", self.table);
        let result = sqlx::query(&sql)
            .bind(STATE_PENDING)
            .bind(STATE_IN_FLIGHT)
            .execute(self.pool())
            .await?;
        let recovered = result.rows_affected();
        if recovered > 0 {
            info!("Recovered {} in-flight messages", recovered);
        }
        Ok(recovered)
    }
}
