//! Test helpers shared by the workspace test suites

#[cfg(feature = "sqlite")]
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

/// Single-connection in-memory SQLite pool
///
/// One connection keeps every query on the same in-memory database.
#[cfg(feature = "sqlite")]
pub async fn memory_pool() -> anyhow::Result<SqlitePool> {
    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?)
}
