//! Pulse storage layer
//!
//! Accessors for the three record families and the event queue, each behind
//! a trait so services can run against SQLite in production and an
//! in-memory backend in tests.
//!
//! # Key Components
//!
//! - **RuleStore / AlertStore / EventStore**: record accessors, no logic beyond key construction
//! - **EventQueue**: at-least-once queue with receive counts and a dead-letter set
//! - **TableNames**: injected resource identifiers for the SQLite backend

pub mod keyspace;
pub mod time;
pub mod traits;

#[cfg(feature = "memory-backend")]
pub mod memory_impl;

#[cfg(feature = "sqlite-backend")]
pub mod sqlite_impl;

#[cfg(feature = "sqlite-backend")]
pub mod sqlite_queue;

// Re-exports
pub use keyspace::{device_partition_key, is_valid_identifier, TableNames};
pub use time::{FixedTimeProvider, SystemTimeProvider, TimeProvider};
pub use traits::{AlertStore, EventQueue, EventStore, QueueMessage, QueueStats, RuleStore};

#[cfg(feature = "memory-backend")]
pub use memory_impl::{MemoryQueue, MemoryStore};

#[cfg(feature = "sqlite-backend")]
pub use sqlite_impl::SqliteStore;

#[cfg(feature = "sqlite-backend")]
pub use sqlite_queue::SqliteQueue;

/// Maximum rules returned by an unfiltered scan
pub const RULE_SCAN_LIMIT: usize = 100;

/// Maximum alerts returned per device
pub const ALERT_QUERY_LIMIT: usize = 50;

/// Maximum events returned per device query
pub const EVENT_QUERY_LIMIT: usize = 100;
