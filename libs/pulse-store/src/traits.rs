//! Trait definitions for the storage layer

use async_trait::async_trait;
use errors::PulseResult;
use pulse_rules::{Alert, Rule, StoredEvent};
use serde::{Deserialize, Serialize};

/// Rule record accessor
///
/// Rules are keyed by `rule_id` with a secondary lookup by `device_id`.
/// Implementations return rules as stored; filtering on `enabled` is the
/// caller's concern.
#[async_trait]
pub trait RuleStore: Send + Sync + 'static {
    async fn put_rule(&self, rule: &Rule) -> PulseResult<()>;

    async fn get_rule(&self, rule_id: &str) -> PulseResult<Option<Rule>>;

    /// All rules for one device, via the device index
    async fn rules_for_device(&self, device_id: &str) -> PulseResult<Vec<Rule>>;

    /// Bounded page of all rules
    async fn scan_rules(&self, limit: usize) -> PulseResult<Vec<Rule>>;

    /// Cheap reachability probe used by health checks
    async fn ping(&self) -> PulseResult<()> {
        Ok(())
    }
}

/// Alert record accessor: partitioned by device, sorted by `triggered_at`
#[async_trait]
pub trait AlertStore: Send + Sync + 'static {
    async fn put_alert(&self, alert: &Alert) -> PulseResult<()>;

    /// Most recent alerts for a device, newest first
    async fn recent_alerts(&self, device_id: &str, limit: usize) -> PulseResult<Vec<Alert>>;
}

/// Stored event accessor: partitioned by device, sorted by `ts`
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Insert or replace the event at (device, ts)
    async fn put_event(&self, event: &StoredEvent) -> PulseResult<()>;

    /// Events for a device in ascending `ts`, optionally within an inclusive range
    async fn query_events(
        &self,
        device_id: &str,
        range: Option<(i64, i64)>,
        limit: usize,
    ) -> PulseResult<Vec<StoredEvent>>;
}

// ============================================================================
// Queue
// ============================================================================

/// A message handed out by [`EventQueue::receive`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub body: String,
    /// Number of deliveries including this one
    pub receive_count: u32,
    /// Enqueue time, epoch milliseconds
    pub enqueued_at: i64,
}

/// Queue depth snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub in_flight: u64,
    pub dead_letter: u64,
}

/// Event queue with redelivery and dead-letter semantics
///
/// Redelivery policy lives here: consumers only report which messages
/// succeeded (`ack`) and which failed (`release`).
#[async_trait]
pub trait EventQueue: Send + Sync + 'static {
    /// Enqueue a body, returning its message id
    async fn send(&self, body: &str) -> PulseResult<String>;

    /// Take up to `max` visible messages, oldest first, marking them in flight
    async fn receive(&self, max: usize) -> PulseResult<Vec<QueueMessage>>;

    /// Delete successfully processed messages
    async fn ack(&self, message_ids: &[String]) -> PulseResult<()>;

    /// Return failed messages to the queue
    ///
    /// A message that has reached the receive limit moves to the dead-letter
    /// set instead. Returns the number dead-lettered.
    async fn release(&self, message_ids: &[String]) -> PulseResult<usize>;

    /// Dead-lettered messages, oldest first
    async fn dead_letters(&self, limit: usize) -> PulseResult<Vec<QueueMessage>>;

    async fn stats(&self) -> PulseResult<QueueStats>;

    /// Make messages left in flight by a previous process visible again
    async fn recover_in_flight(&self) -> PulseResult<u64>;
}
