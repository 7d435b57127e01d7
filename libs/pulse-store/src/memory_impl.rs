//! In-memory backends
//!
//! DashMap-backed stores and a mutex-guarded queue, selected with
//! `storage.backend: memory`. Nothing survives a restart.

use crate::keyspace::device_partition_key;
use crate::time::{SystemTimeProvider, TimeProvider};
use crate::traits::*;
use async_trait::async_trait;
use dashmap::DashMap;
use errors::PulseResult;
use parking_lot::Mutex;
use pulse_rules::{Alert, Rule, StoredEvent};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory rule, alert and event store
pub struct MemoryStore {
    rules: Arc<DashMap<String, Rule>>,
    /// partition key -> (triggered_at, insertion sequence) -> alert
    alerts: Arc<DashMap<String, BTreeMap<(i64, u64), Alert>>>,
    alert_seq: AtomicU64,
    /// partition key -> ts -> event
    events: Arc<DashMap<String, BTreeMap<i64, StoredEvent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
            alerts: Arc::new(DashMap::new()),
            alert_seq: AtomicU64::new(0),
            events: Arc::new(DashMap::new()),
        }
    }

    /// Total alerts across all devices
    pub fn alert_count(&self) -> usize {
        self.alerts.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn creation_order(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn put_rule(&self, rule: &Rule) -> PulseResult<()> {
        self.rules.insert(rule.rule_id.clone(), rule.clone());
        Ok(())
    }

    async fn get_rule(&self, rule_id: &str) -> PulseResult<Option<Rule>> {
        Ok(self.rules.get(rule_id).map(|r| r.clone()))
    }

    async fn rules_for_device(&self, device_id: &str) -> PulseResult<Vec<Rule>> {
        let mut rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|entry| entry.device_id == device_id)
            .map(|entry| entry.value().clone())
            .collect();
        creation_order(&mut rules);
        Ok(rules)
    }

    async fn scan_rules(&self, limit: usize) -> PulseResult<Vec<Rule>> {
        let mut rules: Vec<Rule> = self.rules.iter().map(|e| e.value().clone()).collect();
        creation_order(&mut rules);
        rules.truncate(limit);
        Ok(rules)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn put_alert(&self, alert: &Alert) -> PulseResult<()> {
        // Append-only: alerts sharing a millisecond are all kept
        let seq = self.alert_seq.fetch_add(1, Ordering::Relaxed);
        self.alerts
            .entry(device_partition_key(&alert.device_id))
            .or_default()
            .insert((alert.triggered_at, seq), alert.clone());
        Ok(())
    }

    async fn recent_alerts(&self, device_id: &str, limit: usize) -> PulseResult<Vec<Alert>> {
        Ok(self
            .alerts
            .get(&device_partition_key(device_id))
            .map(|partition| partition.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn put_event(&self, event: &StoredEvent) -> PulseResult<()> {
        self.events
            .entry(device_partition_key(&event.device_id))
            .or_default()
            .insert(event.ts, event.clone());
        Ok(())
    }

    async fn query_events(
        &self,
        device_id: &str,
        range: Option<(i64, i64)>,
        limit: usize,
    ) -> PulseResult<Vec<StoredEvent>> {
        let Some(partition) = self.events.get(&device_partition_key(device_id)) else {
            return Ok(Vec::new());
        };
        let events = match range {
            Some((start, end)) if start > end => Vec::new(),
            Some((start, end)) => partition
                .range(start..=end)
                .take(limit)
                .map(|(_, e)| e.clone())
                .collect(),
            None => partition.values().take(limit).cloned().collect(),
        };
        Ok(events)
    }
}

// ============================================================================
// MemoryQueue
// ============================================================================

#[derive(Default)]
struct QueueState {
    next_seq: u64,
    /// Visible messages ordered by enqueue sequence
    pending: BTreeMap<u64, QueueMessage>,
    in_flight: HashMap<String, (u64, QueueMessage)>,
    dead: Vec<QueueMessage>,
}

/// In-memory event queue
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    max_receive_count: u32,
}

impl MemoryQueue {
    pub fn new(max_receive_count: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            max_receive_count: max_receive_count.max(1),
        }
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn send(&self, body: &str) -> PulseResult<String> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.insert(
            seq,
            QueueMessage {
                message_id: message_id.clone(),
                body: body.to_string(),
                receive_count: 0,
                enqueued_at: SystemTimeProvider.now_millis(),
            },
        );
        Ok(message_id)
    }

    async fn receive(&self, max: usize) -> PulseResult<Vec<QueueMessage>> {
        let mut state = self.state.lock();
        let mut batch = Vec::new();
        while batch.len() < max {
            let Some((seq, mut message)) = state.pending.pop_first() else {
                break;
            };
            message.receive_count += 1;
            state
                .in_flight
                .insert(message.message_id.clone(), (seq, message.clone()));
            batch.push(message);
        }
        Ok(batch)
    }

    async fn ack(&self, message_ids: &[String]) -> PulseResult<()> {
        let mut state = self.state.lock();
        for id in message_ids {
            state.in_flight.remove(id);
        }
        Ok(())
    }

    async fn release(&self, message_ids: &[String]) -> PulseResult<usize> {
        let mut state = self.state.lock();
        let mut dead_lettered = 0;
        for id in message_ids {
            let Some((seq, message)) = state.in_flight.remove(id) else {
                continue;
            };
            if message.receive_count >= self.max_receive_count {
                state.dead.push(message);
                dead_lettered += 1;
            } else {
                state.pending.insert(seq, message);
            }
        }
        Ok(dead_lettered)
    }

    async fn dead_letters(&self, limit: usize) -> PulseResult<Vec<QueueMessage>> {
        Ok(self.state.lock().dead.iter().take(limit).cloned().collect())
    }

    async fn stats(&self) -> PulseResult<QueueStats> {
        let state = self.state.lock();
        Ok(QueueStats {
            pending: state.pending.len() as u64,
            in_flight: state.in_flight.len() as u64,
            dead_letter: state.dead.len() as u64,
        })
    }

    async fn recover_in_flight(&self) -> PulseResult<u64> {
        let mut state = self.state.lock();
        let stranded: Vec<(u64, QueueMessage)> = state.in_flight.drain().map(|(_, v)| v).collect();
        let count = stranded.len() as u64;
        state.pending.extend(stranded);
        Ok(count)
    }
}
