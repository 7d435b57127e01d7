//! Integration tests for the SQLite backends
//!
//! Uses a single-connection in-memory SQLite pool per test.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use pulse_rules::{Alert, NewRule, Operator, Rule, StoredEvent};
use pulse_store::{
    AlertStore, EventQueue, EventStore, QueueStats, RuleStore, SqliteQueue, SqliteStore,
    TableNames,
};
use sqlx::SqlitePool;

async fn memory_pool() -> SqlitePool {
    common::test_utils::memory_pool()
        .await
        .expect("Failed to create in-memory database")
}

async fn setup_store() -> SqliteStore {
    SqliteStore::from_pool(memory_pool().await, TableNames::default())
        .await
        .unwrap()
}

fn rule(id: &str, device: &str, enabled: bool, created_at: i64) -> Rule {
    NewRule {
        device_id: device.to_string(),
        metric: "temperature".to_string(),
        operator: Operator::GreaterOrEqual,
        threshold: 80,
        enabled,
    }
    .into_rule(id, created_at)
}

// ============================================================================
// Rules
// ============================================================================

#[tokio::test]
async fn test_rule_round_trip() {
    let store = setup_store().await;
    let original = rule("r-1", "sensor-7", false, 1_700_000_000_000);
    store.put_rule(&original).await.unwrap();

    let loaded = store.get_rule("r-1").await.unwrap().unwrap();
    assert_eq!(loaded, original);
    assert!(store.get_rule("r-404").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rules_for_device_uses_device_filter() {
    let store = setup_store().await;
    store.put_rule(&rule("r-1", "a", true, 1)).await.unwrap();
    store.put_rule(&rule("r-2", "b", true, 2)).await.unwrap();
    store.put_rule(&rule("r-3", "a", false, 3)).await.unwrap();

    let rules = store.rules_for_device("a").await.unwrap();
    let ids: Vec<_> = rules.iter().map(|r| r.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["r-1", "r-3"]);
}

#[tokio::test]
async fn test_scan_is_bounded() {
    let store = setup_store().await;
    for i in 0..5 {
        store
            .put_rule(&rule(&format!("r-{}", i), "a", true, i))
            .await
            .unwrap();
    }
    assert_eq!(store.scan_rules(3).await.unwrap().len(), 3);
    assert_eq!(store.scan_rules(100).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_null_enabled_reads_as_enabled() {
    let pool = memory_pool().await;
    let store = SqliteStore::from_pool(pool.clone(), TableNames::default())
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO rules (rule_id, device_id, metric, operator, threshold, enabled, created_at) \
         VALUES ('legacy', 'a', 'temperature', '>', 10, NULL, 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    assert!(store.get_rule("legacy").await.unwrap().unwrap().enabled);
}

#[tokio::test]
async fn test_unstorable_threshold_rejected_and_table_stays_readable() {
    let store = setup_store().await;
    store.put_rule(&rule("r-1", "a", true, 1)).await.unwrap();

    let mut huge = rule("r-2", "a", true, 2);
    huge.threshold = u64::MAX;
    assert!(store.put_rule(&huge).await.is_err());

    let mut largest = rule("r-3", "a", true, 3);
    largest.threshold = pulse_rules::MAX_THRESHOLD;
    store.put_rule(&largest).await.unwrap();

    let rules = store.rules_for_device("a").await.unwrap();
    let ids: Vec<_> = rules.iter().map(|r| r.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["r-1", "r-3"]);
    assert_eq!(rules[1].threshold, pulse_rules::MAX_THRESHOLD);
    assert_eq!(store.scan_rules(100).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_custom_table_names() {
    let tables = TableNames {
        rules: "prod_rules".into(),
        alerts: "prod_alerts".into(),
        events: "prod_events".into(),
        queue: "prod_queue".into(),
    };
    let store = SqliteStore::from_pool(memory_pool().await, tables)
        .await
        .unwrap();
    store.put_rule(&rule("r-1", "a", true, 1)).await.unwrap();
    assert_eq!(store.tables().rules, "prod_rules");
    assert!(store.ping().await.is_ok());
}

#[tokio::test]
async fn test_invalid_table_name_rejected() {
    let tables = TableNames {
        rules: "rules; DROP TABLE alerts".into(),
        ..TableNames::default()
    };
    let err = SqliteStore::from_pool(memory_pool().await, tables)
        .await
        .err()
        .unwrap();
    assert_eq!(err.error_code(), "INVALID_CONFIG");
}

// ============================================================================
// Alerts & events
// ============================================================================

#[tokio::test]
async fn test_alerts_newest_first() {
    let store = setup_store().await;
    for (ts, rule_id) in [(100, "r-1"), (300, "r-1"), (300, "r-2"), (200, "r-1")] {
        store
            .put_alert(&Alert {
                device_id: "a".into(),
                triggered_at: ts,
                rule_id: rule_id.into(),
                metric: "temperature".into(),
                value: 85.0,
                threshold: 80,
            })
            .await
            .unwrap();
    }

    let alerts = store.recent_alerts("a", 50).await.unwrap();
    let times: Vec<_> = alerts.iter().map(|a| a.triggered_at).collect();
    assert_eq!(times, vec![300, 300, 200, 100]);
    assert_eq!(alerts[0].value, 85.0);
    assert!(store.recent_alerts("b", 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_same_rule_same_millisecond_alerts_are_all_kept() {
    let store = setup_store().await;
    for value in [90.0, 95.0] {
        store
            .put_alert(&Alert {
                device_id: "a".into(),
                triggered_at: 500,
                rule_id: "r-1".into(),
                metric: "temperature".into(),
                value,
                threshold: 80,
            })
            .await
            .unwrap();
    }

    let alerts = store.recent_alerts("a", 50).await.unwrap();
    let values: Vec<_> = alerts.iter().map(|a| a.value).collect();
    assert_eq!(values, vec![95.0, 90.0]);
}

#[tokio::test]
async fn test_events_replace_on_same_ts_and_filter_by_range() {
    let store = setup_store().await;
    for (ts, value) in [(10, 1), (20, 2), (30, 3), (20, 22)] {
        store
            .put_event(&StoredEvent {
                device_id: "a".into(),
                ts,
                event_id: format!("e-{}-{}", ts, value),
                metric: "temperature".into(),
                value,
                raw: "{}".into(),
                ingested_at: 0,
                request_id: "req".into(),
            })
            .await
            .unwrap();
    }

    let all = store.query_events("a", None, 100).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[1].value, 22);

    let ranged = store.query_events("a", Some((15, 30)), 100).await.unwrap();
    let ts: Vec<_> = ranged.iter().map(|e| e.ts).collect();
    assert_eq!(ts, vec![20, 30]);
}

// ============================================================================
// Queue
// ============================================================================

#[tokio::test]
async fn test_queue_lifecycle() {
    let queue = SqliteQueue::from_pool(memory_pool().await, &TableNames::default(), 2)
        .await
        .unwrap();

    let good = queue.send(r#"{"n":1}"#).await.unwrap();
    let bad = queue.send(r#"{"n":2}"#).await.unwrap();

    let batch = queue.receive(10).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].message_id, good);
    assert!(batch.iter().all(|m| m.receive_count == 1));

    queue.ack(&[good]).await.unwrap();
    assert_eq!(queue.release(&[bad.clone()]).await.unwrap(), 0);

    let retry = queue.receive(10).await.unwrap();
    assert_eq!(retry.len(), 1);
    assert_eq!(retry[0].receive_count, 2);
    assert_eq!(queue.release(&[bad.clone()]).await.unwrap(), 1);

    let dead = queue.dead_letters(100).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].message_id, bad);
    assert_eq!(dead[0].body, r#"{"n":2}"#);
    assert_eq!(
        queue.stats().await.unwrap(),
        QueueStats {
            pending: 0,
            in_flight: 0,
            dead_letter: 1
        }
    );
}

#[tokio::test]
async fn test_queue_recovers_stranded_messages() {
    let pool = memory_pool().await;
    let tables = TableNames::default();
    let queue = SqliteQueue::from_pool(pool.clone(), &tables, 3).await.unwrap();
    queue.send("a").await.unwrap();
    queue.receive(5).await.unwrap();
    assert_eq!(queue.stats().await.unwrap().in_flight, 1);

    // A fresh handle on the same database, as after a restart
    let restarted = SqliteQueue::from_pool(pool, &tables, 3).await.unwrap();
    assert_eq!(restarted.recover_in_flight().await.unwrap(), 1);
    let again = restarted.receive(5).await.unwrap();
    assert_eq!(again[0].receive_count, 2);
}
