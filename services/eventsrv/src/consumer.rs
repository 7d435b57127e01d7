//! Event consumer (batch handler)
//!
//! Evaluates queued device events against the stored rules of their device
//! and records an alert for every rule that fires.
//!
//! ```text
//!  QueueMessage.body ──parse──▶ DeviceEvent ──▶ rules_for_device(device)
//!                                                   │ enabled && metric ==
//!                                                   ▼
//!                                             Operator::evaluate ──true──▶ put_alert + ALERT log
//! ```
//!
//! Each message is processed on its own. A failure is logged and reported
//! in the batch response so only that message is redelivered.

use std::sync::Arc;

use common::logging::ALERT_TARGET;
use errors::{PulseError, PulseResult};
use pulse_rules::{Alert, DeviceEvent, FAILURE_INJECTION_DEVICE};
use pulse_store::{AlertStore, QueueMessage, RuleStore, TimeProvider};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

/// Identifier of a failed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Partial-batch result: only the listed messages are retried
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    pub fn failed_ids(&self) -> Vec<String> {
        self.batch_item_failures
            .iter()
            .map(|f| f.item_identifier.clone())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.batch_item_failures.is_empty()
    }
}

pub struct EventConsumer {
    rules: Arc<dyn RuleStore>,
    alerts: Arc<dyn AlertStore>,
    clock: Arc<dyn TimeProvider>,
    failure_injection: bool,
}

impl EventConsumer {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        alerts: Arc<dyn AlertStore>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            rules,
            alerts,
            clock,
            failure_injection: false,
        }
    }

    /// Fail every message for the reserved test device
    pub fn with_failure_injection(mut self, enabled: bool) -> Self {
        self.failure_injection = enabled;
        self
    }

    /// Process one message body, returning the alerts it produced
    pub async fn process_message(&self, body: &str) -> PulseResult<Vec<Alert>> {
        let payload: Value = serde_json::from_str(body)
            .map_err(|e| PulseError::MalformedMessage(e.to_string()))?;

        if self.failure_injection
            && payload.get("device_id").and_then(Value::as_str) == Some(FAILURE_INJECTION_DEVICE)
        {
            return Err(PulseError::InjectedFailure(
                FAILURE_INJECTION_DEVICE.to_string(),
            ));
        }

        let event: DeviceEvent = serde_json::from_value(payload)
            .map_err(|e| PulseError::MalformedMessage(e.to_string()))?;
        let value = event.numeric_value()?;

        let rules = self.rules.rules_for_device(&event.device_id).await?;
        debug!(
            "Evaluating {} rule(s) for device {} metric {}",
            rules.len(),
            event.device_id,
            event.metric
        );

        let mut fired = Vec::new();
        for rule in rules
            .iter()
            .filter(|r| r.matches(&event.device_id, &event.metric))
        {
            if !rule.is_triggered_by(value) {
                continue;
            }
            let alert = Alert::for_rule(rule, value, self.clock.now_millis());
            self.alerts.put_alert(&alert).await?;
            warn!(
                target: ALERT_TARGET,
                severity = "ALERT",
                device_id = %alert.device_id,
                rule_id = %alert.rule_id,
                metric = %alert.metric,
                value = alert.value,
                threshold = alert.threshold,
                operator = %rule.operator,
                "Alert triggered"
            );
            fired.push(alert);
        }
        Ok(fired)
    }

    /// Process a batch sequentially, isolating failures per message
    pub async fn process_batch(&self, messages: &[QueueMessage]) -> BatchResponse {
        let mut response = BatchResponse::default();
        for message in messages {
            if let Err(e) = self.process_message(&message.body).await {
                error!(
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    code = e.error_code(),
                    category = ?e.category(),
                    "Failed to process message: {}",
                    e
                );
                response.batch_item_failures.push(BatchItemFailure {
                    item_identifier: message.message_id.clone(),
                });
            }
        }
        response
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pulse_rules::{NewRule, Operator, Rule};
    use pulse_store::{FixedTimeProvider, MemoryStore};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn consumer(store: &Arc<MemoryStore>) -> EventConsumer {
        EventConsumer::new(
            store.clone(),
            store.clone(),
            Arc::new(FixedTimeProvider::new(NOW)),
        )
    }

    fn rule(id: &str, operator: Operator, threshold: u64, enabled: bool) -> Rule {
        NewRule {
            device_id: "D".to_string(),
            metric: "temperature".to_string(),
            operator,
            threshold,
            enabled,
        }
        .into_rule(id, 0)
    }

    fn message(id: &str, body: &str) -> QueueMessage {
        QueueMessage {
            message_id: id.to_string(),
            body: body.to_string(),
            receive_count: 1,
            enqueued_at: 0,
        }
    }

    fn event_body(device: &str, value: Value) -> String {
        json!({"device_id": device, "type": "temperature", "value": value, "ts": 1}).to_string()
    }

    #[tokio::test]
    async fn test_enabled_rule_fires_once() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_rule(&rule("r-1", Operator::GreaterThan, 80, true))
            .await
            .unwrap();

        let alerts = consumer(&store)
            .process_message(&event_body("D", json!(85)))
            .await
            .unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].value, 85.0);
        assert_eq!(alerts[0].threshold, 80);
        assert_eq!(alerts[0].triggered_at, NOW);
        assert_eq!(store.recent_alerts("D", 50).await.unwrap(), alerts);
    }

    #[tokio::test]
    async fn test_disabled_rule_never_fires() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_rule(&rule("r-1", Operator::GreaterThan, 80, false))
            .await
            .unwrap();

        let alerts = consumer(&store)
            .process_message(&event_body("D", json!(85)))
            .await
            .unwrap();
        assert!(alerts.is_empty());
        assert_eq!(store.alert_count(), 0);
    }

    #[tokio::test]
    async fn test_only_matching_metric_is_evaluated() {
        let store = Arc::new(MemoryStore::new());
        let mut humidity = rule("r-h", Operator::GreaterOrEqual, 0, true);
        humidity.metric = "humidity".to_string();
        store.put_rule(&humidity).await.unwrap();
        store
            .put_rule(&rule("r-t", Operator::GreaterOrEqual, 80, true))
            .await
            .unwrap();

        let alerts = consumer(&store)
            .process_message(&event_body("D", json!(80)))
            .await
            .unwrap();
        let ids: Vec<_> = alerts.iter().map(|a| a.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["r-t"]);
    }

    #[tokio::test]
    async fn test_timestamp_alias_and_numeric_string() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_rule(&rule("r-1", Operator::Equal, 42, true))
            .await
            .unwrap();

        let body = json!({
            "device_id": "D",
            "event_id": "e-1",
            "type": "temperature",
            "value": "42",
            "timestamp": 5,
            "evaluated_at": 6
        })
        .to_string();
        let alerts = consumer(&store).process_message(&body).await.unwrap();
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_non_numeric_value_fails_loudly() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_rule(&rule("r-1", Operator::GreaterThan, 80, true))
            .await
            .unwrap();

        let err = consumer(&store)
            .process_message(&event_body("D", json!("hot")))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_VALUE");
    }

    #[tokio::test]
    async fn test_batch_isolates_malformed_message() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_rule(&rule("r-1", Operator::GreaterThan, 80, true))
            .await
            .unwrap();

        let batch = vec![
            message("m-1", &event_body("D", json!(90))),
            message("m-2", "{not json"),
            message("m-3", &event_body("D", json!(95))),
        ];
        let response = consumer(&store).process_batch(&batch).await;

        assert_eq!(response.failed_ids(), vec!["m-2".to_string()]);
        assert_eq!(store.alert_count(), 2);
    }

    #[tokio::test]
    async fn test_sentinel_fails_only_when_injection_enabled() {
        let store = Arc::new(MemoryStore::new());
        // Payload is otherwise unusable, the sentinel check runs first
        let body = json!({"device_id": FAILURE_INJECTION_DEVICE}).to_string();

        let injected = consumer(&store).with_failure_injection(true);
        let err = injected.process_message(&body).await.unwrap_err();
        assert_eq!(err.error_code(), "INJECTED_FAILURE");

        let valid = event_body(FAILURE_INJECTION_DEVICE, json!(1));
        let response = injected.process_batch(&[message("m-1", &valid)]).await;
        assert_eq!(response.failed_ids(), vec!["m-1".to_string()]);

        let plain = consumer(&store);
        assert!(plain.process_message(&valid).await.unwrap().is_empty());
    }

    struct FailingRules;

    #[async_trait]
    impl RuleStore for FailingRules {
        async fn put_rule(&self, _rule: &Rule) -> PulseResult<()> {
            Err(PulseError::Database("unavailable".into()))
        }

        async fn get_rule(&self, _rule_id: &str) -> PulseResult<Option<Rule>> {
            Err(PulseError::Database("unavailable".into()))
        }

        async fn rules_for_device(&self, device_id: &str) -> PulseResult<Vec<Rule>> {
            if device_id == "broken" {
                return Err(PulseError::Database("unavailable".into()));
            }
            Ok(Vec::new())
        }

        async fn scan_rules(&self, _limit: usize) -> PulseResult<Vec<Rule>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_marks_only_that_message() {
        let store = Arc::new(MemoryStore::new());
        let consumer = EventConsumer::new(
            Arc::new(FailingRules),
            store.clone(),
            Arc::new(FixedTimeProvider::new(NOW)),
        );

        let batch = vec![
            message("a", &event_body("broken", json!(1))),
            message("b", &event_body("healthy", json!(1))),
        ];
        let response = consumer.process_batch(&batch).await;
        assert_eq!(response.failed_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn test_batch_response_wire_shape() {
        let response = BatchResponse {
            batch_item_failures: vec![BatchItemFailure {
                item_identifier: "m-2".into(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"batchItemFailures": [{"itemIdentifier": "m-2"}]})
        );
    }
}
