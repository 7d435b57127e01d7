//! Queue worker
//!
//! Pulls batches from the event queue, hands them to the [`EventConsumer`]
//! and reports the outcome back: successes are acked, failures released.
//! Redelivery counting and dead-lettering belong to the queue.

use std::sync::Arc;
use std::time::Duration;

use errors::PulseResult;
use pulse_store::EventQueue;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::consumer::EventConsumer;

/// Outcome of one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

pub struct QueueWorker {
    queue: Arc<dyn EventQueue>,
    consumer: Arc<EventConsumer>,
    batch_size: usize,
    poll_interval: Duration,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        consumer: Arc<EventConsumer>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            consumer,
            batch_size: batch_size.max(1),
            poll_interval,
        }
    }

    /// Receive one batch and settle every message in it
    pub async fn run_once(&self) -> PulseResult<PollSummary> {
        let messages = self.queue.receive(self.batch_size).await?;
        if messages.is_empty() {
            return Ok(PollSummary::default());
        }

        let response = self.consumer.process_batch(&messages).await;
        let failed = response.failed_ids();
        let succeeded: Vec<String> = messages
            .iter()
            .filter(|m| !failed.contains(&m.message_id))
            .map(|m| m.message_id.clone())
            .collect();

        // Release runs even when ack fails so failures are never stranded
        let acked = self.queue.ack(&succeeded).await;
        let released = self.queue.release(&failed).await;
        let dead_lettered = match (acked, released) {
            (Ok(()), Ok(n)) => n,
            (Err(e), Ok(_)) | (Ok(()), Err(e)) => return Err(e),
            (Err(ack_err), Err(release_err)) => {
                error!("Release failed after ack failure: {}", release_err);
                return Err(ack_err);
            },
        };

        let summary = PollSummary {
            received: messages.len(),
            succeeded: succeeded.len(),
            failed: failed.len(),
            dead_lettered,
        };
        if !response.is_clean() {
            warn!(
                "Batch settled with failures: {}/{} failed, {} dead-lettered",
                summary.failed, summary.received, summary.dead_lettered
            );
        } else {
            debug!("Batch settled: {} message(s)", summary.received);
        }
        Ok(summary)
    }

    /// Poll until `token` is cancelled
    ///
    /// Messages stranded in flight by a previous run are made visible first.
    /// A full batch is followed by an immediate poll; otherwise the worker
    /// sleeps for the poll interval.
    pub async fn run(&self, token: CancellationToken) {
        match self.queue.recover_in_flight().await {
            Ok(0) => {},
            Ok(n) => info!("Requeued {} message(s) left in flight", n),
            Err(e) => error!("Failed to recover in-flight messages: {}", e),
        }

        info!(
            "Queue worker started (batch size {}, poll interval {:?})",
            self.batch_size, self.poll_interval
        );

        while !token.is_cancelled() {
            let full_batch = match self.run_once().await {
                Ok(summary) => summary.received >= self.batch_size,
                Err(e) => {
                    error!(code = e.error_code(), "Queue poll failed: {}", e);
                    false
                },
            };
            if full_batch {
                continue;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {},
            }
        }

        info!("Queue worker stopped");
    }
}
