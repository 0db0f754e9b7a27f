//! One flush pass: peek, encode, compress, send, and drop on delivery.

use std::sync::Arc;
use telemetry_config::TelemetryConfig;
use telemetry_ingest::{encode_batch, gzip, AccountIds, BatchTransport, FlushOutcome};
use telemetry_queue::EventStore;
use tracing::{debug, info, warn};

/// What the caller should do after a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// The queue was empty.
    NoOp,
    /// Finished; nothing to retry (events may still be queued).
    Success,
    /// Transient failure; flush again later.
    RetryRequested,
}

impl FlushStatus {
    pub fn needs_retry(&self) -> bool {
        matches!(self, FlushStatus::RetryRequested)
    }
}

/// Result of one flush pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub status: FlushStatus,
    /// Transport outcome, or the local failure that stopped the pass.
    pub outcome: Option<FlushOutcome>,
    /// Events read from the queue.
    pub batch_len: usize,
    /// Events removed after delivery.
    pub dropped: usize,
}

impl FlushReport {
    fn noop() -> Self {
        Self {
            status: FlushStatus::NoOp,
            outcome: None,
            batch_len: 0,
            dropped: 0,
        }
    }

    fn retry(reason: String, batch_len: usize) -> Self {
        Self {
            status: FlushStatus::RetryRequested,
            outcome: Some(FlushOutcome::Retryable { reason }),
            batch_len,
            dropped: 0,
        }
    }
}

/// Where and how batches are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushTarget {
    pub ids: AccountIds,
    pub endpoint: String,
    pub ingest_key: String,
    pub batch_size: usize,
}

impl FlushTarget {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            ids: AccountIds::new(&config.project_id, &config.app_id, &config.package_name),
            endpoint: config.endpoint.trim().to_string(),
            ingest_key: config.ingest_key.clone(),
            batch_size: config.batch_size.max(1),
        }
    }
}

/// Moves the oldest queued events to the ingest endpoint.
///
/// Network I/O runs outside the store executor, so producers keep enqueuing
/// while a batch is in flight. Concurrent flushes may send the same batch
/// twice, but a delivery only removes records up to the last id it peeked,
/// so an event is never dropped before it has been sent.
pub struct FlushPipeline {
    store: EventStore,
    transport: Arc<dyn BatchTransport>,
    target: FlushTarget,
}

impl FlushPipeline {
    pub fn new(store: EventStore, transport: Arc<dyn BatchTransport>, target: FlushTarget) -> Self {
        Self {
            store,
            transport,
            target,
        }
    }

    pub fn target(&self) -> &FlushTarget {
        &self.target
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Run one flush pass. Never fails; failures are folded into the report.
    pub async fn flush(&self) -> FlushReport {
        let batch = match self.store.peek(self.target.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Failed to read queued events");
                return FlushReport::retry(format!("store read failed: {e}"), 0);
            }
        };
        if batch.is_empty() {
            debug!("Nothing to flush");
            return FlushReport::noop();
        }
        let batch_len = batch.len();
        let last_id = batch[batch_len - 1].id;

        let body = match encode_batch(&self.target.ids, &batch) {
            Ok(body) => body,
            Err(e) => {
                // A corrupt stored payload would fail every retry the same way.
                warn!(error = %e, batch_len, "Failed to encode batch, keeping events");
                return FlushReport {
                    status: FlushStatus::Success,
                    outcome: Some(FlushOutcome::Skipped {
                        reason: e.to_string(),
                    }),
                    batch_len,
                    dropped: 0,
                };
            }
        };

        let compressed = match gzip(&body) {
            Ok(compressed) => compressed,
            Err(e) => {
                warn!(error = %e, "Failed to compress batch");
                return FlushReport::retry(format!("compression failed: {e}"), batch_len);
            }
        };

        debug!(
            batch_len,
            raw_bytes = body.len(),
            compressed_bytes = compressed.len(),
            "Flushing batch"
        );
        let outcome = self
            .transport
            .send(&self.target.endpoint, &self.target.ingest_key, compressed)
            .await;

        match outcome {
            FlushOutcome::Delivered { status } => match self
                .store
                .drop_through(last_id, batch_len)
                .await
            {
                Ok(dropped) => {
                    info!(status, dropped, "Batch delivered");
                    FlushReport {
                        status: FlushStatus::Success,
                        outcome: Some(outcome),
                        batch_len,
                        dropped,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Batch delivered but could not be removed from the queue");
                    FlushReport {
                        status: FlushStatus::RetryRequested,
                        outcome: Some(outcome),
                        batch_len,
                        dropped: 0,
                    }
                }
            },
            FlushOutcome::Rejected { status } => {
                warn!(status, batch_len, "Batch rejected by server, keeping events");
                FlushReport {
                    status: FlushStatus::Success,
                    outcome: Some(outcome),
                    batch_len,
                    dropped: 0,
                }
            }
            FlushOutcome::Skipped { ref reason } => {
                debug!(reason = %reason, "Batch not sent");
                FlushReport {
                    status: FlushStatus::Success,
                    outcome: Some(outcome),
                    batch_len,
                    dropped: 0,
                }
            }
            FlushOutcome::Retryable { ref reason } => {
                info!(reason = %reason, batch_len, "Batch send will be retried");
                FlushReport {
                    status: FlushStatus::RetryRequested,
                    outcome: Some(outcome),
                    batch_len,
                    dropped: 0,
                }
            }
        }
    }
}
