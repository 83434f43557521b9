//! # Push Pipeline
//!
//! Drains the sync queue in batches and applies server acknowledgements.
//!
//! ## Push Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Push Pipeline Flow                              │
//! │                                                                         │
//! │  1. Load:    pending(max_retries), insertion order                     │
//! │                                                                         │
//! │  2. Batch:   contiguous chunks of up to push_batch_size                │
//! │                                                                         │
//! │  3. Backoff: a batch holding previously-failed items first sleeps      │
//! │              out the longest remaining delay                           │
//! │              (retry_delay_base_ms · 2^(retry_count-1), capped)         │
//! │                                                                         │
//! │  4. Send:    transport.push({ changes })                               │
//! │              │                                                          │
//! │              ├─ transport error or success=false                       │
//! │              │    → bump EVERY item in the batch                       │
//! │              │                                                          │
//! │              └─ per-item results, zipped positionally                  │
//! │                   ├─ result.error present → bump that item             │
//! │                   └─ accepted → write server identity back to the      │
//! │                      local record, then ack the queue row              │
//! │                                                                         │
//! │  A bump that itself fails is logged and skipped: the item keeps its    │
//! │  old retry count and is re-sent next cycle (at-least-once; the server  │
//! │  is idempotent on (record_id, operation)).                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use harbor_core::{record, QueueItem};
use harbor_store::{LocalStore, StoreTransaction};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::protocol::{PushChange, PushItemResult, PushRequest};
use crate::queue::SyncQueue;
use crate::retry::RetryPolicy;
use crate::transport::SyncTransport;

/// Counters for one push cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Items acknowledged and drained from the queue.
    pub pushed: usize,
    /// Items that failed this cycle (bumped or writeback-failed).
    pub failed: usize,
}

/// Drains the sync queue toward the server.
#[derive(Clone)]
pub struct PushPipeline {
    store: Arc<dyn LocalStore>,
    queue: SyncQueue,
    transport: Arc<dyn SyncTransport>,
    batch_size: usize,
    retry: RetryPolicy,
    debug: bool,
}

impl PushPipeline {
    /// Creates a pipeline with the configured batch size and retry ceiling.
    pub fn new(
        store: Arc<dyn LocalStore>,
        queue: SyncQueue,
        transport: Arc<dyn SyncTransport>,
        config: &SyncConfig,
    ) -> Self {
        PushPipeline {
            store,
            queue,
            transport,
            batch_size: config.push_batch_size,
            retry: RetryPolicy::new(config.retry_delay_base_ms, config.max_retries),
            debug: config.debug,
        }
    }

    /// Pushes every eligible queue item, batch by batch.
    ///
    /// Transport failures and per-item rejections are absorbed into retry
    /// accounting; only queue listing failures propagate.
    pub async fn push(&self) -> SyncResult<PushOutcome> {
        let pending = self.queue.pending(self.retry.max_retries()).await?;
        if pending.is_empty() {
            debug!("No pending queue items");
            return Ok(PushOutcome::default());
        }

        info!(count = pending.len(), "Pushing pending queue items");

        let mut outcome = PushOutcome::default();
        for batch in pending.chunks(self.batch_size) {
            self.push_batch(batch, &mut outcome).await;
        }

        info!(
            pushed = outcome.pushed,
            failed = outcome.failed,
            "Push cycle complete"
        );

        Ok(outcome)
    }

    /// Sends one batch and settles every item in it.
    async fn push_batch(&self, batch: &[QueueItem], outcome: &mut PushOutcome) {
        // Previously-failed items wait out their exponential backoff before
        // a re-send; fresh items carry no delay.
        let backoff = batch
            .iter()
            .filter(|item| item.retry_count > 0)
            .map(|item| self.retry.delay_for(item.retry_count - 1))
            .max();
        if let Some(delay) = backoff {
            debug!(delay_ms = delay.as_millis() as u64, "Backing off before re-send");
            tokio::time::sleep(delay).await;
        }

        let request = PushRequest {
            changes: batch
                .iter()
                .map(|item| PushChange {
                    table_name: item.table_name.clone(),
                    operation: item.operation,
                    record_id: item.record_id.clone(),
                    data: item.payload.clone(),
                })
                .collect(),
        };

        if self.debug {
            debug!(batch_len = batch.len(), "Sending push batch");
        }

        let response = match self.transport.push(&request).await {
            Ok(response) if response.success => response,
            Ok(response) => {
                // Server rejected the batch wholesale.
                let message = "push rejected: server reported failure".to_string();
                warn!(batch_len = batch.len(), "Push batch rejected by server");
                self.bump_batch(batch, &message).await;
                outcome.failed += batch.len();
                return;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(error = %e, batch_len = batch.len(), "Push batch transport failure");
                } else {
                    error!(
                        error = %e,
                        batch_len = batch.len(),
                        "Push batch failed with non-retryable error"
                    );
                }
                self.bump_batch(batch, &e.to_string()).await;
                outcome.failed += batch.len();
                return;
            }
        };

        let mut results = response.results.into_iter();
        for item in batch {
            match results.next() {
                Some(result) => self.settle_item(item, result, outcome).await,
                None => {
                    // The server answered with fewer results than changes.
                    warn!(queue_id = %item.id, "Push response carried no result for item");
                    self.bump_item(item, "push response missing a result for this item")
                        .await;
                    outcome.failed += 1;
                }
            }
        }
    }

    /// Applies one positional result to its queue item.
    async fn settle_item(&self, item: &QueueItem, result: PushItemResult, outcome: &mut PushOutcome) {
        if let Some(message) = result.error {
            debug!(queue_id = %item.id, error = %message, "Item rejected by server");
            self.bump_item(item, &message).await;
            outcome.failed += 1;
            return;
        }

        if let Err(e) = self
            .apply_ack(item, result.server_id.as_deref(), result.server_updated_at)
            .await
        {
            // Neither acked nor bumped: the item keeps its retry count and
            // is re-sent next cycle.
            error!(queue_id = %item.id, error = %e, "Ack writeback failed");
            outcome.failed += 1;
            return;
        }

        match self.queue.ack(&item.id).await {
            Ok(()) => outcome.pushed += 1,
            Err(e) => {
                error!(queue_id = %item.id, error = %e, "Failed to ack queue item");
                outcome.failed += 1;
            }
        }
    }

    /// Writes the server's identity back to the local record.
    ///
    /// A record that has vanished locally is warned about, not an error:
    /// the server already accepted the operation, so the queue row has
    /// served its purpose and is acked regardless.
    async fn apply_ack(
        &self,
        item: &QueueItem,
        server_id: Option<&str>,
        server_updated_at: Option<i64>,
    ) -> SyncResult<()> {
        let mut txn = self.store.begin().await?;

        match txn.get(&item.table_name, &item.record_id).await? {
            Some(mut doc) => {
                record::set_synced(&mut doc, server_id, server_updated_at);
                txn.update(&item.table_name, &item.record_id, doc).await?;
                txn.commit().await?;

                if self.debug {
                    debug!(
                        table = %item.table_name,
                        record_id = %item.record_id,
                        server_id = ?server_id,
                        "Applied push acknowledgement"
                    );
                }
            }
            None => {
                warn!(
                    table = %item.table_name,
                    record_id = %item.record_id,
                    "Acked record no longer exists locally"
                );
            }
        }

        Ok(())
    }

    /// Bumps every item in a batch, tolerating individual bump failures.
    async fn bump_batch(&self, batch: &[QueueItem], message: &str) {
        for item in batch {
            self.bump_item(item, message).await;
        }
    }

    async fn bump_item(&self, item: &QueueItem, message: &str) {
        if let Err(e) = self.queue.bump(&item.id, message).await {
            error!(queue_id = %item.id, error = %e, "Failed to bump queue item");
        }
    }
}
