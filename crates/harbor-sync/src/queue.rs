//! # Sync Queue
//!
//! Durable log of pending local mutations, stored in the local store's
//! reserved `sync_queue` table.
//!
//! ## Queue Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        sync_queue Table                                 │
//! │                                                                         │
//! │  id | operation | table_name | record_id | payload | retry | error     │
//! │  ───┼───────────┼────────────┼───────────┼─────────┼───────┼──────────│
//! │  q1 │ CREATE    │ posts      │ p1        │ {...}   │ 0     │ NULL     │
//! │  q2 │ UPDATE    │ posts      │ p2        │ {...}   │ 1     │ "500"    │
//! │  q3 │ DELETE    │ notes      │ n1        │ {...}   │ 3     │ "gone"   │ ← dead
//! │                                                                         │
//! │  ENQUEUE: inside the same transaction as the record write, so a        │
//! │           committed mutation always has its queue row and a rolled-    │
//! │           back one never does.                                         │
//! │                                                                         │
//! │  ACK:     server accepted the operation → row deleted.                 │
//! │  BUMP:    attempt failed → retry_count += 1, error recorded.           │
//! │  DEAD:    retry_count ≥ max_retries → excluded from pending(),         │
//! │           retained for failed() until purged.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use harbor_core::{Document, Operation, QueueItem};
use harbor_store::{LocalStore, StoreError, StoreTransaction};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Reserved table holding queue rows.
pub const SYNC_QUEUE_TABLE: &str = "sync_queue";

/// Durable FIFO-ish queue of pending mutations.
#[derive(Clone)]
pub struct SyncQueue {
    store: Arc<dyn LocalStore>,
}

impl SyncQueue {
    /// Creates a queue over the given store.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        SyncQueue { store }
    }

    /// Appends an item inside a caller-owned transaction.
    ///
    /// This is the atomic path: call it in the same transaction as the
    /// record write it describes, so both commit or neither does.
    pub async fn enqueue_in(
        &self,
        txn: &mut (dyn StoreTransaction + Send),
        operation: Operation,
        table_name: &str,
        record_id: &str,
        payload: Document,
    ) -> SyncResult<QueueItem> {
        let item = QueueItem::new(operation, table_name, record_id, payload);
        let doc = item.to_document()?;
        txn.insert(SYNC_QUEUE_TABLE, &item.id, doc).await?;

        debug!(
            queue_id = %item.id,
            operation = %item.operation,
            table = %item.table_name,
            record_id = %item.record_id,
            "Enqueued mutation"
        );

        Ok(item)
    }

    /// Appends an item in its own transaction.
    ///
    /// Convenience for callers whose record write has already committed.
    /// Failures propagate: the caller must know the mutation did not
    /// persist.
    pub async fn enqueue(
        &self,
        operation: Operation,
        table_name: &str,
        record_id: &str,
        payload: Document,
    ) -> SyncResult<QueueItem> {
        let mut txn = self.store.begin().await?;
        let item = self
            .enqueue_in(txn.as_mut(), operation, table_name, record_id, payload)
            .await?;
        txn.commit().await?;
        Ok(item)
    }

    /// Items still eligible for push (`retry_count < max_retries`), in
    /// insertion order.
    pub async fn pending(&self, max_retries: u32) -> SyncResult<Vec<QueueItem>> {
        let mut items = self.load_all().await?;
        items.retain(|item| item.retry_count < max_retries);
        Ok(items)
    }

    /// Dead items (`retry_count ≥ max_retries`), in insertion order.
    pub async fn failed(&self, max_retries: u32) -> SyncResult<Vec<QueueItem>> {
        let mut items = self.load_all().await?;
        items.retain(|item| item.retry_count >= max_retries);
        Ok(items)
    }

    /// Total queue length, pending and dead together.
    ///
    /// Advisory: any lookup error degrades to 0.
    pub async fn count_all(&self) -> i64 {
        match self.store.scan(SYNC_QUEUE_TABLE).await {
            Ok(rows) => rows.len() as i64,
            Err(e) => {
                warn!(error = %e, "Queue count failed, reporting 0");
                0
            }
        }
    }

    /// Deletes an acknowledged item.
    pub async fn ack(&self, id: &str) -> SyncResult<()> {
        let mut txn = self.store.begin().await?;
        txn.delete(SYNC_QUEUE_TABLE, id)
            .await
            .map_err(|e| Self::map_missing(e, id))?;
        txn.commit().await?;

        debug!(queue_id = %id, "Acked queue item");
        Ok(())
    }

    /// Records a failed attempt: `retry_count += 1`, error message replaced.
    pub async fn bump(&self, id: &str, error_message: &str) -> SyncResult<()> {
        let mut txn = self.store.begin().await?;

        let doc = txn
            .get(SYNC_QUEUE_TABLE, id)
            .await?
            .ok_or_else(|| SyncError::QueueItemNotFound { id: id.to_string() })?;
        let mut item = QueueItem::from_document(&doc)?;

        item.retry_count += 1;
        item.error_message = Some(error_message.to_string());
        item.updated_at = Utc::now();

        txn.update(SYNC_QUEUE_TABLE, id, item.to_document()?)
            .await
            .map_err(|e| Self::map_missing(e, id))?;
        txn.commit().await?;

        debug!(queue_id = %id, retry_count = item.retry_count, error = %error_message, "Bumped queue item");
        Ok(())
    }

    /// Deletes every dead item; returns how many were removed.
    pub async fn purge_failed(&self, max_retries: u32) -> SyncResult<usize> {
        let dead = self.failed(max_retries).await?;
        if dead.is_empty() {
            return Ok(0);
        }

        let mut txn = self.store.begin().await?;
        for item in &dead {
            txn.delete(SYNC_QUEUE_TABLE, &item.id).await?;
        }
        txn.commit().await?;

        Ok(dead.len())
    }

    /// Deletes every queue row; returns how many were removed.
    pub async fn purge_all(&self) -> SyncResult<usize> {
        let items = self.load_all().await?;
        if items.is_empty() {
            return Ok(0);
        }

        let mut txn = self.store.begin().await?;
        for item in &items {
            txn.delete(SYNC_QUEUE_TABLE, &item.id).await?;
        }
        txn.commit().await?;

        Ok(items.len())
    }

    /// Loads and orders every queue row. Rows that fail to parse are
    /// logged and skipped rather than wedging the queue.
    async fn load_all(&self) -> SyncResult<Vec<QueueItem>> {
        let rows = self.store.scan(SYNC_QUEUE_TABLE).await?;

        let mut items: Vec<QueueItem> = Vec::with_capacity(rows.len());
        for row in &rows {
            match QueueItem::from_document(row) {
                Ok(item) => items.push(item),
                Err(e) => warn!(error = %e, "Skipping unparseable queue row"),
            }
        }

        // Insertion order; the scan already preserves it, the sort makes
        // the contract hold for stores that return rows unordered.
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    fn map_missing(err: StoreError, id: &str) -> SyncError {
        if err.is_not_found() {
            SyncError::QueueItemNotFound { id: id.to_string() }
        } else {
            SyncError::Store(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_store::MemoryStore;

    fn payload(title: &str) -> Document {
        let mut doc = Document::new();
        doc.insert("title".into(), title.into());
        doc
    }

    fn queue() -> (SyncQueue, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SyncQueue::new(store.clone()), store)
    }

    #[tokio::test]
    async fn enqueue_initializes_retry_state() {
        let (queue, _) = queue();
        let item = queue
            .enqueue(Operation::Create, "posts", "p1", payload("A"))
            .await
            .unwrap();

        assert_eq!(item.retry_count, 0);
        assert!(item.error_message.is_none());

        let pending = queue.pending(3).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record_id, "p1");
    }

    #[tokio::test]
    async fn pending_preserves_insertion_order() {
        let (queue, _) = queue();
        for i in 0..4 {
            queue
                .enqueue(Operation::Update, "posts", &format!("p{}", i), payload("x"))
                .await
                .unwrap();
        }

        let ids: Vec<String> = queue
            .pending(3)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.record_id)
            .collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn bump_moves_item_to_failed_at_max_retries() {
        let (queue, _) = queue();
        let item = queue
            .enqueue(Operation::Create, "posts", "p1", payload("A"))
            .await
            .unwrap();

        for attempt in 1..=3 {
            queue.bump(&item.id, "Network error").await.unwrap();
            let all = queue.pending(u32::MAX).await.unwrap();
            assert_eq!(all[0].retry_count, attempt);
        }

        assert!(queue.pending(3).await.unwrap().is_empty());
        let dead = queue.failed(3).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].error_message.as_deref(), Some("Network error"));
        // dead items still count toward the advisory total
        assert_eq!(queue.count_all().await, 1);
    }

    #[tokio::test]
    async fn ack_deletes_and_missing_id_errors() {
        let (queue, _) = queue();
        let item = queue
            .enqueue(Operation::Create, "posts", "p1", payload("A"))
            .await
            .unwrap();

        queue.ack(&item.id).await.unwrap();
        assert_eq!(queue.count_all().await, 0);

        let err = queue.ack(&item.id).await.unwrap_err();
        assert!(matches!(err, SyncError::QueueItemNotFound { .. }));

        let err = queue.bump(&item.id, "late").await.unwrap_err();
        assert!(matches!(err, SyncError::QueueItemNotFound { .. }));
    }

    #[tokio::test]
    async fn purge_failed_removes_only_dead_items() {
        let (queue, _) = queue();
        let dead = queue
            .enqueue(Operation::Create, "posts", "p1", payload("A"))
            .await
            .unwrap();
        queue
            .enqueue(Operation::Update, "posts", "p2", payload("B"))
            .await
            .unwrap();

        for _ in 0..3 {
            queue.bump(&dead.id, "boom").await.unwrap();
        }

        assert_eq!(queue.purge_failed(3).await.unwrap(), 1);
        assert_eq!(queue.count_all().await, 1);
        assert_eq!(queue.pending(3).await.unwrap().len(), 1);

        assert_eq!(queue.purge_all().await.unwrap(), 1);
        assert_eq!(queue.count_all().await, 0);
    }

    #[tokio::test]
    async fn enqueue_in_rolls_back_with_the_record_write() {
        let (queue, store) = queue();

        {
            let mut txn = store.begin().await.unwrap();
            txn.insert("posts", "p1", payload("A")).await.unwrap();
            queue
                .enqueue_in(txn.as_mut(), Operation::Create, "posts", "p1", payload("A"))
                .await
                .unwrap();
            // dropped without commit: neither the record nor the queue row
        }

        assert!(store.get("posts", "p1").await.unwrap().is_none());
        assert_eq!(queue.count_all().await, 0);
    }
}
