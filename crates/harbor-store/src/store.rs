//! Transactional document-store abstraction.
//!
//! The engine's durability model leans entirely on these two traits. The
//! critical property implementations must provide: everything written
//! through one [`StoreTransaction`] becomes visible atomically at
//! [`commit`](StoreTransaction::commit), and nothing becomes visible if the
//! transaction is dropped instead. The sync queue's enqueue-with-write
//! atomicity and the pull pipeline's all-stanzas-in-one-transaction
//! behavior both reduce to this.

use async_trait::async_trait;
use harbor_core::Document;

use crate::error::StoreResult;

/// A transactional document store.
///
/// Direct methods are single-shot consistent reads; multi-step work goes
/// through [`begin`](LocalStore::begin). Implementations must serialize
/// writers: while a write transaction is open, no other writer may commit
/// between its reads and its commit.
///
/// By convention every row also carries its own id in an `id` field, so a
/// document returned by a secondary lookup (`find_by_server_id`) can be
/// addressed again without a side channel.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Opens a write transaction.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + Send + '_>>;

    /// Fetches one row by id. `Ok(None)` when absent.
    async fn get(&self, table: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Returns every row of a table, in insertion order. Unknown tables
    /// yield an empty list.
    async fn scan(&self, table: &str) -> StoreResult<Vec<Document>>;

    /// Returns all rows whose `server_id` metadata equals `server_id`,
    /// including tombstoned rows.
    async fn find_by_server_id(&self, table: &str, server_id: &str)
        -> StoreResult<Vec<Document>>;
}

/// A write transaction over a [`LocalStore`].
///
/// Reads observe the transaction's own pending writes. Dropping the
/// transaction without committing rolls every write back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Fetches one row by id, observing pending writes.
    async fn get(&mut self, table: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Returns all rows with the given `server_id` metadata, observing
    /// pending writes. Tombstoned rows are included.
    async fn find_by_server_id(
        &mut self,
        table: &str,
        server_id: &str,
    ) -> StoreResult<Vec<Document>>;

    /// Inserts a new row. Fails with `Duplicate` if the id exists.
    async fn insert(&mut self, table: &str, id: &str, doc: Document) -> StoreResult<()>;

    /// Replaces an existing row. Fails with `NotFound` if absent.
    async fn update(&mut self, table: &str, id: &str, doc: Document) -> StoreResult<()>;

    /// Removes a row outright. Fails with `NotFound` if absent.
    ///
    /// Reserved for rows the engine owns (queue entries). Synced domain
    /// records are never hard-deleted; use [`mark_deleted`](Self::mark_deleted).
    async fn delete(&mut self, table: &str, id: &str) -> StoreResult<()>;

    /// Sets the row's soft-delete tombstone (`deleted_at = at_ms`). The row
    /// remains readable by the sync core; application queries must hide it.
    /// Fails with `NotFound` if absent.
    async fn mark_deleted(&mut self, table: &str, id: &str, at_ms: i64) -> StoreResult<()>;

    /// Atomically publishes every pending write.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
