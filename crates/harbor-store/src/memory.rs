//! In-memory document store.
//!
//! A real, transactional implementation of [`LocalStore`] suitable for:
//! - unit and integration tests
//! - ephemeral embedding (caches, demos)
//!
//! Transactions hold the store's single write lock for their whole
//! lifetime, so a committed write can never interleave with another
//! transaction's read-modify-write cycle. Within a transaction, writes go
//! to a working copy that replaces the shared state on commit; dropping
//! the transaction discards the copy.
//!
//! Tables preserve insertion order, which is what backs the sync queue's
//! FIFO contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use harbor_core::{record, Document};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{StoreError, StoreResult};
use crate::store::{LocalStore, StoreTransaction};

type Table = Vec<(String, Document)>;
type Tables = HashMap<String, Table>;

/// An in-memory, insertion-ordered, transactional document store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows currently in `table`.
    ///
    /// Test convenience; not part of the [`LocalStore`] surface.
    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .lock()
            .await
            .get(table)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    /// True if `table` holds no rows.
    pub async fn is_empty(&self, table: &str) -> bool {
        self.len(table).await == 0
    }
}

fn table_get<'a>(tables: &'a Tables, table: &str, id: &str) -> Option<&'a Document> {
    tables
        .get(table)?
        .iter()
        .find(|(row_id, _)| row_id == id)
        .map(|(_, doc)| doc)
}

fn table_find_by_server_id(tables: &Tables, table: &str, server_id: &str) -> Vec<Document> {
    tables
        .get(table)
        .map(|rows| {
            rows.iter()
                .filter(|(_, doc)| record::server_id(doc) == Some(server_id))
                .map(|(_, doc)| doc.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + Send + '_>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn get(&self, table: &str, id: &str) -> StoreResult<Option<Document>> {
        let tables = self.tables.lock().await;
        Ok(table_get(&tables, table, id).cloned())
    }

    async fn scan(&self, table: &str) -> StoreResult<Vec<Document>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().map(|(_, doc)| doc.clone()).collect())
            .unwrap_or_default())
    }

    async fn find_by_server_id(&self, table: &str, server_id: &str)
        -> StoreResult<Vec<Document>> {
        let tables = self.tables.lock().await;
        Ok(table_find_by_server_id(&tables, table, server_id))
    }
}

/// Write transaction over a [`MemoryStore`].
///
/// Holds the store's write lock until committed or dropped.
struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, table: &str, id: &str) -> StoreResult<Option<Document>> {
        Ok(table_get(&self.working, table, id).cloned())
    }

    async fn find_by_server_id(
        &mut self,
        table: &str,
        server_id: &str,
    ) -> StoreResult<Vec<Document>> {
        Ok(table_find_by_server_id(&self.working, table, server_id))
    }

    async fn insert(&mut self, table: &str, id: &str, doc: Document) -> StoreResult<()> {
        let rows = self.working.entry(table.to_string()).or_default();
        if rows.iter().any(|(row_id, _)| row_id == id) {
            return Err(StoreError::duplicate(table, id));
        }
        rows.push((id.to_string(), doc));
        Ok(())
    }

    async fn update(&mut self, table: &str, id: &str, doc: Document) -> StoreResult<()> {
        let rows = self
            .working
            .get_mut(table)
            .ok_or_else(|| StoreError::not_found(table, id))?;
        let slot = rows
            .iter_mut()
            .find(|(row_id, _)| row_id == id)
            .ok_or_else(|| StoreError::not_found(table, id))?;
        slot.1 = doc;
        Ok(())
    }

    async fn delete(&mut self, table: &str, id: &str) -> StoreResult<()> {
        let rows = self
            .working
            .get_mut(table)
            .ok_or_else(|| StoreError::not_found(table, id))?;
        let idx = rows
            .iter()
            .position(|(row_id, _)| row_id == id)
            .ok_or_else(|| StoreError::not_found(table, id))?;
        rows.remove(idx);
        Ok(())
    }

    async fn mark_deleted(&mut self, table: &str, id: &str, at_ms: i64) -> StoreResult<()> {
        let rows = self
            .working
            .get_mut(table)
            .ok_or_else(|| StoreError::not_found(table, id))?;
        let slot = rows
            .iter_mut()
            .find(|(row_id, _)| row_id == id)
            .ok_or_else(|| StoreError::not_found(table, id))?;
        slot.1.insert(record::DELETED_AT.into(), Value::from(at_ms));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        *self.guard = self.working;
        Ok(())
    }
}
