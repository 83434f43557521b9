//! Scratch key/value store.
//!
//! A string-keyed blob store for the engine's small scratch values. The
//! only key the sync core uses is the pull watermark; implementations map
//! onto whatever the platform offers (preferences, a key/value table, a
//! file).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreResult;

/// A string-keyed blob store.
#[async_trait]
pub trait ScratchStore: Send + Sync {
    /// Reads the value under `key`, if set.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes the value under `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

/// In-memory [`ScratchStore`] for tests and ephemeral embedding.
#[derive(Debug, Default)]
pub struct MemoryScratch {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryScratch {
    /// Creates an empty scratch store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScratchStore for MemoryScratch {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let kv = MemoryScratch::new();
        assert_eq!(kv.get("k").await.unwrap(), None);

        kv.set("k", "1700").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("1700"));

        kv.set("k", "1800").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("1800"));

        kv.remove("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
        // removing again is fine
        kv.remove("k").await.unwrap();
    }
}
