//! Sync-metadata accessors over documents.
//!
//! Every synced record carries, next to its domain fields, a small set of
//! metadata fields the engine reads and writes:
//!
//! | Field | Meaning |
//! |---|---|
//! | `server_id` | server-assigned identifier, absent until first push ack |
//! | `server_updated_at` | server wall-clock (ms) last observed for the record |
//! | `sync_status` | `pending` / `synced` / `failed` |
//! | `last_sync_error` | diagnostic from the last failure, cleared on success |
//! | `deleted_at` | soft-delete tombstone (ms), never hard-delete synced rows |
//!
//! Invariant: `sync_status = synced` implies `server_id` is present.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Document;

/// Metadata field: server-assigned identifier.
pub const SERVER_ID: &str = "server_id";
/// Metadata field: server wall-clock timestamp (ms) last observed.
pub const SERVER_UPDATED_AT: &str = "server_updated_at";
/// Metadata field: synchronization status.
pub const SYNC_STATUS: &str = "sync_status";
/// Metadata field: last synchronization error, cleared on success.
pub const LAST_SYNC_ERROR: &str = "last_sync_error";
/// Metadata field: soft-delete tombstone timestamp (ms).
pub const DELETED_AT: &str = "deleted_at";

/// Local field holding the record's own last-modified wall clock (ms).
/// Maintained by the application; consulted by last-write-wins resolution.
pub const UPDATED_AT: &str = "updated_at";

/// Synchronization status of a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local edits not yet acknowledged by the server.
    Pending,
    /// In agreement with the server as of `server_updated_at`.
    Synced,
    /// The last push attempt for this record failed.
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Pending => write!(f, "pending"),
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Reads the record's sync status, if any.
pub fn sync_status(doc: &Document) -> Option<SyncStatus> {
    match doc.get(SYNC_STATUS)?.as_str()? {
        "pending" => Some(SyncStatus::Pending),
        "synced" => Some(SyncStatus::Synced),
        "failed" => Some(SyncStatus::Failed),
        _ => None,
    }
}

/// Reads the record's server id, if assigned.
pub fn server_id(doc: &Document) -> Option<&str> {
    doc.get(SERVER_ID).and_then(Value::as_str)
}

/// Reads the server timestamp (ms) last observed for the record.
pub fn server_updated_at(doc: &Document) -> Option<i64> {
    doc.get(SERVER_UPDATED_AT).and_then(Value::as_i64)
}

/// Reads the record's own last-modified wall clock (ms).
pub fn local_updated_at(doc: &Document) -> Option<i64> {
    doc.get(UPDATED_AT).and_then(Value::as_i64)
}

/// True if the record carries a soft-delete tombstone.
pub fn is_tombstoned(doc: &Document) -> bool {
    matches!(doc.get(DELETED_AT), Some(v) if !v.is_null())
}

/// Marks the record as agreeing with the server.
///
/// Sets `sync_status = synced`, clears `last_sync_error`, and records the
/// server identity and clock when provided.
pub fn set_synced(doc: &mut Document, server_id: Option<&str>, server_updated_at: Option<i64>) {
    if let Some(sid) = server_id {
        doc.insert(SERVER_ID.into(), sid.into());
    }
    if let Some(ts) = server_updated_at {
        doc.insert(SERVER_UPDATED_AT.into(), ts.into());
    }
    doc.insert(SYNC_STATUS.into(), "synced".into());
    doc.insert(LAST_SYNC_ERROR.into(), Value::Null);
}

/// Marks the record as locally edited and awaiting push.
pub fn mark_pending(doc: &mut Document) {
    doc.insert(SYNC_STATUS.into(), "pending".into());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn set_synced_records_server_identity() {
        let mut d = doc(&[("title", "A".into()), ("last_sync_error", "boom".into())]);
        set_synced(&mut d, Some("s1"), Some(200));

        assert_eq!(server_id(&d), Some("s1"));
        assert_eq!(server_updated_at(&d), Some(200));
        assert_eq!(sync_status(&d), Some(SyncStatus::Synced));
        assert!(d.get(LAST_SYNC_ERROR).unwrap().is_null());
    }

    #[test]
    fn set_synced_without_identity_keeps_existing() {
        let mut d = doc(&[("server_id", "s9".into()), ("server_updated_at", 100.into())]);
        set_synced(&mut d, None, None);

        assert_eq!(server_id(&d), Some("s9"));
        assert_eq!(server_updated_at(&d), Some(100));
        assert_eq!(sync_status(&d), Some(SyncStatus::Synced));
    }

    #[test]
    fn tombstone_detection() {
        let live = doc(&[("deleted_at", Value::Null)]);
        assert!(!is_tombstoned(&live));

        let dead = doc(&[("deleted_at", 1700.into())]);
        assert!(is_tombstoned(&dead));
    }

    #[test]
    fn status_parsing_tolerates_garbage() {
        let d = doc(&[("sync_status", "half-synced".into())]);
        assert_eq!(sync_status(&d), None);
    }
}
