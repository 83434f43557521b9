//! Wire types for the push and pull exchanges.
//!
//! ## Push
//! ```text
//! Request:  { changes: [ { tableName, operation, recordId, data } ... ] }
//! Response: { success: bool,
//!             results: [ { recordId?, serverId?, serverUpdatedAt?, error? } ... ] }
//! ```
//! `results` corresponds positionally with `changes`. A present `error`
//! means that item failed; `success = false` fails the whole batch.
//!
//! ## Pull
//! ```text
//! Request:  { lastSyncAt: int | null, tables: [string ...] }
//! Response: { timestamp: int,
//!             changes: { <table>: { created: [<record>...],
//!                                   updated: [<record>...],
//!                                   deleted: [<serverId>...] } } }
//! ```
//! A `<record>` carries at least an `id` (the server id) and an
//! `updated_at` server clock; every other field is application data, mapped
//! into local spelling by the pull pipeline.

use std::collections::HashMap;

use harbor_core::{Document, Operation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Push
// =============================================================================

/// One queued mutation on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushChange {
    /// Table the record lives in.
    pub table_name: String,
    /// Mutation kind.
    pub operation: Operation,
    /// Local id of the record.
    pub record_id: String,
    /// Field snapshot taken at enqueue time.
    pub data: Document,
}

/// Push request: a batch of changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    /// Changes in queue order.
    pub changes: Vec<PushChange>,
}

/// Per-item outcome inside a push response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushItemResult {
    /// Echo of the local record id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Server-assigned id, present on accepted creates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Server wall clock (ms) for the accepted mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_updated_at: Option<i64>,
    /// Present iff the item was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Push response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    /// False fails the entire batch regardless of `results`.
    pub success: bool,
    /// Positional per-item outcomes.
    #[serde(default)]
    pub results: Vec<PushItemResult>,
}

// =============================================================================
// Pull
// =============================================================================

/// Pull request: everything after the watermark, for these tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Watermark from the previous successful pull, or null on first sync.
    pub last_sync_at: Option<i64>,
    /// Tables the client wants changes for.
    pub tables: Vec<String>,
}

/// Per-table change stanzas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableChanges {
    /// Records created on the server since the watermark.
    #[serde(default)]
    pub created: Vec<Document>,
    /// Records updated on the server since the watermark.
    #[serde(default)]
    pub updated: Vec<Document>,
    /// Server ids deleted on the server since the watermark.
    #[serde(default)]
    pub deleted: Vec<String>,
}

/// Pull response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    /// Server clock (ms) to persist as the next watermark.
    pub timestamp: i64,
    /// Changes keyed by table name.
    #[serde(default)]
    pub changes: HashMap<String, TableChanges>,
}

// =============================================================================
// Server-record accessors
// =============================================================================

/// Reads a server record's id.
pub fn server_record_id(record: &Document) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Reads a server record's update clock, accepting either spelling.
pub fn server_record_updated_at(record: &Document) -> Option<i64> {
    record
        .get("updated_at")
        .or_else(|| record.get("updatedAt"))
        .and_then(Value::as_i64)
}
