//! Core domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A schemaless record: field name → JSON value.
///
/// Documents are the unit of storage and of transfer. Domain fields and
/// sync-metadata fields (see [`crate::record`]) live side by side in the
/// same map; application queries are expected to ignore the metadata.
pub type Document = serde_json::Map<String, Value>;

/// Milliseconds since the Unix epoch, the engine's wall-clock currency.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// Operation
// =============================================================================

/// The kind of local mutation a queue item propagates to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// A record created locally that the server has not seen.
    Create,
    /// An edit to a record the server already knows.
    Update,
    /// A soft deletion to propagate.
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(Operation::Create),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(format!("unknown operation: '{}'", other)),
        }
    }
}

// =============================================================================
// Queue Item
// =============================================================================

/// One durable entry in the sync queue.
///
/// A queue item is a snapshot of a local mutation at enqueue time. It lives
/// in the local store's reserved `sync_queue` table until the server
/// definitively acknowledges the operation (then it is deleted) or its
/// `retry_count` reaches the configured maximum (then it is retained as a
/// dead item, excluded from further pushes, and surfaced for operators).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Local unique identifier (UUID v4).
    pub id: String,

    /// Mutation kind.
    pub operation: Operation,

    /// Table the target record lives in.
    pub table_name: String,

    /// Local id of the target record.
    pub record_id: String,

    /// Snapshot of the record's fields at enqueue time.
    pub payload: Document,

    /// Number of failed push attempts so far. Only ever increases.
    pub retry_count: u32,

    /// Diagnostic from the most recent failure, if any.
    pub error_message: Option<String>,

    /// When the item was enqueued.
    pub created_at: DateTime<Utc>,

    /// When the item was last touched (enqueue or bump).
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Creates a fresh queue item with a generated id and zeroed retry state.
    pub fn new(
        operation: Operation,
        table_name: impl Into<String>,
        record_id: impl Into<String>,
        payload: Document,
    ) -> Self {
        let now = Utc::now();
        QueueItem {
            id: Uuid::new_v4().to_string(),
            operation,
            table_name: table_name.into(),
            record_id: record_id.into(),
            payload,
            retry_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Serializes the item into a storable document.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => unreachable!("QueueItem serializes to an object"),
        }
    }

    /// Rebuilds an item from its stored document form.
    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(doc.clone()))
    }
}
