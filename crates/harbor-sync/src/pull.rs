//! # Pull Pipeline
//!
//! Fetches server-side changes since the watermark and applies them to the
//! local store inside a single write transaction.
//!
//! ## Pull Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Pull Pipeline Flow                              │
//! │                                                                         │
//! │  1. Watermark: read last_pulled_at (absent → null, first sync)         │
//! │                                                                         │
//! │  2. Fetch:     transport.pull({ lastSyncAt, tables })                  │
//! │                                                                         │
//! │  3. Apply:     ONE write transaction, per table in stanza order:       │
//! │                  created → updated → deleted                           │
//! │                                                                         │
//! │     created:  new local row, server fields mapped to local spelling,   │
//! │               sync metadata recorded (known server_id → update path)   │
//! │     updated:  no local row → create; conflict → resolver verdict;      │
//! │               otherwise overwrite from the server                      │
//! │     deleted:  soft-delete every row carrying that server_id            │
//! │                                                                         │
//! │     One bad row is logged and skipped; it never rejects the batch.     │
//! │                                                                         │
//! │  4. Watermark: persist response.timestamp (failure logged, not fatal;  │
//! │                the next pull is merely redundant)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conflict Detection
//! A pull update conflicts iff the local row has `sync_status = pending`,
//! carries a `server_updated_at`, and the incoming server clock is newer
//! than that value: the local side holds unpushed edits made against a
//! server version that is no longer current.

use std::sync::Arc;

use harbor_core::{fields, now_ms, record, Document};
use harbor_store::{LocalStore, ScratchStore, StoreTransaction};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::protocol::{server_record_id, server_record_updated_at, PullRequest, TableChanges};
use crate::resolver::{ConflictContext, ConflictResolver, Resolution};
use crate::transport::SyncTransport;

/// Scratch-store key holding the pull watermark.
pub const WATERMARK_KEY: &str = "@offlineSync:lastSyncAt";

/// Wire metadata fields never copied into local domain fields.
const SKIPPED_FIELDS: [&str; 5] = ["id", "created_at", "createdAt", "updated_at", "updatedAt"];

/// Counters for one pull cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullOutcome {
    /// Stanza entries processed, including conflicts resolved to
    /// keep-local.
    pub pulled: usize,
}

/// Applies server-side changes to the local store.
#[derive(Clone)]
pub struct PullPipeline {
    store: Arc<dyn LocalStore>,
    scratch: Arc<dyn ScratchStore>,
    transport: Arc<dyn SyncTransport>,
    resolver: ConflictResolver,
    tables: Vec<String>,
    debug: bool,
}

impl PullPipeline {
    /// Creates a pipeline pulling the given tables.
    pub fn new(
        store: Arc<dyn LocalStore>,
        scratch: Arc<dyn ScratchStore>,
        transport: Arc<dyn SyncTransport>,
        resolver: ConflictResolver,
        tables: Vec<String>,
        debug: bool,
    ) -> Self {
        PullPipeline {
            store,
            scratch,
            transport,
            resolver,
            tables,
            debug,
        }
    }

    /// Pulls and applies everything past the watermark.
    ///
    /// Transport and transaction failures propagate; per-record failures
    /// are logged and skipped.
    pub async fn pull(&self) -> SyncResult<PullOutcome> {
        let since = self.read_watermark().await;

        let request = PullRequest {
            last_sync_at: since,
            tables: self.tables.clone(),
        };
        let response = self.transport.pull(&request).await?;

        info!(
            since = ?since,
            timestamp = response.timestamp,
            tables = response.changes.len(),
            "Applying pulled changes"
        );

        let mut outcome = PullOutcome::default();
        let mut txn = self.store.begin().await?;

        for (table, changes) in &response.changes {
            self.apply_table(txn.as_mut(), table, changes, &mut outcome)
                .await;
        }

        txn.commit().await?;

        self.write_watermark(response.timestamp).await;

        info!(pulled = outcome.pulled, "Pull cycle complete");
        Ok(outcome)
    }

    /// Applies one table's stanzas in created → updated → deleted order.
    async fn apply_table(
        &self,
        txn: &mut (dyn StoreTransaction + Send),
        table: &str,
        changes: &TableChanges,
        outcome: &mut PullOutcome,
    ) {
        for server_record in &changes.created {
            match self.apply_created(txn, table, server_record).await {
                Ok(()) => outcome.pulled += 1,
                Err(e) => warn!(table, error = %e, "Skipping pulled create"),
            }
        }

        for server_record in &changes.updated {
            match self.apply_updated(txn, table, server_record).await {
                Ok(()) => outcome.pulled += 1,
                Err(e) => warn!(table, error = %e, "Skipping pulled update"),
            }
        }

        for server_id in &changes.deleted {
            match self.apply_deleted(txn, table, server_id).await {
                Ok(()) => outcome.pulled += 1,
                Err(e) => {
                    warn!(table, server_id = %server_id, error = %e, "Skipping pulled delete")
                }
            }
        }
    }

    /// Applies one "created" entry. A server id we already track falls
    /// through to the update path instead of duplicating the row.
    async fn apply_created(
        &self,
        txn: &mut (dyn StoreTransaction + Send),
        table: &str,
        server_record: &Document,
    ) -> SyncResult<()> {
        let server_id = server_record_id(server_record)
            .ok_or_else(|| SyncError::Transport("pulled record carries no id".into()))?;

        // The record may already exist locally (a previous pull, or our own
        // pushed create echoed back): treat it as an update.
        if !txn.find_by_server_id(table, server_id).await?.is_empty() {
            return self.apply_updated(txn, table, server_record).await;
        }

        let local_id = Uuid::new_v4().to_string();
        let mut doc = Document::new();
        doc.insert("id".into(), Value::from(local_id.clone()));
        copy_domain_fields(&mut doc, server_record);
        record::set_synced(&mut doc, Some(server_id), server_record_updated_at(server_record));

        txn.insert(table, &local_id, doc).await?;

        if self.debug {
            debug!(table, server_id, local_id = %local_id, "Created local record from pull");
        }
        Ok(())
    }

    /// Applies one "updated" entry.
    async fn apply_updated(
        &self,
        txn: &mut (dyn StoreTransaction + Send),
        table: &str,
        server_record: &Document,
    ) -> SyncResult<()> {
        let server_id = server_record_id(server_record)
            .ok_or_else(|| SyncError::Transport("pulled record carries no id".into()))?;
        let server_updated_at = server_record_updated_at(server_record);

        let locals = txn.find_by_server_id(table, server_id).await?;
        let Some(local) = locals.into_iter().next() else {
            // Never seen this record: fall back to creation.
            let local_id = Uuid::new_v4().to_string();
            let mut doc = Document::new();
            doc.insert("id".into(), Value::from(local_id.clone()));
            copy_domain_fields(&mut doc, server_record);
            record::set_synced(&mut doc, Some(server_id), server_updated_at);
            txn.insert(table, &local_id, doc).await?;
            return Ok(());
        };

        let local_id = local_row_id(&local)?;

        let in_conflict = record::sync_status(&local) == Some(record::SyncStatus::Pending)
            && record::server_updated_at(&local).is_some()
            && matches!(
                (server_updated_at, record::server_updated_at(&local)),
                (Some(server), Some(seen)) if server > seen
            );

        if !in_conflict {
            let mut doc = local.clone();
            copy_domain_fields(&mut doc, server_record);
            record::set_synced(&mut doc, Some(server_id), server_updated_at);
            txn.update(table, &local_id, doc).await?;
            return Ok(());
        }

        let context = ConflictContext {
            table: table.to_string(),
            record_id: local_id.clone(),
            local_data: local.clone(),
            server_data: fields::document_to_snake_case(server_record),
            local_updated_at: record::local_updated_at(&local),
            server_updated_at,
        };

        match self.resolver.resolve(&context) {
            Resolution::KeepLocal => {
                debug!(table, server_id, "Conflict resolved: keeping local");
            }
            Resolution::AcceptServer => {
                debug!(table, server_id, "Conflict resolved: accepting server");
                let mut doc = local.clone();
                copy_domain_fields(&mut doc, server_record);
                record::set_synced(&mut doc, Some(server_id), server_updated_at);
                txn.update(table, &local_id, doc).await?;
            }
            Resolution::Merged(merged) => {
                debug!(table, server_id, "Conflict resolved: merged");
                let mut doc = local.clone();
                for (key, value) in &merged {
                    if !SKIPPED_FIELDS.contains(&key.as_str()) {
                        doc.insert(fields::to_snake_case(key), value.clone());
                    }
                }
                record::set_synced(&mut doc, Some(server_id), server_updated_at);
                txn.update(table, &local_id, doc).await?;
            }
        }

        Ok(())
    }

    /// Soft-deletes every local row carrying the server id. Absence is
    /// not an error.
    async fn apply_deleted(
        &self,
        txn: &mut (dyn StoreTransaction + Send),
        table: &str,
        server_id: &str,
    ) -> SyncResult<()> {
        let locals = txn.find_by_server_id(table, server_id).await?;
        if locals.is_empty() {
            debug!(table, server_id, "Pulled delete for unknown record");
            return Ok(());
        }

        let deleted_at = now_ms();
        for local in locals {
            let local_id = local_row_id(&local)?;
            txn.mark_deleted(table, &local_id, deleted_at).await?;
        }
        Ok(())
    }

    /// Reads the watermark; any failure degrades to "never pulled".
    async fn read_watermark(&self) -> Option<i64> {
        match self.scratch.get(WATERMARK_KEY).await {
            Ok(Some(raw)) => match raw.parse::<i64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(raw = %raw, "Unparseable watermark, treating as first sync");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Watermark read failed, treating as first sync");
                None
            }
        }
    }

    /// Persists the watermark; failure costs a redundant pull, nothing more.
    async fn write_watermark(&self, timestamp: i64) {
        if let Err(e) = self
            .scratch
            .set(WATERMARK_KEY, &timestamp.to_string())
            .await
        {
            warn!(error = %e, timestamp, "Failed to persist watermark");
        }
    }
}

/// Copies the server record's domain fields over `doc`, mapping wire
/// spelling to local spelling and skipping wire metadata.
fn copy_domain_fields(doc: &mut Document, server_record: &Document) {
    for (key, value) in server_record {
        if SKIPPED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        doc.insert(fields::to_snake_case(key), value.clone());
    }
}

/// Local rows are addressed by an `id` field; a row without one is
/// unaddressable and treated as a per-record failure.
fn local_row_id(doc: &Document) -> SyncResult<String> {
    doc.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            SyncError::Store(harbor_store::StoreError::Backend(
                "local row carries no id field".into(),
            ))
        })
}
