//! # harbor-core: Domain Types for Harbor
//!
//! Core types shared by the Harbor sync engine and its storage layer:
//!
//! - [`Document`] - a schemaless record (field name → JSON value)
//! - [`Operation`] - the mutation kinds the engine propagates
//! - [`QueueItem`] - one durable entry in the sync queue
//! - [`record`] - sync-metadata accessors over documents
//! - [`fields`] - wire ↔ local field-name mapping
//!
//! ## Record Identity
//! Every synced record has two identifiers:
//! - a local id, assigned by the application when the record is created
//!   locally (or by the pull pipeline when the record arrives from the
//!   server), used for all local lookups;
//! - a `server_id`, assigned by the server on first successful push and
//!   carried in the record's sync metadata thereafter.

pub mod fields;
pub mod record;
pub mod types;

pub use record::{SyncStatus, DELETED_AT, LAST_SYNC_ERROR, SERVER_ID, SERVER_UPDATED_AT, SYNC_STATUS};
pub use types::{now_ms, Document, Operation, QueueItem};
