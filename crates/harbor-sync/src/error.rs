//! Sync error types.

use harbor_store::StoreError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all engine failures.
///
/// ## Design Principles
/// - Guard failures (`Offline`, `AlreadyInProgress`) are surfaced in the
///   sync report, never thrown past the orchestrator.
/// - Transport and store failures carry enough context for the failed-items
///   queue and the engine error state.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Guard Errors (non-fatal, surfaced in the report)
    // =========================================================================
    /// Sync was invoked while the device is offline.
    #[error("device is offline")]
    Offline,

    /// A sync attempt is already running.
    #[error("sync already in progress")]
    AlreadyInProgress,

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("invalid sync configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The push or pull transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    // =========================================================================
    // Local Store Errors
    // =========================================================================
    /// A local-store operation failed.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    /// A queue row to ack or bump no longer exists.
    #[error("queue item not found: {id}")]
    QueueItemNotFound {
        /// Id of the missing queue row.
        id: String,
    },

    /// The pull watermark could not be read or written.
    #[error("watermark error: {0}")]
    Watermark(String),

    // =========================================================================
    // Data Errors
    // =========================================================================
    /// A document or wire payload could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// True if a later sync attempt may succeed without operator action.
    ///
    /// Guard failures clear themselves (connectivity returns, the running
    /// sync finishes); transport, store, and watermark failures are
    /// environmental.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::InvalidConfig(_))
    }

    /// True if the error should move the engine into the `Error` state.
    ///
    /// Guard failures are reported to the caller but leave the engine state
    /// untouched.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::Offline | SyncError::AlreadyInProgress)
    }
}
