//! Store error types.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by local-store and scratch-store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found in the given table.
    #[error("{table}/{id} not found")]
    NotFound {
        /// Table that was searched.
        table: String,
        /// Row id that was missing.
        id: String,
    },

    /// A row with that id already exists.
    #[error("duplicate id in {table}: '{id}'")]
    Duplicate {
        /// Table the insert targeted.
        table: String,
        /// Conflicting row id.
        id: String,
    },

    /// The transaction was already committed or rolled back.
    #[error("transaction is closed")]
    TransactionClosed,

    /// A stored document could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure (connection, I/O, corruption).
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a `NotFound` error.
    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Creates a `Duplicate` error.
    pub fn duplicate(table: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::Duplicate {
            table: table.into(),
            id: id.into(),
        }
    }

    /// True if the error is a missing-row lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
