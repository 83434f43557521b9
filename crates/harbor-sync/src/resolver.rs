//! Conflict resolution.
//!
//! A conflict exists when a pull update arrives for a record that has
//! unpushed local edits and the server has moved past the version the
//! local side last saw. The resolver is a pure decision: keep the local
//! version, accept the server version, or substitute a merged document.

use std::sync::Arc;

use harbor_core::Document;

use crate::config::ConflictStrategy;
use crate::error::{SyncError, SyncResult};

/// Everything a resolver may consult about one conflict.
#[derive(Debug, Clone)]
pub struct ConflictContext {
    /// Table the record lives in.
    pub table: String,
    /// Local id of the conflicted record.
    pub record_id: String,
    /// The local document, including unpushed edits.
    pub local_data: Document,
    /// The server document, in local field spelling.
    pub server_data: Document,
    /// Local record's own wall clock (ms), if it carries one.
    pub local_updated_at: Option<i64>,
    /// Server wall clock (ms) of the incoming version.
    pub server_updated_at: Option<i64>,
}

/// A resolver's verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Keep the local version; the pending push will overwrite the server.
    KeepLocal,
    /// Overwrite local with the server version.
    AcceptServer,
    /// Overwrite local with this document (server metadata still applies).
    Merged(Document),
}

/// Caller-supplied resolution function for [`ConflictStrategy::Custom`].
pub type CustomResolverFn = Arc<dyn Fn(&ConflictContext) -> Resolution + Send + Sync>;

/// Pluggable conflict policy.
#[derive(Clone)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
    custom: Option<CustomResolverFn>,
}

impl ConflictResolver {
    /// Builds a resolver for the configured strategy.
    ///
    /// Fails with `InvalidConfig` when `custom` is selected without a
    /// function.
    pub fn from_config(
        strategy: ConflictStrategy,
        custom: Option<CustomResolverFn>,
    ) -> SyncResult<Self> {
        if strategy == ConflictStrategy::Custom && custom.is_none() {
            return Err(SyncError::InvalidConfig(
                "conflict_strategy is 'custom' but no custom resolver was supplied".into(),
            ));
        }
        Ok(ConflictResolver { strategy, custom })
    }

    /// The configured strategy.
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Decides the conflict.
    pub fn resolve(&self, context: &ConflictContext) -> Resolution {
        match self.strategy {
            ConflictStrategy::LastWriteWins => {
                let local = context.local_updated_at.unwrap_or(0);
                let server = context.server_updated_at.unwrap_or(0);
                if local > server {
                    Resolution::KeepLocal
                } else {
                    Resolution::AcceptServer
                }
            }
            ConflictStrategy::ServerWins => Resolution::AcceptServer,
            ConflictStrategy::ClientWins => Resolution::KeepLocal,
            ConflictStrategy::Custom => {
                // from_config guarantees the function is present
                let custom = self
                    .custom
                    .as_ref()
                    .expect("custom strategy validated at construction");
                custom(context)
            }
        }
    }
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("strategy", &self.strategy)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}
