//! Engine configuration.
//!
//! ## Configuration Options
//! ```text
//! ┌──────────────────────────┬───────────────┬──────────────────────────────────┐
//! │ Option                   │ Default       │ Effect                           │
//! ├──────────────────────────┼───────────────┼──────────────────────────────────┤
//! │ conflict_strategy        │ last-write-wins│ resolver variant                │
//! │ sync_interval_ms         │ 300 000       │ background ticker period         │
//! │ max_retries              │ 3             │ queue item dead at this count    │
//! │ retry_delay_base_ms      │ 1 000         │ base for exponential backoff     │
//! │ enable_background_sync   │ true          │ start/stop the ticker            │
//! │ sync_on_reconnect        │ true          │ sync on offline → online         │
//! │ push_batch_size          │ 50            │ max items per push request       │
//! │ debug                    │ false         │ verbose per-item diagnostics     │
//! └──────────────────────────┴───────────────┴──────────────────────────────────┘
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

// =============================================================================
// Conflict Strategy
// =============================================================================

/// Policy applied when a pull update collides with unpushed local edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Compare wall clocks; the newer side wins.
    #[default]
    LastWriteWins,

    /// The server version always wins.
    ServerWins,

    /// The local version always wins.
    ClientWins,

    /// Delegate to a caller-supplied function.
    Custom,
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictStrategy::LastWriteWins => write!(f, "last-write-wins"),
            ConflictStrategy::ServerWins => write!(f, "server-wins"),
            ConflictStrategy::ClientWins => write!(f, "client-wins"),
            ConflictStrategy::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for ConflictStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "last-write-wins" | "lww" => Ok(ConflictStrategy::LastWriteWins),
            "server-wins" | "server" => Ok(ConflictStrategy::ServerWins),
            "client-wins" | "client" | "local" => Ok(ConflictStrategy::ClientWins),
            "custom" => Ok(ConflictStrategy::Custom),
            other => Err(SyncError::InvalidConfig(format!(
                "unknown conflict strategy: '{}'. Valid options: last-write-wins, server-wins, client-wins, custom",
                other
            ))),
        }
    }
}

// =============================================================================
// Sync Configuration
// =============================================================================

/// Engine behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Conflict resolution policy.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,

    /// Background ticker period (milliseconds).
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// Push attempts before a queue item is declared dead.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay (milliseconds) for exponential retry backoff.
    #[serde(default = "default_retry_delay_base_ms")]
    pub retry_delay_base_ms: u64,

    /// Whether the background ticker runs.
    #[serde(default = "default_true")]
    pub enable_background_sync: bool,

    /// Whether a reconnect triggers an immediate sync.
    #[serde(default = "default_true")]
    pub sync_on_reconnect: bool,

    /// Maximum queue items per push request.
    #[serde(default = "default_push_batch_size")]
    pub push_batch_size: usize,

    /// Verbose per-item diagnostics.
    #[serde(default)]
    pub debug: bool,
}

fn default_sync_interval_ms() -> u64 {
    300_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_base_ms() -> u64 {
    1_000
}

fn default_push_batch_size() -> usize {
    50
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            conflict_strategy: ConflictStrategy::default(),
            sync_interval_ms: default_sync_interval_ms(),
            max_retries: default_max_retries(),
            retry_delay_base_ms: default_retry_delay_base_ms(),
            enable_background_sync: true,
            sync_on_reconnect: true,
            push_batch_size: default_push_batch_size(),
            debug: false,
        }
    }
}

impl SyncConfig {
    /// The ticker period as a [`Duration`].
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Rejects configurations that cannot work at all.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.push_batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "push_batch_size must be at least 1".into(),
            ));
        }
        if self.sync_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "sync_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
