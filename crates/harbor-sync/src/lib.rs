//! # harbor-sync: Offline-First Record Synchronization
//!
//! Harbor reconciles a local document store with an authoritative remote
//! service. Applications mutate records locally with immediate success; the
//! engine propagates those mutations to the server in the background and
//! applies server-originated changes back to the local store, across
//! network failure, concurrent edits, and process restarts.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Harbor Sync Engine                               │
//! │                                                                         │
//! │  Application writes                                                     │
//! │       │  (record write + enqueue, one transaction)                      │
//! │       ▼                                                                 │
//! │  ┌────────────┐    drain     ┌──────────────┐    HTTP-style            │
//! │  │ SyncQueue  │ ───────────► │ PushPipeline │ ───────────────► Server  │
//! │  │ (durable)  │ ◄─────────── │              │ ◄───────────────         │
//! │  └────────────┘   ack/bump   └──────────────┘    per-item acks         │
//! │                                                                         │
//! │  ┌────────────┐   watermark  ┌──────────────┐    changes since         │
//! │  │ScratchStore│ ◄──────────► │ PullPipeline │ ───────────────► Server  │
//! │  └────────────┘              │  + resolver  │ ◄───────────────         │
//! │                              └──────────────┘  created/updated/deleted │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                        SyncEngine                                │  │
//! │  │                                                                  │  │
//! │  │  • at-most-one-sync guard, push-then-pull ordering               │  │
//! │  │  • background ticker, reconnect trigger (NetworkMonitor)         │  │
//! │  │  • observable EngineState with isolated listeners                │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use harbor_sync::{SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::builder(SyncConfig::default())
//!     .with_store(store)
//!     .with_scratch(scratch)
//!     .with_transport(transport)
//!     .with_reachability(reachability)
//!     .with_tables(["posts", "comments"])
//!     .build()?;
//!
//! engine.initialize().await?;
//!
//! // mutate locally, sync later
//! engine.queue_operation(Operation::Create, "posts", &post_id, fields).await?;
//! let report = engine.sync().await;
//! println!("pushed {} pulled {}", report.stats.pushed, report.stats.pulled);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod listeners;
pub mod monitor;
pub mod protocol;
pub mod pull;
pub mod push;
pub mod queue;
pub mod resolver;
pub mod retry;
pub mod transport;

// Core types
pub use config::{ConflictStrategy, SyncConfig};
pub use engine::{EngineState, EngineStatus, SyncEngine, SyncEngineBuilder, SyncReport, SyncStats};
pub use error::{SyncError, SyncResult};
pub use listeners::Subscription;

// Pipelines and queue
pub use pull::{PullOutcome, PullPipeline, WATERMARK_KEY};
pub use push::{PushOutcome, PushPipeline};
pub use queue::{SyncQueue, SYNC_QUEUE_TABLE};
pub use retry::RetryPolicy;

// Conflict resolution
pub use resolver::{ConflictContext, ConflictResolver, CustomResolverFn, Resolution};

// Network
pub use monitor::{
    MockReachability, NetworkMonitor, NetworkStatus, Reachability, ReachabilitySource,
};
pub use transport::{MockTransport, SyncTransport};

// Wire types
pub use protocol::{
    PullRequest, PullResponse, PushChange, PushItemResult, PushRequest, PushResponse, TableChanges,
};

// Re-exported domain types
pub use harbor_core::{Document, Operation, QueueItem};
