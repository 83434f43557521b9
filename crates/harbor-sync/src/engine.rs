//! # Sync Engine
//!
//! Orchestrates the push and pull pipelines behind a single state machine.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SyncEngine                                      │
//! │                                                                         │
//! │  sync() ──► at-most-one-sync guard ──► reachability guard              │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │            PushPipeline.push()  ──then──  PullPipeline.pull()          │
//! │            (push failure skips pull and records Error)                 │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │            refresh pending_changes, publish state to observers         │
//! │                                                                         │
//! │  STATE MACHINE                                                         │
//! │  ─────────────                                                         │
//! │  idle ──sync()──► syncing ──ok──► idle (last_sync_at set, error cleared)│
//! │                      │                                                  │
//! │                      └──fail──► error ──next sync()──► syncing         │
//! │                                                                         │
//! │  BACKGROUND WORK                                                       │
//! │  ───────────────                                                       │
//! │  • ticker: every sync_interval_ms, sync iff online and not syncing     │
//! │  • reconnect: network monitor transition to connected triggers one     │
//! │    sync when none is running                                           │
//! │  • shutdown stops both; an in-flight sync finishes on its own terms    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use chrono::{DateTime, Utc};
use harbor_core::{Document, Operation, QueueItem};
use harbor_store::{LocalStore, ScratchStore};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::listeners::{Listeners, Subscription};
use crate::monitor::{NetworkMonitor, ReachabilitySource};
use crate::pull::{PullOutcome, PullPipeline};
use crate::push::{PushOutcome, PushPipeline};
use crate::queue::SyncQueue;
use crate::resolver::{ConflictResolver, CustomResolverFn};
use crate::retry::RetryPolicy;
use crate::transport::SyncTransport;

// =============================================================================
// Engine State
// =============================================================================

/// Coarse engine status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// No sync running; the last attempt (if any) succeeded.
    Idle,
    /// A sync attempt is running.
    Syncing,
    /// The last attempt failed; cleared by the next successful sync.
    Error,
}

/// Observable engine state. Observers always receive a defensive copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineState {
    /// Coarse status.
    pub status: EngineStatus,
    /// Completion time of the last fully-successful sync.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Current queue length, pending and dead items together.
    pub pending_changes: i64,
    /// Fatal error of the most recent attempt, if it failed.
    pub error: Option<String>,
    /// True between sync start and finish.
    pub is_syncing: bool,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState {
            status: EngineStatus::Idle,
            last_sync_at: None,
            pending_changes: 0,
            error: None,
            is_syncing: false,
        }
    }
}

// =============================================================================
// Sync Report
// =============================================================================

/// Counters for one sync attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Queue items acknowledged and drained.
    pub pushed: usize,
    /// Pull stanza entries applied (including keep-local verdicts).
    pub pulled: usize,
    /// Queue items that failed this attempt.
    pub failed: usize,
    /// Wall-clock duration of the whole attempt, failures included.
    pub duration_ms: u64,
}

/// Outcome of one `sync()` call. Never raised as an error.
#[derive(Debug)]
pub struct SyncReport {
    /// True iff push and pull both completed.
    pub success: bool,
    /// Attempt counters.
    pub stats: SyncStats,
    /// The failure, when `success` is false.
    pub error: Option<SyncError>,
}

impl SyncReport {
    fn success(stats: SyncStats) -> Self {
        SyncReport {
            success: true,
            stats,
            error: None,
        }
    }

    fn failure(error: SyncError, stats: SyncStats) -> Self {
        SyncReport {
            success: false,
            stats,
            error: Some(error),
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

struct EngineInner {
    config: SyncConfig,
    queue: SyncQueue,
    push: PushPipeline,
    pull: PullPipeline,
    monitor: NetworkMonitor,
    retry: RetryPolicy,
    state: RwLock<EngineState>,
    listeners: Listeners<EngineState>,
    is_syncing: AtomicBool,
    ticker_shutdown: Mutex<Option<mpsc::Sender<()>>>,
    reconnect_shutdown: Mutex<Option<mpsc::Sender<()>>>,
    monitor_subscription: Mutex<Option<Subscription>>,
}

/// The sync orchestrator. Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Starts building an engine.
    pub fn builder(config: SyncConfig) -> SyncEngineBuilder {
        SyncEngineBuilder::new(config)
    }

    /// Initializes the network monitor and starts background work.
    ///
    /// Spawns the ticker when `enable_background_sync` is set and the
    /// reconnect trigger when `sync_on_reconnect` is set.
    pub async fn initialize(&self) -> SyncResult<()> {
        self.inner.config.validate()?;
        self.inner.monitor.initialize().await;

        let pending = self.inner.queue.count_all().await;
        self.publish(|state| state.pending_changes = pending);

        if self.inner.config.enable_background_sync {
            self.spawn_ticker();
        }
        if self.inner.config.sync_on_reconnect {
            self.spawn_reconnect_trigger();
        }

        info!(
            background = self.inner.config.enable_background_sync,
            on_reconnect = self.inner.config.sync_on_reconnect,
            "Sync engine initialized"
        );
        Ok(())
    }

    /// Stops background work and the network monitor.
    ///
    /// Does not interrupt an in-flight sync; it completes or fails on its
    /// own terms.
    pub async fn shutdown(&self) {
        info!("Shutting down sync engine");

        let ticker = self.inner.ticker_shutdown.lock().take();
        if let Some(tx) = ticker {
            let _ = tx.send(()).await;
        }

        let reconnect = self.inner.reconnect_shutdown.lock().take();
        if let Some(tx) = reconnect {
            let _ = tx.send(()).await;
        }

        let subscription = self.inner.monitor_subscription.lock().take();
        if let Some(subscription) = subscription {
            self.inner.monitor.unsubscribe(subscription);
        }

        self.inner.monitor.shutdown();
    }

    /// Runs one sync attempt: push, then pull.
    ///
    /// Never panics out and never returns `Err`; every failure is folded
    /// into the report. Guard failures (`AlreadyInProgress`, `Offline`)
    /// leave the engine state untouched.
    pub async fn sync(&self) -> SyncReport {
        let started = Instant::now();

        if self
            .inner
            .is_syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self
                .finish_failure(
                    SyncError::AlreadyInProgress,
                    started,
                    PushOutcome::default(),
                    PullOutcome::default(),
                )
                .await;
        }

        let report = self.run_attempt(started).await;
        self.inner.is_syncing.store(false, Ordering::SeqCst);
        report
    }

    async fn run_attempt(&self, started: Instant) -> SyncReport {
        if !self.inner.monitor.is_online() {
            return self
                .finish_failure(
                    SyncError::Offline,
                    started,
                    PushOutcome::default(),
                    PullOutcome::default(),
                )
                .await;
        }

        info!("Sync started");
        self.publish(|state| {
            state.status = EngineStatus::Syncing;
            state.is_syncing = true;
        });

        let push = match self.inner.push.push().await {
            Ok(outcome) => outcome,
            Err(e) => {
                return self
                    .finish_failure(e, started, PushOutcome::default(), PullOutcome::default())
                    .await;
            }
        };

        let pull = match self.inner.pull.pull().await {
            Ok(outcome) => outcome,
            Err(e) => {
                return self
                    .finish_failure(e, started, push, PullOutcome::default())
                    .await;
            }
        };

        let pending = self.inner.queue.count_all().await;
        let finished_at = Utc::now();
        self.publish(|state| {
            state.status = EngineStatus::Idle;
            state.is_syncing = false;
            state.last_sync_at = Some(finished_at);
            state.error = None;
            state.pending_changes = pending;
        });

        let stats = SyncStats {
            pushed: push.pushed,
            pulled: pull.pulled,
            failed: push.failed,
            duration_ms: duration_ms(started),
        };
        info!(
            pushed = stats.pushed,
            pulled = stats.pulled,
            failed = stats.failed,
            duration_ms = stats.duration_ms,
            "Sync finished"
        );
        SyncReport::success(stats)
    }

    /// Folds a failed attempt into the report.
    ///
    /// Fatal errors move the engine into the `Error` state; guard
    /// rejections (`Offline`, `AlreadyInProgress`) are surfaced in the
    /// report only and leave the engine state untouched.
    async fn finish_failure(
        &self,
        error: SyncError,
        started: Instant,
        push: PushOutcome,
        pull: PullOutcome,
    ) -> SyncReport {
        if error.is_fatal() {
            warn!(error = %error, "Sync failed");

            let pending = self.inner.queue.count_all().await;
            let message = error.to_string();
            self.publish(|state| {
                state.status = EngineStatus::Error;
                state.is_syncing = false;
                state.error = Some(message.clone());
                state.pending_changes = pending;
            });
        } else {
            debug!(error = %error, "Sync attempt rejected");
        }

        SyncReport::failure(
            error,
            SyncStats {
                pushed: push.pushed,
                pulled: pull.pulled,
                failed: push.failed,
                duration_ms: duration_ms(started),
            },
        )
    }

    /// Enqueues a local mutation and refreshes `pending_changes`.
    ///
    /// Errors propagate: the caller must know the mutation was not
    /// recorded. For enqueue-atomic-with-write, use
    /// [`queue()`](Self::queue) and [`SyncQueue::enqueue_in`].
    pub async fn queue_operation(
        &self,
        operation: Operation,
        table_name: &str,
        record_id: &str,
        payload: Document,
    ) -> SyncResult<QueueItem> {
        let item = self
            .inner
            .queue
            .enqueue(operation, table_name, record_id, payload)
            .await?;

        let pending = self.inner.queue.count_all().await;
        self.publish(|state| state.pending_changes = pending);

        Ok(item)
    }

    /// The underlying queue, for transactional enqueue alongside record
    /// writes.
    pub fn queue(&self) -> &SyncQueue {
        &self.inner.queue
    }

    /// Dead queue items awaiting operator attention.
    pub async fn failed_items(&self) -> SyncResult<Vec<QueueItem>> {
        self.inner.queue.failed(self.inner.config.max_retries).await
    }

    /// Deletes dead queue items; returns how many were removed.
    pub async fn purge_failed(&self) -> SyncResult<usize> {
        let purged = self
            .inner
            .queue
            .purge_failed(self.inner.config.max_retries)
            .await?;
        let pending = self.inner.queue.count_all().await;
        self.publish(|state| state.pending_changes = pending);
        Ok(purged)
    }

    /// Deletes every queue row; returns how many were removed.
    pub async fn purge_all(&self) -> SyncResult<usize> {
        let purged = self.inner.queue.purge_all().await?;
        let pending = self.inner.queue.count_all().await;
        self.publish(|state| state.pending_changes = pending);
        Ok(purged)
    }

    /// A defensive copy of the current engine state.
    pub fn state(&self) -> EngineState {
        self.inner.state.read().clone()
    }

    /// True while a sync attempt is running.
    pub fn is_syncing(&self) -> bool {
        self.inner.is_syncing.load(Ordering::SeqCst)
    }

    /// Synchronous online check via the network monitor.
    pub fn is_online(&self) -> bool {
        self.inner.monitor.is_online()
    }

    /// The backoff policy governing push re-sends.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// Registers an observer for engine-state changes.
    pub fn subscribe(
        &self,
        listener: impl Fn(&EngineState) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.listeners.subscribe(listener)
    }

    /// Removes an observer.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.inner.listeners.unsubscribe(subscription);
    }

    /// Mutates the state under the lock, then notifies observers with a
    /// defensive copy.
    fn publish<F: FnOnce(&mut EngineState)>(&self, mutate: F) {
        let snapshot = {
            let mut state = self.inner.state.write();
            mutate(&mut state);
            state.clone()
        };
        self.inner.listeners.notify(&snapshot);
    }

    /// Spawns the background ticker.
    fn spawn_ticker(&self) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.inner.ticker_shutdown.lock() = Some(shutdown_tx);

        let engine = self.clone();
        tokio::spawn(async move {
            let period = engine.inner.config.sync_interval();
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!(period_ms = engine.inner.config.sync_interval_ms, "Ticker started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if engine.is_online() && !engine.is_syncing() {
                            let report = engine.sync().await;
                            if let Some(error) = report.error {
                                debug!(error = %error, "Background sync failed");
                            }
                        } else {
                            debug!("Tick skipped: offline or already syncing");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Ticker stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Subscribes to the network monitor and syncs on reconnect.
    fn spawn_reconnect_trigger(&self) {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.inner.reconnect_shutdown.lock() = Some(shutdown_tx);

        // The listener only raises a flag; the spawned task does the work.
        // A transition that arrives mid-sync is dropped on purpose.
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let subscription = self.inner.monitor.subscribe(move |status| {
            let Some(inner) = weak.upgrade() else { return };
            if status.is_connected && !inner.is_syncing.load(Ordering::SeqCst) {
                let _ = trigger_tx.try_send(());
            }
        });
        *self.inner.monitor_subscription.lock() = Some(subscription);

        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = trigger_rx.recv() => {
                        if received.is_none() {
                            break;
                        }
                        info!("Reconnected, starting sync");
                        let report = engine.sync().await;
                        if let Some(error) = report.error {
                            debug!(error = %error, "Reconnect sync failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Reconnect trigger stopped");
                        break;
                    }
                }
            }
        });
    }
}

fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// =============================================================================
// Builder
// =============================================================================

/// Wires an engine from its collaborators.
pub struct SyncEngineBuilder {
    config: SyncConfig,
    store: Option<Arc<dyn LocalStore>>,
    scratch: Option<Arc<dyn ScratchStore>>,
    transport: Option<Arc<dyn SyncTransport>>,
    reachability: Option<Arc<dyn ReachabilitySource>>,
    tables: Vec<String>,
    custom_resolver: Option<CustomResolverFn>,
}

impl SyncEngineBuilder {
    /// Creates a builder with the given config.
    pub fn new(config: SyncConfig) -> Self {
        SyncEngineBuilder {
            config,
            store: None,
            scratch: None,
            transport: None,
            reachability: None,
            tables: Vec::new(),
            custom_resolver: None,
        }
    }

    /// Sets the local record store.
    pub fn with_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the scratch store holding the pull watermark.
    pub fn with_scratch(mut self, scratch: Arc<dyn ScratchStore>) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Sets the server transport.
    pub fn with_transport(mut self, transport: Arc<dyn SyncTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the platform reachability source.
    pub fn with_reachability(mut self, source: Arc<dyn ReachabilitySource>) -> Self {
        self.reachability = Some(source);
        self
    }

    /// Sets the tables the pull pipeline requests.
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Supplies the resolution function for the `custom` strategy.
    pub fn with_custom_resolver(mut self, resolver: CustomResolverFn) -> Self {
        self.custom_resolver = Some(resolver);
        self
    }

    /// Builds the engine.
    pub fn build(self) -> SyncResult<SyncEngine> {
        self.config.validate()?;

        let store = self
            .store
            .ok_or_else(|| SyncError::InvalidConfig("local store is required".into()))?;
        let scratch = self
            .scratch
            .ok_or_else(|| SyncError::InvalidConfig("scratch store is required".into()))?;
        let transport = self
            .transport
            .ok_or_else(|| SyncError::InvalidConfig("transport is required".into()))?;
        let reachability = self
            .reachability
            .ok_or_else(|| SyncError::InvalidConfig("reachability source is required".into()))?;

        let resolver =
            ConflictResolver::from_config(self.config.conflict_strategy, self.custom_resolver)?;

        let queue = SyncQueue::new(store.clone());
        let push = PushPipeline::new(store.clone(), queue.clone(), transport.clone(), &self.config);
        let pull = PullPipeline::new(
            store,
            scratch,
            transport,
            resolver,
            self.tables,
            self.config.debug,
        );
        let monitor = NetworkMonitor::new(reachability);
        let retry = RetryPolicy::new(self.config.retry_delay_base_ms, self.config.max_retries);

        Ok(SyncEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                queue,
                push,
                pull,
                monitor,
                retry,
                state: RwLock::new(EngineState::default()),
                listeners: Listeners::new(),
                is_syncing: AtomicBool::new(false),
                ticker_shutdown: Mutex::new(None),
                reconnect_shutdown: Mutex::new(None),
                monitor_subscription: Mutex::new(None),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use harbor_store::{MemoryScratch, MemoryStore};

    use crate::config::ConflictStrategy;
    use crate::monitor::{MockReachability, NetworkStatus};
    use crate::protocol::PullResponse;
    use crate::transport::MockTransport;

    struct Rig {
        transport: Arc<MockTransport>,
        engine: SyncEngine,
    }

    fn rig_with(config: SyncConfig, initial: NetworkStatus) -> Rig {
        let transport = Arc::new(MockTransport::new());
        let reachability = Arc::new(MockReachability::new(initial));
        let engine = SyncEngine::builder(config)
            .with_store(Arc::new(MemoryStore::new()))
            .with_scratch(Arc::new(MemoryScratch::new()))
            .with_transport(transport.clone())
            .with_reachability(reachability)
            .with_tables(["posts"])
            .build()
            .unwrap();
        Rig { transport, engine }
    }

    fn quiet_config() -> SyncConfig {
        SyncConfig {
            enable_background_sync: false,
            sync_on_reconnect: false,
            ..Default::default()
        }
    }

    fn empty_pull(timestamp: i64) -> PullResponse {
        PullResponse {
            timestamp,
            changes: Default::default(),
        }
    }

    #[tokio::test]
    async fn sync_while_offline_touches_nothing() {
        let r = rig_with(quiet_config(), NetworkStatus::offline());
        r.engine.initialize().await.unwrap();

        let report = r.engine.sync().await;
        assert!(!report.success);
        assert!(matches!(report.error, Some(SyncError::Offline)));
        assert_eq!(r.transport.push_calls(), 0);
        assert_eq!(r.transport.pull_calls(), 0);

        let state = r.engine.state();
        assert_eq!(state.status, EngineStatus::Idle);
        assert!(state.error.is_none());

        r.engine.shutdown().await;
    }

    #[tokio::test]
    async fn successful_sync_reaches_idle_with_timestamp() {
        let r = rig_with(quiet_config(), NetworkStatus::online());
        r.engine.initialize().await.unwrap();
        r.transport.enqueue_pull_response(empty_pull(1700));

        let report = r.engine.sync().await;
        assert!(report.success);
        assert_eq!(report.stats.pushed, 0);
        assert_eq!(report.stats.pulled, 0);

        let state = r.engine.state();
        assert_eq!(state.status, EngineStatus::Idle);
        assert!(state.last_sync_at.is_some());
        assert!(!state.is_syncing);

        // empty queue: push never reaches the transport
        assert_eq!(r.transport.push_calls(), 0);
        assert_eq!(r.transport.pull_calls(), 1);

        r.engine.shutdown().await;
    }

    #[tokio::test]
    async fn pull_failure_moves_engine_to_error_then_recovers() {
        let r = rig_with(quiet_config(), NetworkStatus::online());
        r.engine.initialize().await.unwrap();
        r.transport.fail_pull_with("Network error");

        let report = r.engine.sync().await;
        assert!(!report.success);
        let state = r.engine.state();
        assert_eq!(state.status, EngineStatus::Error);
        assert!(state.error.as_deref().unwrap().contains("Network error"));

        // next successful sync clears the error
        r.transport.heal();
        r.transport.enqueue_pull_response(empty_pull(1));
        let report = r.engine.sync().await;
        assert!(report.success);
        let state = r.engine.state();
        assert_eq!(state.status, EngineStatus::Idle);
        assert!(state.error.is_none());

        r.engine.shutdown().await;
    }

    #[tokio::test]
    async fn queue_operation_refreshes_pending_count() {
        let r = rig_with(quiet_config(), NetworkStatus::online());
        r.engine.initialize().await.unwrap();

        let observed = Arc::new(AtomicUsize::new(0));
        {
            let observed = observed.clone();
            r.engine.subscribe(move |state: &EngineState| {
                observed.store(state.pending_changes as usize, Ordering::SeqCst);
            });
        }

        r.engine
            .queue_operation(Operation::Create, "posts", "p1", Document::new())
            .await
            .unwrap();

        assert_eq!(r.engine.state().pending_changes, 1);
        assert_eq!(observed.load(Ordering::SeqCst), 1);

        r.engine.shutdown().await;
    }

    #[tokio::test]
    async fn panicking_observer_does_not_block_others() {
        let r = rig_with(quiet_config(), NetworkStatus::online());
        r.engine.initialize().await.unwrap();
        r.transport.enqueue_pull_response(empty_pull(1));

        r.engine.subscribe(|_: &EngineState| panic!("bad observer"));
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = hits.clone();
            r.engine.subscribe(move |_: &EngineState| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        let report = r.engine.sync().await;
        assert!(report.success);
        // syncing + idle transitions both reached the second observer
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        r.engine.shutdown().await;
    }

    #[tokio::test]
    async fn purges_update_pending_count() {
        let r = rig_with(quiet_config(), NetworkStatus::online());
        r.engine.initialize().await.unwrap();

        r.engine
            .queue_operation(Operation::Create, "posts", "p1", Document::new())
            .await
            .unwrap();
        for _ in 0..3 {
            let items = r.engine.queue().pending(u32::MAX).await.unwrap();
            r.engine.queue().bump(&items[0].id, "boom").await.unwrap();
        }

        assert_eq!(r.engine.failed_items().await.unwrap().len(), 1);
        assert_eq!(r.engine.purge_failed().await.unwrap(), 1);
        assert_eq!(r.engine.state().pending_changes, 0);

        r.engine.shutdown().await;
    }

    #[tokio::test]
    async fn builder_rejects_missing_collaborators() {
        let result = SyncEngine::builder(SyncConfig::default()).build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn builder_rejects_custom_strategy_without_function() {
        let config = SyncConfig {
            conflict_strategy: ConflictStrategy::Custom,
            ..Default::default()
        };
        let result = SyncEngine::builder(config)
            .with_store(Arc::new(MemoryStore::new()))
            .with_scratch(Arc::new(MemoryScratch::new()))
            .with_transport(Arc::new(MockTransport::new()))
            .with_reachability(Arc::new(MockReachability::new(NetworkStatus::online())))
            .build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn absorbed_push_failures_still_pull() {
        // Transport-level push failures are retry accounting, not engine
        // failures: the cycle continues into pull.
        let r = rig_with(quiet_config(), NetworkStatus::online());
        r.engine.initialize().await.unwrap();

        r.engine
            .queue_operation(Operation::Create, "posts", "p1", Document::new())
            .await
            .unwrap();
        r.transport.fail_push_with("down");
        r.transport.enqueue_pull_response(empty_pull(7));

        let report = r.engine.sync().await;
        assert!(report.success);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(r.transport.pull_calls(), 1);

        r.engine.shutdown().await;
    }
}
