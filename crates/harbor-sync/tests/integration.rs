//! End-to-end engine tests: full sync cycles over the in-memory store,
//! scripted transport, and scripted reachability.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use harbor_core::{record, Document, Operation};
use harbor_store::{LocalStore, MemoryScratch, MemoryStore, ScratchStore, StoreTransaction};
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

use harbor_sync::{
    ConflictContext, ConflictStrategy, EngineStatus, MockReachability, MockTransport,
    NetworkStatus, PullRequest, PullResponse, PushItemResult, PushRequest, PushResponse,
    Resolution, SyncConfig, SyncEngine, SyncError, SyncResult, SyncTransport, TableChanges,
    WATERMARK_KEY,
};

// =============================================================================
// Helpers
// =============================================================================

struct Rig {
    store: Arc<MemoryStore>,
    scratch: Arc<MemoryScratch>,
    transport: Arc<MockTransport>,
    reachability: Arc<MockReachability>,
    engine: SyncEngine,
}

fn quiet_config() -> SyncConfig {
    SyncConfig {
        enable_background_sync: false,
        sync_on_reconnect: false,
        ..Default::default()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn build_rig(config: SyncConfig, initial: NetworkStatus) -> Rig {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let scratch = Arc::new(MemoryScratch::new());
    let transport = Arc::new(MockTransport::new());
    let reachability = Arc::new(MockReachability::new(initial));

    let engine = SyncEngine::builder(config)
        .with_store(store.clone())
        .with_scratch(scratch.clone())
        .with_transport(transport.clone())
        .with_reachability(reachability.clone())
        .with_tables(["posts"])
        .build()
        .unwrap();

    Rig {
        store,
        scratch,
        transport,
        reachability,
        engine,
    }
}

fn doc(json: &str) -> Document {
    serde_json::from_str(json).unwrap()
}

fn pull_response(timestamp: i64, posts: TableChanges) -> PullResponse {
    let mut changes = std::collections::HashMap::new();
    changes.insert("posts".to_string(), posts);
    PullResponse { timestamp, changes }
}

fn empty_pull(timestamp: i64) -> PullResponse {
    pull_response(timestamp, TableChanges::default())
}

/// Writes an application record and its queue entry in one transaction,
/// the way an embedding application would.
async fn write_and_enqueue(rig: &Rig, id: &str, json: &str, operation: Operation) {
    let mut record: Document = doc(json);
    record.insert("id".into(), Value::from(id));
    record.insert("sync_status".into(), "pending".into());

    let mut txn = rig.store.begin().await.unwrap();
    txn.insert("posts", id, record.clone()).await.unwrap();
    rig.engine
        .queue()
        .enqueue_in(txn.as_mut(), operation, "posts", id, record)
        .await
        .unwrap();
    txn.commit().await.unwrap();
}

// =============================================================================
// End-to-end scenarios
// =============================================================================

#[tokio::test]
async fn cold_start_pulls_server_rows() {
    let rig = build_rig(quiet_config(), NetworkStatus::online());
    rig.engine.initialize().await.unwrap();

    rig.transport.enqueue_pull_response(pull_response(
        1700,
        TableChanges {
            created: vec![
                doc(r#"{"id": "s1", "title": "A", "updated_at": 1699}"#),
                doc(r#"{"id": "s2", "title": "B", "updated_at": 1699}"#),
            ],
            ..Default::default()
        },
    ));

    let report = rig.engine.sync().await;
    assert!(report.success);
    assert_eq!(report.stats.pushed, 0);
    assert_eq!(report.stats.pulled, 2);

    for sid in ["s1", "s2"] {
        let rows = rig.store.find_by_server_id("posts", sid).await.unwrap();
        assert_eq!(rows.len(), 1, "expected one row for {}", sid);
        assert_eq!(
            record::sync_status(&rows[0]),
            Some(record::SyncStatus::Synced)
        );
    }

    assert_eq!(
        rig.scratch.get(WATERMARK_KEY).await.unwrap().as_deref(),
        Some("1700")
    );

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn push_with_partial_server_failure() {
    let rig = build_rig(quiet_config(), NetworkStatus::online());
    rig.engine.initialize().await.unwrap();

    write_and_enqueue(&rig, "p1", r#"{"title": "A"}"#, Operation::Create).await;
    write_and_enqueue(&rig, "p2", r#"{"title": "B"}"#, Operation::Update).await;

    rig.transport.enqueue_push_response(PushResponse {
        success: true,
        results: vec![
            PushItemResult {
                record_id: Some("p1".into()),
                server_id: Some("s1".into()),
                server_updated_at: Some(200),
                error: None,
            },
            PushItemResult {
                record_id: Some("p2".into()),
                error: Some("validation".into()),
                ..Default::default()
            },
        ],
    });
    rig.transport.enqueue_pull_response(empty_pull(300));

    let report = rig.engine.sync().await;
    assert!(report.success);
    assert_eq!(report.stats.pushed, 1);
    assert_eq!(report.stats.failed, 1);

    // p1 carries its server identity now
    let p1 = rig.store.get("posts", "p1").await.unwrap().unwrap();
    assert_eq!(record::server_id(&p1), Some("s1"));
    assert_eq!(record::server_updated_at(&p1), Some(200));
    assert_eq!(record::sync_status(&p1), Some(record::SyncStatus::Synced));

    // p2's queue row survived with accounting
    let pending = rig.engine.queue().pending(3).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record_id, "p2");
    assert_eq!(pending[0].retry_count, 1);
    assert_eq!(pending[0].error_message.as_deref(), Some("validation"));

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn transport_failure_kills_item_at_retry_ceiling() {
    // small backoff base so the re-send's delay does not slow the test
    let config = SyncConfig {
        retry_delay_base_ms: 10,
        ..quiet_config()
    };
    let rig = build_rig(config, NetworkStatus::online());
    rig.engine.initialize().await.unwrap();

    write_and_enqueue(&rig, "p1", r#"{"title": "A"}"#, Operation::Create).await;
    let items = rig.engine.queue().pending(3).await.unwrap();
    rig.engine.queue().bump(&items[0].id, "flap").await.unwrap();
    rig.engine.queue().bump(&items[0].id, "flap").await.unwrap();

    rig.transport.fail_push_with("Network error");
    rig.transport.enqueue_pull_response(empty_pull(1));

    let report = rig.engine.sync().await;
    assert!(report.success);
    assert_eq!(report.stats.failed, 1);

    // third strike: dead, excluded from pending until purged
    assert!(rig.engine.queue().pending(3).await.unwrap().is_empty());
    let dead = rig.engine.failed_items().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].retry_count, 3);
    assert!(dead[0].error_message.as_deref().unwrap().contains("Network error"));

    // dead items do not block later enqueues
    write_and_enqueue(&rig, "p2", r#"{"title": "B"}"#, Operation::Create).await;
    let pending = rig.engine.queue().pending(3).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record_id, "p2");

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn conflict_is_resolved_exactly_once_with_full_context() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let seen: Arc<parking_lot::Mutex<Option<ConflictContext>>> =
        Arc::new(parking_lot::Mutex::new(None));

    let config = SyncConfig {
        conflict_strategy: ConflictStrategy::Custom,
        enable_background_sync: false,
        sync_on_reconnect: false,
        ..Default::default()
    };

    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let engine = {
        let invocations = invocations.clone();
        let seen = seen.clone();
        SyncEngine::builder(config)
            .with_store(store.clone())
            .with_scratch(Arc::new(MemoryScratch::new()))
            .with_transport(transport.clone())
            .with_reachability(Arc::new(MockReachability::new(NetworkStatus::online())))
            .with_tables(["posts"])
            .with_custom_resolver(Arc::new(move |context: &ConflictContext| {
                invocations.fetch_add(1, Ordering::SeqCst);
                *seen.lock() = Some(context.clone());
                Resolution::KeepLocal
            }))
            .build()
            .unwrap()
    };
    engine.initialize().await.unwrap();

    // local record: pending edits made against server version 1000
    let mut local = doc(
        r#"{"title": "Local", "updated_at": 5000,
            "server_id": "s1", "server_updated_at": 1000, "sync_status": "pending"}"#,
    );
    local.insert("id".into(), Value::from("p1"));
    let mut txn = store.begin().await.unwrap();
    txn.insert("posts", "p1", local).await.unwrap();
    txn.commit().await.unwrap();

    transport.enqueue_pull_response(pull_response(
        4000,
        TableChanges {
            updated: vec![doc(r#"{"id": "s1", "title": "Server", "updated_at": 3000}"#)],
            ..Default::default()
        },
    ));

    let report = engine.sync().await;
    assert!(report.success);
    assert_eq!(report.stats.pulled, 1);

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    let context = seen.lock().take().unwrap();
    assert_eq!(context.table, "posts");
    assert_eq!(context.record_id, "p1");
    assert_eq!(context.local_updated_at, Some(5000));
    assert_eq!(context.server_updated_at, Some(3000));
    assert_eq!(context.server_data.get("title").unwrap(), "Server");

    // the keep-local verdict was applied
    let row = store.get("posts", "p1").await.unwrap().unwrap();
    assert_eq!(row.get("title").unwrap(), "Local");
    assert_eq!(record::sync_status(&row), Some(record::SyncStatus::Pending));

    engine.shutdown().await;
}

#[tokio::test]
async fn background_tick_while_offline_stays_idle() {
    let config = SyncConfig {
        sync_interval_ms: 50,
        enable_background_sync: true,
        sync_on_reconnect: false,
        ..Default::default()
    };
    let rig = build_rig(config, NetworkStatus::offline());
    rig.engine.initialize().await.unwrap();

    write_and_enqueue(&rig, "p1", r#"{"title": "A"}"#, Operation::Create).await;
    let pending_before = rig.engine.state().pending_changes;

    // several ticker periods pass while offline
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(rig.transport.push_calls(), 0);
    assert_eq!(rig.transport.pull_calls(), 0);

    let state = rig.engine.state();
    assert_eq!(state.status, EngineStatus::Idle);
    assert_eq!(state.pending_changes, pending_before);

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn background_ticker_syncs_when_online() {
    let config = SyncConfig {
        sync_interval_ms: 50,
        enable_background_sync: true,
        sync_on_reconnect: false,
        ..Default::default()
    };
    let rig = build_rig(config, NetworkStatus::online());
    rig.engine.initialize().await.unwrap();
    rig.transport.enqueue_pull_response(empty_pull(1));

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(rig.transport.pull_calls() >= 1);
    assert!(rig.engine.state().last_sync_at.is_some());

    rig.engine.shutdown().await;

    // after shutdown the ticker is gone
    let calls = rig.transport.pull_calls();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(rig.transport.pull_calls(), calls);
}

#[tokio::test]
async fn reconnect_triggers_exactly_one_sync() {
    let config = SyncConfig {
        enable_background_sync: false,
        sync_on_reconnect: true,
        ..Default::default()
    };

    let gated = Arc::new(GatedTransport::new());
    gated.inner.enqueue_pull_response(empty_pull(1));
    gated.gate_pull();

    let store = Arc::new(MemoryStore::new());
    let reachability = Arc::new(MockReachability::new(NetworkStatus::offline()));
    let engine = SyncEngine::builder(config)
        .with_store(store)
        .with_scratch(Arc::new(MemoryScratch::new()))
        .with_transport(gated.clone())
        .with_reachability(reachability.clone())
        .with_tables(["posts"])
        .build()
        .unwrap();
    engine.initialize().await.unwrap();

    // offline → online: one sync starts and blocks inside pull
    reachability.set(NetworkStatus::online());
    gated.wait_for_pull().await;
    assert!(engine.is_syncing());

    // a second reconnect event while the sync runs must not queue another
    reachability.set(NetworkStatus {
        is_internet_reachable: harbor_sync::Reachability::Unknown,
        ..NetworkStatus::online()
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    gated.release();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!engine.is_syncing());
    assert_eq!(gated.inner.pull_calls(), 1);

    engine.shutdown().await;
}

// =============================================================================
// Cross-component invariants
// =============================================================================

#[tokio::test]
async fn overlapping_sync_is_rejected_and_only_one_reaches_transport() {
    let rig_config = quiet_config();
    let gated = Arc::new(GatedTransport::new());
    gated.inner.enqueue_pull_response(empty_pull(1));
    gated.gate_pull();

    let engine = SyncEngine::builder(rig_config)
        .with_store(Arc::new(MemoryStore::new()))
        .with_scratch(Arc::new(MemoryScratch::new()))
        .with_transport(gated.clone())
        .with_reachability(Arc::new(MockReachability::new(NetworkStatus::online())))
        .with_tables(["posts"])
        .build()
        .unwrap();
    engine.initialize().await.unwrap();

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync().await })
    };
    gated.wait_for_pull().await;

    // second caller fails fast, no transport traffic of its own
    let second = engine.sync().await;
    assert!(!second.success);
    assert!(matches!(second.error, Some(SyncError::AlreadyInProgress)));

    gated.release();
    let first = first.await.unwrap();
    assert!(first.success);
    assert_eq!(gated.inner.pull_calls(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn enqueue_during_transport_lands_in_next_cycle() {
    let gated = Arc::new(GatedTransport::new());
    gated.inner.enqueue_push_response(PushResponse {
        success: true,
        results: vec![PushItemResult::default()],
    });
    gated.inner.enqueue_pull_response(empty_pull(1));
    gated.gate_push();

    let store = Arc::new(MemoryStore::new());
    let engine = SyncEngine::builder(quiet_config())
        .with_store(store.clone())
        .with_scratch(Arc::new(MemoryScratch::new()))
        .with_transport(gated.clone())
        .with_reachability(Arc::new(MockReachability::new(NetworkStatus::online())))
        .with_tables(["posts"])
        .build()
        .unwrap();
    engine.initialize().await.unwrap();

    engine
        .queue_operation(Operation::Create, "posts", "p1", Document::new())
        .await
        .unwrap();

    let sync = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync().await })
    };
    gated.wait_for_push().await;

    // a mutation arriving while the batch is in flight
    engine
        .queue_operation(Operation::Create, "posts", "p2", Document::new())
        .await
        .unwrap();

    gated.release();
    let report = sync.await.unwrap();
    assert!(report.success);

    // the in-flight batch carried only p1
    let requests = gated.inner.push_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].changes.len(), 1);
    assert_eq!(requests[0].changes[0].record_id, "p1");

    // p2 waits for the next cycle
    let pending = engine.queue().pending(3).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record_id, "p2");

    engine.shutdown().await;
}

#[tokio::test]
async fn watermark_chains_across_cycles() {
    let rig = build_rig(quiet_config(), NetworkStatus::online());
    rig.engine.initialize().await.unwrap();

    rig.transport.enqueue_pull_response(empty_pull(1700));
    rig.transport.enqueue_pull_response(empty_pull(1900));

    assert!(rig.engine.sync().await.success);
    assert!(rig.engine.sync().await.success);

    let requests: Vec<PullRequest> = rig.transport.pull_requests();
    assert_eq!(requests[0].last_sync_at, None);
    assert_eq!(requests[1].last_sync_at, Some(1700));
    assert_eq!(
        rig.scratch.get(WATERMARK_KEY).await.unwrap().as_deref(),
        Some("1900")
    );

    rig.engine.shutdown().await;
}

#[tokio::test]
async fn pulled_deletions_tombstone_local_rows() {
    let rig = build_rig(quiet_config(), NetworkStatus::online());
    rig.engine.initialize().await.unwrap();

    // a synced local record
    let mut local = doc(r#"{"title": "A", "server_id": "s1", "sync_status": "synced"}"#);
    local.insert("id".into(), Value::from("p1"));
    let mut txn = rig.store.begin().await.unwrap();
    txn.insert("posts", "p1", local).await.unwrap();
    txn.commit().await.unwrap();

    rig.transport.enqueue_pull_response(pull_response(
        10,
        TableChanges {
            deleted: vec!["s1".into()],
            ..Default::default()
        },
    ));

    let report = rig.engine.sync().await;
    assert!(report.success);

    let row = rig.store.get("posts", "p1").await.unwrap().unwrap();
    assert!(record::is_tombstoned(&row));

    rig.engine.shutdown().await;
}

// =============================================================================
// Gated transport
// =============================================================================

/// Transport wrapper that can hold push or pull calls at a gate until the
/// test releases them, for exercising in-flight concurrency windows.
struct GatedTransport {
    inner: MockTransport,
    gate: Semaphore,
    gate_push: AtomicBool,
    gate_pull: AtomicBool,
    entered_tx: mpsc::UnboundedSender<()>,
    entered_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>,
}

impl GatedTransport {
    fn new() -> Self {
        let (entered_tx, entered_rx) = mpsc::unbounded_channel();
        GatedTransport {
            inner: MockTransport::new(),
            gate: Semaphore::new(0),
            gate_push: AtomicBool::new(false),
            gate_pull: AtomicBool::new(false),
            entered_tx,
            entered_rx: tokio::sync::Mutex::new(entered_rx),
        }
    }

    fn gate_push(&self) {
        self.gate_push.store(true, Ordering::SeqCst);
    }

    fn gate_pull(&self) {
        self.gate_pull.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.gate_push.store(false, Ordering::SeqCst);
        self.gate_pull.store(false, Ordering::SeqCst);
        self.gate.add_permits(16);
    }

    async fn wait_for_push(&self) {
        self.entered_rx.lock().await.recv().await.unwrap();
    }

    async fn wait_for_pull(&self) {
        self.entered_rx.lock().await.recv().await.unwrap();
    }

    async fn hold(&self) {
        let _ = self.entered_tx.send(());
        let permit = self.gate.acquire().await.unwrap();
        permit.forget();
    }
}

#[async_trait]
impl SyncTransport for GatedTransport {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        if self.gate_push.load(Ordering::SeqCst) {
            self.hold().await;
        }
        self.inner.push(request).await
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        if self.gate_pull.load(Ordering::SeqCst) {
            self.hold().await;
        }
        self.inner.pull(request).await
    }
}
