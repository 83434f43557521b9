//! # Network Monitor
//!
//! Caches the platform's reachability signal and answers "online?"
//! synchronously. Listeners are notified only on observable changes:
//! a change of `is_connected` or `is_internet_reachable`. Changes of the
//! link kind alone (wifi → cellular with connectivity intact) are
//! suppressed.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::listeners::{Listeners, Subscription};

// =============================================================================
// Status Types
// =============================================================================

/// Whether the wider internet is reachable over the current link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    /// The probe confirmed reachability.
    Reachable,
    /// The probe confirmed the internet is unreachable.
    Unreachable,
    /// The probe has not decided yet. Treated as online.
    Unknown,
}

/// Last-known network status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    /// Link-level connectivity.
    pub is_connected: bool,
    /// Internet reachability over that link.
    pub is_internet_reachable: Reachability,
    /// Link kind ("wifi", "cellular", ...), if the platform reports one.
    pub kind: Option<String>,
}

impl NetworkStatus {
    /// A connected, reachable status.
    pub fn online() -> Self {
        NetworkStatus {
            is_connected: true,
            is_internet_reachable: Reachability::Reachable,
            kind: None,
        }
    }

    /// A disconnected status.
    pub fn offline() -> Self {
        NetworkStatus {
            is_connected: false,
            is_internet_reachable: Reachability::Unreachable,
            kind: None,
        }
    }

    /// Online means connected and not confirmed-unreachable.
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable != Reachability::Unreachable
    }

    /// True if `other` differs in a way listeners care about.
    fn observably_differs_from(&self, other: &NetworkStatus) -> bool {
        self.is_connected != other.is_connected
            || self.is_internet_reachable != other.is_internet_reachable
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        NetworkStatus {
            is_connected: false,
            is_internet_reachable: Reachability::Unknown,
            kind: None,
        }
    }
}

// =============================================================================
// Reachability Source
// =============================================================================

/// Platform probe feeding the monitor.
///
/// Implementations wrap whatever the platform offers (netlink, NWPathMonitor,
/// a connectivity plugin) and emit a status on every change event.
#[async_trait]
pub trait ReachabilitySource: Send + Sync {
    /// One-shot fetch of the current status.
    async fn fetch(&self) -> NetworkStatus;

    /// Subscribes to change events.
    fn events(&self) -> broadcast::Receiver<NetworkStatus>;
}

// =============================================================================
// Network Monitor
// =============================================================================

struct MonitorInner {
    status: RwLock<NetworkStatus>,
    listeners: Listeners<NetworkStatus>,
}

impl MonitorInner {
    fn apply(&self, incoming: NetworkStatus) {
        let changed = {
            let mut status = self.status.write();
            let changed = incoming.observably_differs_from(&status);
            *status = incoming.clone();
            changed
        };

        if changed {
            debug!(
                is_connected = incoming.is_connected,
                reachable = ?incoming.is_internet_reachable,
                "Network status changed"
            );
            self.listeners.notify(&incoming);
        }
    }
}

/// Observes reachability transitions and answers "online?" synchronously.
#[derive(Clone)]
pub struct NetworkMonitor {
    source: Arc<dyn ReachabilitySource>,
    inner: Arc<MonitorInner>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl NetworkMonitor {
    /// Creates a monitor over the given source. Call
    /// [`initialize`](Self::initialize) before relying on the status.
    pub fn new(source: Arc<dyn ReachabilitySource>) -> Self {
        NetworkMonitor {
            source,
            inner: Arc::new(MonitorInner {
                status: RwLock::new(NetworkStatus::default()),
                listeners: Listeners::new(),
            }),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Fetches the current status once and subscribes to change events.
    pub async fn initialize(&self) {
        let initial = self.source.fetch().await;
        *self.inner.status.write() = initial;

        let inner = self.inner.clone();
        let mut events = self.source.events();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(status) => inner.apply(status),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Reachability events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *self.task.lock() = Some(task);
    }

    /// Synchronous online check: connected and not confirmed-unreachable.
    pub fn is_online(&self) -> bool {
        self.inner.status.read().is_online()
    }

    /// A defensive copy of the last-known status.
    pub fn status(&self) -> NetworkStatus {
        self.inner.status.read().clone()
    }

    /// Registers a listener for observable status changes.
    pub fn subscribe(
        &self,
        listener: impl Fn(&NetworkStatus) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.listeners.subscribe(listener)
    }

    /// Removes a listener.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.inner.listeners.unsubscribe(subscription);
    }

    /// Stops consuming the platform source and drops all listeners.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.inner.listeners.clear();
    }
}

// =============================================================================
// Mock Source
// =============================================================================

/// Scripted [`ReachabilitySource`] for tests.
pub struct MockReachability {
    status: RwLock<NetworkStatus>,
    events_tx: broadcast::Sender<NetworkStatus>,
}

impl MockReachability {
    /// Creates a source reporting the given initial status.
    pub fn new(initial: NetworkStatus) -> Self {
        let (events_tx, _) = broadcast::channel(16);
        MockReachability {
            status: RwLock::new(initial),
            events_tx,
        }
    }

    /// Updates the reported status and emits a change event.
    pub fn set(&self, status: NetworkStatus) {
        *self.status.write() = status.clone();
        let _ = self.events_tx.send(status);
    }
}

#[async_trait]
impl ReachabilitySource for MockReachability {
    async fn fetch(&self) -> NetworkStatus {
        self.status.read().clone()
    }

    fn events(&self) -> broadcast::Receiver<NetworkStatus> {
        self.events_tx.subscribe()
    }
}
