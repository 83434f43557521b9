//! Observer fan-out with panic isolation.
//!
//! One mechanism backs both the engine-state observers and the network
//! monitor's change listeners: an interior-mutable set of callbacks,
//! notified with a borrowed snapshot. A panicking listener is caught and
//! logged; the remaining listeners still run and the state change stands.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Token returned by [`Listeners::subscribe`]; pass back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

/// A set of listeners over values of type `T`.
pub(crate) struct Listeners<T> {
    entries: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Listeners {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its subscription token.
    pub(crate) fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, Arc::new(listener)));
        Subscription(id)
    }

    /// Removes a listener. Unknown tokens are ignored.
    pub(crate) fn unsubscribe(&self, subscription: Subscription) {
        self.entries.lock().retain(|(id, _)| *id != subscription.0);
    }

    /// Drops every listener.
    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Invokes every listener with `value`, isolating panics.
    pub(crate) fn notify(&self, value: &T) {
        // Snapshot under the lock, invoke outside it, so a listener may
        // subscribe or unsubscribe without deadlocking.
        let snapshot: Vec<Callback<T>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                error!("listener panicked during notification");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn notify_reaches_all_listeners() {
        let listeners: Listeners<u32> = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = hits.clone();
            listeners.subscribe(move |v: &u32| {
                hits.fetch_add(*v as usize, Ordering::SeqCst);
            });
        }

        listeners.notify(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let listeners: Listeners<u32> = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let keep = {
            let hits = hits.clone();
            listeners.subscribe(move |_: &u32| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let gone = listeners.subscribe(|_: &u32| {});

        listeners.unsubscribe(gone);
        assert_eq!(listeners.len(), 1);

        listeners.notify(&0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        listeners.unsubscribe(keep);
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_the_rest() {
        let listeners: Listeners<u32> = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        listeners.subscribe(|_: &u32| panic!("bad listener"));
        {
            let hits = hits.clone();
            listeners.subscribe(move |_: &u32| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        listeners.notify(&1);
        listeners.notify(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
