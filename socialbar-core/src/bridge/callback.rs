//! Change listeners: how UI code learns that pushed data landed in the cache.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use socialbar_session::ChangeNotification;

/// What changed after a push was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    /// The named facts were refreshed in the cache.
    Data(ChangeNotification),
    /// UI strings should be reloaded.
    Language,
}

/// Receives [`ViewChange`]s on the bridge worker thread.
///
/// Listeners run while the worker is otherwise idle; keep them short and
/// never call back into a blocking facade method from inside one.
pub trait ChangeListener: Send + Sync + 'static {
    fn on_change(&self, change: ViewChange);
}

impl<F> ChangeListener for F
where
    F: Fn(ViewChange) + Send + Sync + 'static,
{
    fn on_change(&self, change: ViewChange) {
        self(change)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
}

impl ListenerSet {
    pub(crate) fn add(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners.lock().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Capture the current listeners for `change`. Listeners added or removed
    /// afterwards do not affect the returned delivery.
    pub(crate) fn prepare(&self, change: ViewChange) -> Delivery {
        let listeners = self
            .listeners
            .lock()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();
        Delivery { change, listeners }
    }

    pub(crate) fn clear(&self) {
        self.listeners.lock().clear();
    }
}

/// One change bound to the listeners that should see it. Delivered with no
/// bridge lock held.
pub(crate) struct Delivery {
    change: ViewChange,
    listeners: Vec<(ListenerId, Arc<dyn ChangeListener>)>,
}

impl Delivery {
    /// Invoke every listener. A panicking listener is logged and skipped.
    pub(crate) fn deliver(self) {
        let change = self.change;
        for (id, listener) in self.listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_change(change))).is_err() {
                tracing::warn!(listener = id.0, ?change, "change listener panicked");
            }
        }
    }
}
