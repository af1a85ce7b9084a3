//! Session push → bridge envelope conversion.

use std::sync::{Arc, Weak};

use socialbar_session::{PushObserver, SessionEvent};

use crate::bridge::envelope::Operation;
use crate::bridge::Inner;

/// Map a session push onto the operation the worker should run for it.
pub fn convert_event(event: &SessionEvent) -> Operation {
    match event {
        SessionEvent::DataChanged(change) => Operation::DataUpdate(*change),
        SessionEvent::LanguageChanged => Operation::LanguageUpdate,
    }
}

/// Handed to the session as its push observer. Pushes can arrive on any
/// thread and at any time, so this only queues an envelope; the cache is
/// touched later by the worker.
pub(crate) struct PushForwarder {
    inner: Weak<Inner>,
}

impl PushForwarder {
    pub(crate) fn new(inner: &Arc<Inner>) -> Self {
        Self {
            inner: Arc::downgrade(inner),
        }
    }
}

impl PushObserver for PushForwarder {
    fn on_event(&self, event: SessionEvent) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let operation = convert_event(&event);
        if inner.enqueue(operation).is_err() {
            tracing::debug!(?event, "bridge stopped, dropping push");
        }
    }
}
