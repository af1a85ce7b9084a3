//! Shared state between an observer's owner thread and its worker.
//!
//! The request queue and the cache sit behind one lock. The worker waits on
//! `work_ready`; blocking facade calls wait on `work_done`.

pub mod cache;
pub mod callback;
pub mod envelope;
pub(crate) mod worker;

use std::collections::VecDeque;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use cache::{Cache, CacheSnapshot, CacheUpdate, Fact};
use callback::{Delivery, ListenerSet, ViewChange};
use envelope::{Envelope, Operation};

/// Worker lifecycle: `Idle <-> Draining`, then `Stopping -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Draining,
    Stopping,
    Terminated,
}

impl WorkerState {
    pub fn is_stopped(self) -> bool {
        matches!(self, WorkerState::Stopping | WorkerState::Terminated)
    }
}

pub(crate) struct Shared {
    pub(crate) queue: VecDeque<Envelope>,
    pub(crate) cache: Cache,
    next_seq: u64,
    /// Highest seq whose handler has finished. FIFO makes this monotonic.
    pub(crate) completed_seq: u64,
    pub(crate) state: WorkerState,
}

pub(crate) struct Inner {
    pub(crate) owner: ThreadId,
    pub(crate) config: BridgeConfig,
    pub(crate) shared: Mutex<Shared>,
    pub(crate) work_ready: Condvar,
    pub(crate) work_done: Condvar,
    pub(crate) listeners: ListenerSet,
}

impl Inner {
    pub(crate) fn new(owner: ThreadId, config: BridgeConfig) -> Self {
        Self {
            owner,
            config,
            shared: Mutex::new(Shared {
                queue: VecDeque::new(),
                cache: Cache::default(),
                next_seq: 0,
                completed_seq: 0,
                state: WorkerState::Idle,
            }),
            work_ready: Condvar::new(),
            work_done: Condvar::new(),
            listeners: ListenerSet::default(),
        }
    }

    /// Queue `operation` on behalf of the owner thread and wake the worker.
    /// Returns the envelope's seq.
    pub(crate) fn enqueue(&self, operation: Operation) -> Result<u64, BridgeError> {
        let mut shared = self.shared.lock();
        if shared.state.is_stopped() {
            return Err(BridgeError::Released);
        }
        shared.next_seq += 1;
        let seq = shared.next_seq;
        tracing::debug!(seq, operation = operation.name(), "request queued");
        shared
            .queue
            .push_back(Envelope::with_origin(seq, operation, self.owner));
        self.work_ready.notify_one();
        Ok(seq)
    }

    /// Block until envelope `seq` has been handled, the worker stops, or
    /// `timeout` elapses. Returns whether the envelope was handled.
    pub(crate) fn wait_for(&self, seq: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut shared = self.shared.lock();
        while shared.completed_seq < seq && !shared.state.is_stopped() {
            if self.work_done.wait_until(&mut shared, deadline).timed_out() {
                break;
            }
        }
        let done = shared.completed_seq >= seq;
        if !done {
            tracing::debug!(
                seq,
                completed = shared.completed_seq,
                "wait ended before request was handled, returning cached value"
            );
        }
        done
    }

    /// Record that envelope `seq` finished, applying its cache updates in the
    /// same critical section, and wake waiters.
    ///
    /// When `change` is given, the listeners to notify are captured under the
    /// same lock, and only if no stop has been requested. A stop that lands
    /// after this point does not recall the delivery.
    pub(crate) fn complete(
        &self,
        seq: u64,
        updates: Vec<CacheUpdate>,
        change: Option<ViewChange>,
    ) -> Option<Delivery> {
        let mut shared = self.shared.lock();
        shared.cache.apply_all(updates);
        shared.completed_seq = shared.completed_seq.max(seq);
        self.work_done.notify_all();
        if shared.state.is_stopped() {
            return None;
        }
        change.map(|change| self.listeners.prepare(change))
    }

    pub(crate) fn is_fetched(&self, fact: Fact) -> bool {
        self.shared.lock().cache.is_fetched(fact)
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&CacheSnapshot) -> T) -> T {
        f(self.shared.lock().cache.snapshot())
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.shared.lock().state
    }

    /// Flip to `Stopping` and wake both the worker and any waiters. The
    /// in-flight handler, if any, still runs to completion.
    pub(crate) fn request_stop(&self) {
        let mut shared = self.shared.lock();
        if shared.state != WorkerState::Terminated {
            shared.state = WorkerState::Stopping;
        }
        self.work_ready.notify_all();
        self.work_done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialbar_session::ChangeNotification;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn inner() -> Inner {
        Inner::new(std::thread::current().id(), BridgeConfig::default())
    }

    #[test]
    fn test_enqueue_assigns_increasing_seq() {
        let inner = inner();
        let a = inner.enqueue(Operation::IsLoggedIn).unwrap();
        let b = inner.enqueue(Operation::GetFriends).unwrap();
        assert!(b > a);

        let shared = inner.shared.lock();
        let seqs: Vec<u64> = shared.queue.iter().map(Envelope::seq).collect();
        assert_eq!(seqs, vec![a, b]);
        assert!(shared.queue.iter().all(|e| e.origin_thread() == inner.owner));
    }

    #[test]
    fn test_enqueue_after_stop_is_rejected() {
        let inner = inner();
        inner.request_stop();
        assert!(matches!(
            inner.enqueue(Operation::IsLoggedIn),
            Err(BridgeError::Released)
        ));
    }

    #[test]
    fn test_wait_times_out_without_worker() {
        let inner = inner();
        let seq = inner.enqueue(Operation::GetFriends).unwrap();
        let started = Instant::now();
        assert!(!inner.wait_for(seq, Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_complete_wakes_waiter_and_applies_update() {
        let inner = Arc::new(inner());
        let seq = inner.enqueue(Operation::IsLoggedIn).unwrap();

        let completer = {
            let inner = inner.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                inner.complete(seq, vec![CacheUpdate::LoginState(true)], None);
            })
        };

        assert!(inner.wait_for(seq, Duration::from_secs(5)));
        assert!(inner.read(|c| c.is_logged_in));
        assert!(inner.is_fetched(Fact::LoginState));
        completer.join().unwrap();
    }

    fn counting_listener(inner: &Inner) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        inner.listeners.add(Arc::new(move |_change: ViewChange| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        calls
    }

    #[test]
    fn test_complete_captures_listeners_for_push() {
        let inner = inner();
        let calls = counting_listener(&inner);
        let seq = inner.enqueue(Operation::LanguageUpdate).unwrap();

        let delivery = inner.complete(seq, Vec::new(), Some(ViewChange::Language));
        delivery.expect("running bridge delivers").deliver();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(inner.complete(seq, Vec::new(), None).is_none());
    }

    #[test]
    fn test_complete_after_stop_delivers_nothing_but_still_applies() {
        let inner = inner();
        let calls = counting_listener(&inner);
        let seq = inner
            .enqueue(Operation::DataUpdate(ChangeNotification::LoginState))
            .unwrap();
        inner.request_stop();

        let delivery = inner.complete(
            seq,
            vec![CacheUpdate::LoginState(true)],
            Some(ViewChange::Data(ChangeNotification::LoginState)),
        );
        assert!(delivery.is_none());
        assert!(inner.read(|c| c.is_logged_in));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_releases_waiters() {
        let inner = Arc::new(inner());
        let seq = inner.enqueue(Operation::GetFriends).unwrap();
        let stopper = {
            let inner = inner.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                inner.request_stop();
            })
        };

        let started = Instant::now();
        assert!(!inner.wait_for(seq, Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(inner.state(), WorkerState::Stopping);
        stopper.join().unwrap();
    }
}
