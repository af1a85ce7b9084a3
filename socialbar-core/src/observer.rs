//! UserDataObserver: the blocking facade UI threads call.
//!
//! Every query follows the same shape: queue an envelope if the cached value
//! must be refreshed, wait at most [`BridgeConfig::wait_timeout`] for the
//! worker, then return whatever the cache holds. A slow or broken session
//! therefore degrades to stale answers, never to a hung UI thread.
//!
//! [`BridgeConfig::wait_timeout`]: crate::config::BridgeConfig::wait_timeout

use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use socialbar_session::{Counter, Friend, SessionFactory, UserData};

use crate::bridge::cache::CacheSnapshot;
use crate::bridge::callback::{ChangeListener, ListenerId};
use crate::bridge::envelope::Operation;
use crate::bridge::{worker, Inner, WorkerState};
use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Per-thread bridge instance. Obtain one through
/// [`Registry::get_instance`](crate::registry::Registry::get_instance).
pub struct UserDataObserver {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for UserDataObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDataObserver")
            .field("owner", &self.inner.owner)
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}

impl UserDataObserver {
    /// Create an observer owned by `owner` and start its worker thread.
    pub(crate) fn spawn(
        owner: ThreadId,
        config: BridgeConfig,
        factory: Arc<dyn SessionFactory>,
        thread_name: String,
    ) -> Result<Arc<Self>, BridgeError> {
        let inner = Arc::new(Inner::new(owner, config));
        let handle = worker::spawn(Arc::clone(&inner), factory, thread_name)?;
        Ok(Arc::new(Self {
            inner,
            worker: Mutex::new(Some(handle)),
        }))
    }

    pub fn owner(&self) -> ThreadId {
        self.inner.owner
    }

    pub fn worker_state(&self) -> WorkerState {
        self.inner.state()
    }

    pub fn is_released(&self) -> bool {
        self.inner.state().is_stopped()
    }

    // ── Queries ──

    pub fn is_logged_in(&self, need_update: bool) -> Result<bool, BridgeError> {
        self.query(Operation::IsLoggedIn, need_update, |c| c.is_logged_in)
    }

    pub fn can_change_status(&self, need_update: bool) -> Result<bool, BridgeError> {
        self.query(Operation::CanChangeStatus, need_update, |c| {
            c.can_change_status
        })
    }

    pub fn count(&self, counter: Counter, need_update: bool) -> Result<u32, BridgeError> {
        self.query(Operation::GetCount(counter), need_update, |c| {
            c.count(counter)
        })
    }

    pub fn pokes_count(&self, need_update: bool) -> Result<u32, BridgeError> {
        self.count(Counter::Pokes, need_update)
    }

    pub fn messages_count(&self, need_update: bool) -> Result<u32, BridgeError> {
        self.count(Counter::Messages, need_update)
    }

    pub fn requests_count(&self, need_update: bool) -> Result<u32, BridgeError> {
        self.count(Counter::Requests, need_update)
    }

    pub fn events_count(&self, need_update: bool) -> Result<u32, BridgeError> {
        self.count(Counter::Events, need_update)
    }

    pub fn group_invites_count(&self, need_update: bool) -> Result<u32, BridgeError> {
        self.count(Counter::GroupInvites, need_update)
    }

    pub fn friends(&self, need_update: bool) -> Result<Vec<Friend>, BridgeError> {
        self.query(Operation::GetFriends, need_update, |c| c.friends.clone())
    }

    /// An empty record is retried once by the worker before it is cached.
    pub fn logged_in_user(&self, need_update: bool) -> Result<UserData, BridgeError> {
        self.query(Operation::GetLoggedInUser, need_update, |c| {
            c.logged_in_user.clone()
        })
    }

    /// Everything cached right now, without contacting the session.
    pub fn snapshot(&self) -> Result<CacheSnapshot, BridgeError> {
        self.check_caller()?;
        Ok(self.inner.read(CacheSnapshot::clone))
    }

    // ── Mutations ──

    pub fn login(&self, need_update: bool) -> Result<(), BridgeError> {
        self.command(Operation::LogIn, need_update)
    }

    pub fn logout(&self, need_update: bool) -> Result<(), BridgeError> {
        self.command(Operation::LogOut, need_update)
    }

    /// Queued; returns without waiting for the session.
    pub fn set_status(&self, text: &str) -> Result<(), BridgeError> {
        self.command(Operation::SetStatus(text.to_string()), false)
    }

    /// Queued; returns without waiting for the session.
    pub fn set_session(&self, session: &str) -> Result<(), BridgeError> {
        self.command(Operation::SetSession(session.to_string()), false)
    }

    // ── Listeners ──

    /// Register a listener for push-driven cache changes. Listeners run on the
    /// worker thread.
    pub fn subscribe(&self, listener: impl ChangeListener) -> Result<ListenerId, BridgeError> {
        self.check_caller()?;
        Ok(self.inner.listeners.add(Arc::new(listener)))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    // ── Internals ──

    fn query<T>(
        &self,
        operation: Operation,
        need_update: bool,
        read: impl FnOnce(&CacheSnapshot) -> T,
    ) -> Result<T, BridgeError> {
        self.check_caller()?;
        let initial = operation
            .fact()
            .is_some_and(|fact| !self.inner.is_fetched(fact));
        if need_update || initial {
            let seq = self.inner.enqueue(operation)?;
            self.inner.wait_for(seq, self.inner.config.wait_timeout());
        }
        Ok(self.inner.read(read))
    }

    fn command(&self, operation: Operation, wait: bool) -> Result<(), BridgeError> {
        self.check_caller()?;
        let seq = self.inner.enqueue(operation)?;
        if wait {
            self.inner.wait_for(seq, self.inner.config.wait_timeout());
        }
        Ok(())
    }

    fn check_caller(&self) -> Result<(), BridgeError> {
        if self.inner.state().is_stopped() {
            return Err(BridgeError::Released);
        }
        if std::thread::current().id() != self.inner.owner {
            return Err(BridgeError::WrongThread);
        }
        Ok(())
    }

    /// Ask the worker to stop without waiting for it.
    pub(crate) fn request_stop(&self) {
        self.inner.request_stop();
    }

    /// Stop the worker and join it. Idempotent.
    pub(crate) fn shutdown(&self) {
        self.inner.request_stop();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            // A listener holding the last reference can drop us on the worker itself.
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!(owner = ?self.inner.owner, "bridge worker panicked");
            }
        }
    }
}

impl Drop for UserDataObserver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialbar_session::memory::{CallKind, MemoryService};
    use std::time::Duration;

    fn observer(service: &MemoryService) -> Arc<UserDataObserver> {
        UserDataObserver::spawn(
            std::thread::current().id(),
            BridgeConfig::default(),
            service.factory(),
            "observer-test".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_first_query_fetches_even_without_need_update() {
        let service = MemoryService::new();
        service.set_logged_in(true);
        let observer = observer(&service);

        assert!(observer.is_logged_in(false).unwrap());
        assert_eq!(service.count_calls(CallKind::IsLoggedIn), 1);

        assert!(observer.is_logged_in(false).unwrap());
        assert_eq!(service.count_calls(CallKind::IsLoggedIn), 1);
    }

    #[test]
    fn test_need_update_always_fetches() {
        let service = MemoryService::new();
        service.set_count(Counter::Pokes, 2);
        let observer = observer(&service);

        assert_eq!(observer.pokes_count(true).unwrap(), 2);
        service.set_count(Counter::Pokes, 3);
        assert_eq!(observer.pokes_count(false).unwrap(), 2);
        assert_eq!(observer.pokes_count(true).unwrap(), 3);
        assert_eq!(service.count_calls(CallKind::Count), 2);
    }

    #[test]
    fn test_wrong_thread_is_rejected() {
        let service = MemoryService::new();
        let observer = observer(&service);

        let remote = observer.clone();
        let result = std::thread::spawn(move || remote.is_logged_in(false))
            .join()
            .unwrap();
        assert!(matches!(result, Err(BridgeError::WrongThread)));
    }

    #[test]
    fn test_released_observer_fails_fast() {
        let service = MemoryService::new();
        service.set_latency(Duration::from_millis(200));
        let observer = observer(&service);
        observer.shutdown();

        assert!(observer.is_released());
        assert_eq!(observer.worker_state(), WorkerState::Terminated);
        assert!(matches!(
            observer.friends(true),
            Err(BridgeError::Released)
        ));
        assert!(matches!(
            observer.set_status("x"),
            Err(BridgeError::Released)
        ));
        observer.shutdown();
    }

    #[test]
    fn test_set_status_does_not_wait() {
        let service = MemoryService::new();
        service.set_latency(Duration::from_millis(300));
        let observer = observer(&service);

        let started = std::time::Instant::now();
        observer.set_status("away").unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));

        // The next blocking call queues behind the status change.
        observer.logged_in_user(true).unwrap();
        observer.shutdown();
        assert_eq!(service.user().status.as_deref(), Some("away"));
    }
}
