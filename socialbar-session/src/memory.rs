//! In-process session backed by shared mutable state.
//!
//! [`MemoryService`] plays the role of the remote service: tests mutate it,
//! inject latency and failures, fire push notifications, and inspect the
//! calls each connection made. [`MemoryService::factory`] hands the bridge a
//! [`SessionFactory`] whose connections all talk to the same service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::Mutex;

use crate::connection::{PushObserver, SessionConnection, SessionFactory};
use crate::error::SessionError;
use crate::event::SessionEvent;
use crate::model::{Counter, Friend, UserData};

/// A call received by the service, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    IsLoggedIn,
    Login,
    Logout,
    CanChangeStatus,
    Count(Counter),
    Friends,
    LoggedInUser,
    SetStatus(String),
    SetSession(String),
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Call::IsLoggedIn => CallKind::IsLoggedIn,
            Call::Login => CallKind::Login,
            Call::Logout => CallKind::Logout,
            Call::CanChangeStatus => CallKind::CanChangeStatus,
            Call::Count(_) => CallKind::Count,
            Call::Friends => CallKind::Friends,
            Call::LoggedInUser => CallKind::LoggedInUser,
            Call::SetStatus(_) => CallKind::SetStatus,
            Call::SetSession(_) => CallKind::SetSession,
        }
    }
}

/// Payload-free discriminant of [`Call`], used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    IsLoggedIn,
    Login,
    Logout,
    CanChangeStatus,
    Count,
    Friends,
    LoggedInUser,
    SetStatus,
    SetSession,
}

#[derive(Default)]
struct ServiceState {
    logged_in: bool,
    can_change_status: bool,
    counts: HashMap<Counter, u32>,
    friends: Vec<Friend>,
    user: UserData,
    session: Option<String>,
    /// Number of upcoming `logged_in_user` calls that answer with a blank record.
    empty_user_replies: u32,
    latency: Duration,
    failures: HashMap<CallKind, SessionError>,
    refuse_connect: bool,
    connections: u64,
    calls: Vec<Call>,
    call_threads: HashSet<ThreadId>,
    observers: Vec<(u64, Arc<dyn PushObserver>)>,
}

/// Shared handle to the simulated service. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryService {
    state: Arc<Mutex<ServiceState>>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose connections all talk to this service.
    pub fn factory(&self) -> Arc<dyn SessionFactory> {
        let service = self.clone();
        Arc::new(move || -> Result<Box<dyn SessionConnection>, SessionError> {
            Ok(Box::new(service.connect()?))
        })
    }

    /// Open a connection directly.
    pub fn connect(&self) -> Result<MemorySession, SessionError> {
        let mut state = self.state.lock();
        if state.refuse_connect {
            return Err(SessionError::Unavailable("connection refused".to_string()));
        }
        state.connections += 1;
        let id = state.connections;
        tracing::debug!(connection = id, "memory session connected");
        Ok(MemorySession {
            service: self.clone(),
            id,
        })
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.state.lock().logged_in = logged_in;
    }

    pub fn set_can_change_status(&self, allowed: bool) {
        self.state.lock().can_change_status = allowed;
    }

    pub fn set_count(&self, counter: Counter, value: u32) {
        self.state.lock().counts.insert(counter, value);
    }

    pub fn set_friends(&self, friends: Vec<Friend>) {
        self.state.lock().friends = friends;
    }

    pub fn set_user(&self, user: UserData) {
        self.state.lock().user = user;
    }

    /// Make the next `n` logged-in-user fetches return an empty record.
    pub fn return_empty_user(&self, n: u32) {
        self.state.lock().empty_user_replies = n;
    }

    /// Delay applied to every call, outside the state lock.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Fail every call of `kind` with `error` until [`clear_failures`](Self::clear_failures).
    pub fn fail(&self, kind: CallKind, error: SessionError) {
        self.state.lock().failures.insert(kind, error);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connect = refuse;
    }

    /// Deliver `event` to every subscribed observer, on the calling thread.
    pub fn push(&self, event: SessionEvent) {
        let observers: Vec<_> = self
            .state
            .lock()
            .observers
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            observer.on_event(event.clone());
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count_calls(&self, kind: CallKind) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.kind() == kind)
            .count()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.call_threads.clear();
    }

    /// Threads that have issued calls since the last [`clear_calls`](Self::clear_calls).
    pub fn call_threads(&self) -> HashSet<ThreadId> {
        self.state.lock().call_threads.clone()
    }

    pub fn connections(&self) -> u64 {
        self.state.lock().connections
    }

    pub fn subscribers(&self) -> usize {
        self.state.lock().observers.len()
    }

    pub fn session(&self) -> Option<String> {
        self.state.lock().session.clone()
    }

    pub fn user(&self) -> UserData {
        self.state.lock().user.clone()
    }

    /// Record `call`, wait out the configured latency, then either fail or
    /// run `f` against the state.
    fn serve<T>(
        &self,
        call: Call,
        f: impl FnOnce(&mut ServiceState) -> T,
    ) -> Result<T, SessionError> {
        let latency = {
            let mut state = self.state.lock();
            state.call_threads.insert(std::thread::current().id());
            state.calls.push(call.clone());
            state.latency
        };
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        let mut state = self.state.lock();
        if let Some(err) = state.failures.get(&call.kind()) {
            return Err(err.clone());
        }
        Ok(f(&mut state))
    }
}

/// One connection to a [`MemoryService`].
pub struct MemorySession {
    service: MemoryService,
    id: u64,
}

impl SessionConnection for MemorySession {
    fn is_logged_in(&mut self) -> Result<bool, SessionError> {
        self.service.serve(Call::IsLoggedIn, |s| s.logged_in)
    }

    fn login(&mut self) -> Result<(), SessionError> {
        self.service.serve(Call::Login, |s| s.logged_in = true)
    }

    fn logout(&mut self) -> Result<(), SessionError> {
        self.service.serve(Call::Logout, |s| s.logged_in = false)
    }

    fn can_change_status(&mut self) -> Result<bool, SessionError> {
        self.service
            .serve(Call::CanChangeStatus, |s| s.can_change_status)
    }

    fn count(&mut self, counter: Counter) -> Result<u32, SessionError> {
        self.service.serve(Call::Count(counter), |s| {
            s.counts.get(&counter).copied().unwrap_or(0)
        })
    }

    fn friends(&mut self) -> Result<Vec<Friend>, SessionError> {
        self.service.serve(Call::Friends, |s| s.friends.clone())
    }

    fn logged_in_user(&mut self) -> Result<UserData, SessionError> {
        self.service.serve(Call::LoggedInUser, |s| {
            if s.empty_user_replies > 0 {
                s.empty_user_replies -= 1;
                UserData::default()
            } else {
                s.user.clone()
            }
        })
    }

    fn set_status(&mut self, text: &str) -> Result<(), SessionError> {
        self.service.serve(Call::SetStatus(text.to_string()), |s| {
            s.user.status = Some(text.to_string());
        })
    }

    fn set_session(&mut self, session: &str) -> Result<(), SessionError> {
        self.service.serve(Call::SetSession(session.to_string()), |s| {
            s.session = Some(session.to_string());
        })
    }

    fn subscribe(&mut self, observer: Arc<dyn PushObserver>) -> Result<(), SessionError> {
        let mut state = self.service.state.lock();
        if state.refuse_connect {
            return Err(SessionError::NotConnected);
        }
        state.observers.retain(|(id, _)| *id != self.id);
        state.observers.push((self.id, observer));
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.service
            .state
            .lock()
            .observers
            .retain(|(id, _)| *id != self.id);
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.unsubscribe();
        tracing::debug!(connection = self.id, "memory session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeNotification;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver(AtomicUsize);

    impl PushObserver for CountingObserver {
        fn on_event(&self, _event: SessionEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_login_flips_state() {
        let service = MemoryService::new();
        let mut session = service.connect().unwrap();
        assert!(!session.is_logged_in().unwrap());
        session.login().unwrap();
        assert!(session.is_logged_in().unwrap());
        session.logout().unwrap();
        assert!(!session.is_logged_in().unwrap());
        assert_eq!(service.count_calls(CallKind::IsLoggedIn), 3);
    }

    #[test]
    fn test_injected_failure_until_cleared() {
        let service = MemoryService::new();
        let mut session = service.connect().unwrap();
        service.fail(CallKind::Friends, SessionError::Timeout);
        assert_eq!(session.friends(), Err(SessionError::Timeout));
        service.clear_failures();
        assert_eq!(session.friends(), Ok(Vec::new()));
    }

    #[test]
    fn test_empty_user_replies_run_out() {
        let service = MemoryService::new();
        service.set_user(UserData {
            uid: 1,
            name: "alice".to_string(),
            ..Default::default()
        });
        service.return_empty_user(1);
        let mut session = service.connect().unwrap();
        assert!(session.logged_in_user().unwrap().is_empty());
        assert_eq!(session.logged_in_user().unwrap().name, "alice");
    }

    #[test]
    fn test_refused_connection() {
        let service = MemoryService::new();
        service.refuse_connections(true);
        assert!(service.connect().is_err());
        assert!(service.factory().connect().is_err());
        assert_eq!(service.connections(), 0);
    }

    #[test]
    fn test_push_reaches_subscribers_until_drop() {
        let service = MemoryService::new();
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let mut session = service.connect().unwrap();
        session.subscribe(observer.clone()).unwrap();

        service.push(SessionEvent::DataChanged(ChangeNotification::Friends));
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);

        drop(session);
        assert_eq!(service.subscribers(), 0);
        service.push(SessionEvent::LanguageChanged);
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_status_updates_user() {
        let service = MemoryService::new();
        let mut session = service.connect().unwrap();
        session.set_status("coding").unwrap();
        assert_eq!(service.user().status.as_deref(), Some("coding"));
        assert_eq!(
            service.calls(),
            vec![Call::SetStatus("coding".to_string())]
        );
    }
}
