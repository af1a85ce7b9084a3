//! The worker thread: owns the session, drains the queue, fills the cache.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use socialbar_session::{
    PushObserver, SessionConnection, SessionError, SessionFactory, UserData,
};

use super::cache::{facts_for, CacheUpdate, Fact};
use super::callback::ViewChange;
use super::envelope::{Envelope, Operation};
use super::{Inner, WorkerState};
use crate::error::BridgeError;
use crate::event::PushForwarder;

/// Start the worker for `inner` on a new named thread.
pub(crate) fn spawn(
    inner: Arc<Inner>,
    factory: Arc<dyn SessionFactory>,
    thread_name: String,
) -> Result<JoinHandle<()>, BridgeError> {
    std::thread::Builder::new()
        .name(thread_name)
        .spawn(move || Worker::new(inner, factory).run())
        .map_err(BridgeError::Spawn)
}

struct Worker {
    inner: Arc<Inner>,
    factory: Arc<dyn SessionFactory>,
    push: Arc<dyn PushObserver>,
    /// Created and used only on this thread.
    session: Option<Box<dyn SessionConnection>>,
}

impl Worker {
    fn new(inner: Arc<Inner>, factory: Arc<dyn SessionFactory>) -> Self {
        let push: Arc<dyn PushObserver> = Arc::new(PushForwarder::new(&inner));
        Self {
            inner,
            factory,
            push,
            session: None,
        }
    }

    fn run(mut self) {
        tracing::info!(owner = ?self.inner.owner, "bridge worker started");
        if let Err(e) = self.connect() {
            tracing::warn!(error = %e, "session connect failed, will retry on next request");
        }
        while let Some(envelope) = self.next_envelope() {
            self.process(envelope);
        }
        self.terminate();
    }

    /// Block until there is work or a stop request. `None` means stop.
    fn next_envelope(&self) -> Option<Envelope> {
        let mut shared = self.inner.shared.lock();
        loop {
            if shared.state.is_stopped() {
                return None;
            }
            if let Some(envelope) = shared.queue.pop_front() {
                shared.state = WorkerState::Draining;
                return Some(envelope);
            }
            shared.state = WorkerState::Idle;
            self.inner.work_ready.wait(&mut shared);
        }
    }

    fn process(&mut self, envelope: Envelope) {
        let operation = envelope.operation();
        let span = tracing::debug_span!(
            "request",
            seq = envelope.seq(),
            operation = operation.name(),
            push = operation.is_push(),
            queued_at = envelope.timestamp_ms()
        );
        let _enter = span.enter();

        let (updates, change) = match self.handle(operation) {
            Ok(updates) => (updates, view_change(operation)),
            Err(e) => {
                tracing::warn!(error = %e, "session request failed, keeping cached value");
                (Vec::new(), None)
            }
        };
        if let Some(delivery) = self.inner.complete(envelope.seq(), updates, change) {
            delivery.deliver();
        }
    }

    fn handle(&mut self, operation: &Operation) -> Result<Vec<CacheUpdate>, SessionError> {
        let retry_limit = self.inner.config.user_retry_limit;
        let session = self.session()?;
        match catch_unwind(AssertUnwindSafe(|| dispatch(session, operation, retry_limit))) {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("session panicked, dropping connection");
                self.session = None;
                Err(SessionError::Unavailable("session panicked".to_string()))
            }
        }
    }

    fn session(&mut self) -> Result<&mut (dyn SessionConnection + 'static), SessionError> {
        if self.session.is_none() {
            self.connect()?;
        }
        self.session
            .as_deref_mut()
            .ok_or(SessionError::NotConnected)
    }

    fn connect(&mut self) -> Result<(), SessionError> {
        let mut session = self.factory.connect()?;
        if let Err(e) = session.subscribe(Arc::clone(&self.push)) {
            tracing::warn!(error = %e, "push subscription failed");
        }
        self.session = Some(session);
        tracing::info!("session connected");
        Ok(())
    }

    fn terminate(mut self) {
        let dropped = {
            let mut shared = self.inner.shared.lock();
            let dropped = shared.queue.len();
            shared.queue.clear();
            shared.state = WorkerState::Terminated;
            self.inner.work_done.notify_all();
            dropped
        };
        if dropped > 0 {
            tracing::debug!(dropped, "discarded queued requests on stop");
        }
        if let Some(mut session) = self.session.take() {
            session.unsubscribe();
        }
        self.inner.listeners.clear();
        tracing::info!(owner = ?self.inner.owner, "bridge worker stopped");
    }
}

/// Run exactly one session interaction for `operation`.
fn dispatch(
    session: &mut dyn SessionConnection,
    operation: &Operation,
    retry_limit: u32,
) -> Result<Vec<CacheUpdate>, SessionError> {
    let update = match operation {
        Operation::IsLoggedIn => fetch(session, Fact::LoginState, retry_limit)?,
        Operation::CanChangeStatus => fetch(session, Fact::StatusPermission, retry_limit)?,
        Operation::GetCount(counter) => fetch(session, Fact::Count(*counter), retry_limit)?,
        Operation::GetFriends => fetch(session, Fact::Friends, retry_limit)?,
        Operation::GetLoggedInUser => fetch(session, Fact::LoggedInUser, retry_limit)?,
        Operation::LogIn => {
            session.login()?;
            CacheUpdate::LoginState(true)
        }
        Operation::LogOut => {
            session.logout()?;
            CacheUpdate::LoggedOut
        }
        Operation::SetStatus(text) => {
            session.set_status(text)?;
            CacheUpdate::Status(text.clone())
        }
        Operation::SetSession(cookies) => {
            session.set_session(cookies)?;
            return Ok(Vec::new());
        }
        Operation::DataUpdate(change) => {
            return facts_for(*change)
                .into_iter()
                .map(|fact| fetch(&mut *session, fact, retry_limit))
                .collect();
        }
        Operation::LanguageUpdate => return Ok(Vec::new()),
    };
    Ok(vec![update])
}

fn fetch(
    session: &mut dyn SessionConnection,
    fact: Fact,
    retry_limit: u32,
) -> Result<CacheUpdate, SessionError> {
    Ok(match fact {
        Fact::LoginState => CacheUpdate::LoginState(session.is_logged_in()?),
        Fact::StatusPermission => CacheUpdate::StatusPermission(session.can_change_status()?),
        Fact::Count(counter) => CacheUpdate::Count(counter, session.count(counter)?),
        Fact::Friends => CacheUpdate::Friends(session.friends()?),
        Fact::LoggedInUser => CacheUpdate::LoggedInUser(fetch_user(session, retry_limit)?),
    })
}

/// The service sometimes returns a blank user record right after login.
/// Ask again, but at most `retry_limit` times, then take what we got.
fn fetch_user(
    session: &mut dyn SessionConnection,
    retry_limit: u32,
) -> Result<UserData, SessionError> {
    let mut retries = 0;
    loop {
        let user = session.logged_in_user()?;
        if !user.is_empty() {
            return Ok(user);
        }
        if retries >= retry_limit {
            tracing::debug!(retries, "accepting empty user record");
            return Ok(user);
        }
        retries += 1;
        tracing::debug!(retries, "empty user record, asking again");
    }
}

fn view_change(operation: &Operation) -> Option<ViewChange> {
    match operation {
        Operation::DataUpdate(change) => Some(ViewChange::Data(*change)),
        Operation::LanguageUpdate => Some(ViewChange::Language),
        _ => None,
    }
}
