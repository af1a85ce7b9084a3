//! The connection contract the bridge worker drives.

use std::sync::Arc;

use crate::error::SessionError;
use crate::event::SessionEvent;
use crate::model::{Counter, Friend, UserData};

/// Receives push notifications from a session.
///
/// Implementations must be cheap and non-blocking: the session may call
/// [`on_event`](PushObserver::on_event) from its own I/O thread.
pub trait PushObserver: Send + Sync + 'static {
    fn on_event(&self, event: SessionEvent);
}

/// A live connection to the social service.
///
/// A connection is created on, and only ever used from, a single bridge worker
/// thread, so implementations do not need to be `Send` or `Sync`.
pub trait SessionConnection {
    fn is_logged_in(&mut self) -> Result<bool, SessionError>;

    fn login(&mut self) -> Result<(), SessionError>;

    fn logout(&mut self) -> Result<(), SessionError>;

    fn can_change_status(&mut self) -> Result<bool, SessionError>;

    fn count(&mut self, counter: Counter) -> Result<u32, SessionError>;

    fn friends(&mut self) -> Result<Vec<Friend>, SessionError>;

    /// May return an empty [`UserData`] transiently; see [`UserData::is_empty`].
    fn logged_in_user(&mut self) -> Result<UserData, SessionError>;

    fn set_status(&mut self, text: &str) -> Result<(), SessionError>;

    /// Hand the service a session/cookie string obtained elsewhere (e.g. the
    /// browser's login page).
    fn set_session(&mut self, session: &str) -> Result<(), SessionError>;

    /// Start delivering push notifications to `observer`. Replaces any
    /// previous observer.
    fn subscribe(&mut self, observer: Arc<dyn PushObserver>) -> Result<(), SessionError>;

    fn unsubscribe(&mut self);
}

/// Opens session connections. Called on the worker thread that will own the
/// resulting connection.
pub trait SessionFactory: Send + Sync + 'static {
    fn connect(&self) -> Result<Box<dyn SessionConnection>, SessionError>;
}

impl<F> SessionFactory for F
where
    F: Fn() -> Result<Box<dyn SessionConnection>, SessionError> + Send + Sync + 'static,
{
    fn connect(&self) -> Result<Box<dyn SessionConnection>, SessionError> {
        self()
    }
}
