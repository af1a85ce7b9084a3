//! Unsolicited notifications pushed by the remote session.

use serde::{Deserialize, Serialize};

use crate::model::Counter;

/// Names the piece of user data that went stale on the service side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeNotification {
    /// Logged in or out somewhere else.
    LoginState,
    /// Permission to change the status line.
    StatusPermission,
    /// A single counter changed.
    Count(Counter),
    /// Every counter should be considered stale.
    Counts,
    Friends,
    LoggedInUser,
}

/// Events the session delivers to its [`PushObserver`](crate::PushObserver).
///
/// These may arrive on any thread, including while the bridge worker is in
/// the middle of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Cached data named by the notification is out of date.
    DataChanged(ChangeNotification),
    /// The user switched the UI language.
    LanguageChanged,
}
