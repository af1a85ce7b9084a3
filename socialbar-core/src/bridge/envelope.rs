//! Envelope: one unit of work handed from a caller thread to the worker.

use std::thread::ThreadId;

use socialbar_session::{ChangeNotification, Counter};

use super::cache::Fact;

/// What the worker should do with an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    IsLoggedIn,
    LogIn,
    LogOut,
    CanChangeStatus,
    GetCount(Counter),
    GetFriends,
    GetLoggedInUser,
    SetStatus(String),
    /// Session/cookie string handed over from the browser.
    SetSession(String),
    /// Pushed by the session: refresh the named facts.
    DataUpdate(ChangeNotification),
    /// Pushed by the session: UI language changed.
    LanguageUpdate,
}

impl Operation {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::IsLoggedIn => "is_logged_in",
            Operation::LogIn => "log_in",
            Operation::LogOut => "log_out",
            Operation::CanChangeStatus => "can_change_status",
            Operation::GetCount(_) => "get_count",
            Operation::GetFriends => "get_friends",
            Operation::GetLoggedInUser => "get_logged_in_user",
            Operation::SetStatus(_) => "set_status",
            Operation::SetSession(_) => "set_session",
            Operation::DataUpdate(_) => "data_update",
            Operation::LanguageUpdate => "language_update",
        }
    }

    /// The cached fact a query operation refreshes.
    pub fn fact(&self) -> Option<Fact> {
        match self {
            Operation::IsLoggedIn => Some(Fact::LoginState),
            Operation::CanChangeStatus => Some(Fact::StatusPermission),
            Operation::GetCount(counter) => Some(Fact::Count(*counter)),
            Operation::GetFriends => Some(Fact::Friends),
            Operation::GetLoggedInUser => Some(Fact::LoggedInUser),
            Operation::LogIn
            | Operation::LogOut
            | Operation::SetStatus(_)
            | Operation::SetSession(_)
            | Operation::DataUpdate(_)
            | Operation::LanguageUpdate => None,
        }
    }

    /// True for operations that originate from session pushes rather than
    /// facade calls.
    pub fn is_push(&self) -> bool {
        matches!(self, Operation::DataUpdate(_) | Operation::LanguageUpdate)
    }
}

/// Immutable request record queued on a bridge.
///
/// Fields:
/// - `seq`: per-bridge sequence number; queue order is `seq` order.
/// - `origin_thread`: the thread to signal, normally the bridge's owner.
/// - `timestamp_ms`: UTC milliseconds when the envelope was created.
#[derive(Debug, Clone)]
pub struct Envelope {
    seq: u64,
    operation: Operation,
    origin_thread: ThreadId,
    timestamp_ms: i64,
}

impl Envelope {
    /// Envelope originating on the current thread.
    #[cfg(test)]
    pub(crate) fn new(seq: u64, operation: Operation) -> Self {
        Self::with_origin(seq, operation, std::thread::current().id())
    }

    pub fn with_origin(seq: u64, operation: Operation, origin_thread: ThreadId) -> Self {
        Self {
            seq,
            operation,
            origin_thread,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn origin_thread(&self) -> ThreadId {
        self.origin_thread
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Text payload of status and session mutations.
    pub fn status_text(&self) -> Option<&str> {
        match &self.operation {
            Operation::SetStatus(text) | Operation::SetSession(text) => Some(text),
            _ => None,
        }
    }

    pub fn change_event(&self) -> Option<ChangeNotification> {
        match self.operation {
            Operation::DataUpdate(change) => Some(change),
            _ => None,
        }
    }
}
