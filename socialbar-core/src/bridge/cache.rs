//! Last-known user data and which parts of it have been fetched.

use std::collections::HashSet;

use serde::Serialize;
use socialbar_session::{ChangeNotification, Counter, Friend, UserData};

/// One independently cached piece of user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fact {
    LoginState,
    StatusPermission,
    Count(Counter),
    Friends,
    LoggedInUser,
}

/// The facts a push notification makes stale, in refresh order.
pub fn facts_for(change: ChangeNotification) -> Vec<Fact> {
    match change {
        ChangeNotification::LoginState => vec![Fact::LoginState],
        ChangeNotification::StatusPermission => vec![Fact::StatusPermission],
        ChangeNotification::Count(counter) => vec![Fact::Count(counter)],
        ChangeNotification::Counts => Counter::ALL.iter().copied().map(Fact::Count).collect(),
        ChangeNotification::Friends => vec![Fact::Friends],
        ChangeNotification::LoggedInUser => vec![Fact::LoggedInUser],
    }
}

/// Cached values as seen by facade callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSnapshot {
    pub is_logged_in: bool,
    pub can_change_status: bool,
    pub pokes_count: u32,
    pub messages_count: u32,
    pub requests_count: u32,
    pub events_count: u32,
    pub group_invites_count: u32,
    pub friends: Vec<Friend>,
    pub logged_in_user: UserData,
}

impl CacheSnapshot {
    pub fn count(&self, counter: Counter) -> u32 {
        match counter {
            Counter::Pokes => self.pokes_count,
            Counter::Messages => self.messages_count,
            Counter::Requests => self.requests_count,
            Counter::Events => self.events_count,
            Counter::GroupInvites => self.group_invites_count,
        }
    }

    fn count_mut(&mut self, counter: Counter) -> &mut u32 {
        match counter {
            Counter::Pokes => &mut self.pokes_count,
            Counter::Messages => &mut self.messages_count,
            Counter::Requests => &mut self.requests_count,
            Counter::Events => &mut self.events_count,
            Counter::GroupInvites => &mut self.group_invites_count,
        }
    }
}

/// A change produced by a worker handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    LoginState(bool),
    StatusPermission(bool),
    Count(Counter, u32),
    Friends(Vec<Friend>),
    LoggedInUser(UserData),
    /// The user's status line was changed through this bridge.
    Status(String),
    /// Logout succeeded: everything user-specific is gone.
    LoggedOut,
}

/// Snapshot plus the set of facts that have had at least one successful fetch.
#[derive(Debug, Default)]
pub struct Cache {
    snapshot: CacheSnapshot,
    fetched: HashSet<Fact>,
}

impl Cache {
    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }

    /// False until the first successful fetch of `fact`; a facade call for an
    /// unfetched fact always goes to the session.
    pub fn is_fetched(&self, fact: Fact) -> bool {
        self.fetched.contains(&fact)
    }

    pub fn apply(&mut self, update: CacheUpdate) {
        match update {
            CacheUpdate::LoginState(value) => {
                self.snapshot.is_logged_in = value;
                self.fetched.insert(Fact::LoginState);
            }
            CacheUpdate::StatusPermission(value) => {
                self.snapshot.can_change_status = value;
                self.fetched.insert(Fact::StatusPermission);
            }
            CacheUpdate::Count(counter, value) => {
                *self.snapshot.count_mut(counter) = value;
                self.fetched.insert(Fact::Count(counter));
            }
            CacheUpdate::Friends(friends) => {
                self.snapshot.friends = friends;
                self.fetched.insert(Fact::Friends);
            }
            CacheUpdate::LoggedInUser(user) => {
                self.snapshot.logged_in_user = user;
                self.fetched.insert(Fact::LoggedInUser);
            }
            // Only patches a user record we actually have.
            CacheUpdate::Status(text) => {
                if self.fetched.contains(&Fact::LoggedInUser) {
                    self.snapshot.logged_in_user.status = Some(text);
                }
            }
            CacheUpdate::LoggedOut => {
                self.snapshot = CacheSnapshot::default();
                self.fetched.clear();
                self.fetched.insert(Fact::LoginState);
            }
        }
    }

    /// Apply a batch of updates; callers hold the bridge lock across the call
    /// so readers never see half of a batch.
    pub fn apply_all(&mut self, updates: impl IntoIterator<Item = CacheUpdate>) {
        for update in updates {
            self.apply(update);
        }
    }
}
