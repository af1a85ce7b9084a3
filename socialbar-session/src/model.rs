//! Data returned by the remote session.

use serde::{Deserialize, Serialize};

/// One entry of the logged-in user's friend list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub uid: u64,
    pub name: String,
    pub status: Option<String>,
    pub online: bool,
    pub picture_url: Option<String>,
}

/// The logged-in user's own record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub uid: u64,
    pub name: String,
    /// Current status line, if the user has one set.
    pub status: Option<String>,
    pub picture_url: Option<String>,
}

impl UserData {
    /// The service occasionally answers with a blank record right after login.
    pub fn is_empty(&self) -> bool {
        self.uid == 0 && self.name.is_empty()
    }
}

/// Notification counters shown on the toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Pokes,
    Messages,
    Requests,
    Events,
    GroupInvites,
}

impl Counter {
    pub const ALL: [Counter; 5] = [
        Counter::Pokes,
        Counter::Messages,
        Counter::Requests,
        Counter::Events,
        Counter::GroupInvites,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_is_empty() {
        assert!(UserData::default().is_empty());
    }

    #[test]
    fn test_user_with_name_is_not_empty() {
        let user = UserData {
            name: "alice".to_string(),
            ..Default::default()
        };
        assert!(!user.is_empty());

        let user = UserData {
            uid: 7,
            ..Default::default()
        };
        assert!(!user.is_empty());
    }

    #[test]
    fn test_counter_serializes_snake_case() {
        let json = serde_json::to_string(&Counter::GroupInvites).unwrap();
        assert_eq!(json, "\"group_invites\"");
    }
}
