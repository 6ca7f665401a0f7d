//! Waitlist database models.

use crate::db::{EntryId, ScopeId, UserId};
use serde::Serialize;
use std::fmt;

/// A scope's waitlist. `next_position` only ever grows, so positions are
/// never handed out twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Waitlist {
    pub id: i64,
    pub scope_id: ScopeId,
    pub next_position: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Waiting,
    Invited,
    Declined,
    Expired,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Waiting => "WAITING",
            EntryStatus::Invited => "INVITED",
            EntryStatus::Declined => "DECLINED",
            EntryStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's place in a scope's waitlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct WaitlistEntry {
    pub id: EntryId,
    pub waitlist_id: i64,
    /// Denormalized from the waitlist so callers can route by scope.
    pub scope_id: ScopeId,
    pub user_id: UserId,
    pub position: i64,
    pub status: EntryStatus,
    pub joined_at: i64,
    pub invitation_expires_at: Option<i64>,
}

impl WaitlistEntry {
    /// An INVITED entry whose window is still open at `now`.
    pub fn invitation_open(&self, now: i64) -> bool {
        self.status == EntryStatus::Invited
            && self.invitation_expires_at.is_some_and(|at| at > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: EntryStatus, expires: Option<i64>) -> WaitlistEntry {
        WaitlistEntry {
            id: 1,
            waitlist_id: 1,
            scope_id: 1,
            user_id: "carol".to_string(),
            position: 1,
            status,
            joined_at: 0,
            invitation_expires_at: expires,
        }
    }

    #[test]
    fn invitation_open_requires_invited_and_future_expiry() {
        assert!(entry(EntryStatus::Invited, Some(10)).invitation_open(9));
        assert!(!entry(EntryStatus::Invited, Some(10)).invitation_open(10));
        assert!(!entry(EntryStatus::Invited, None).invitation_open(0));
        assert!(!entry(EntryStatus::Waiting, Some(10)).invitation_open(0));
        assert!(!entry(EntryStatus::Declined, Some(10)).invitation_open(0));
    }
}
