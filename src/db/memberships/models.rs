//! Membership database models.

use crate::db::{MembershipId, ScopeId, ScopeKind, UserId};
use serde::Serialize;
use std::fmt;

/// A member's role within a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Owner,
    Admin,
    Organizer,
    Moderator,
    Member,
    Attendee,
    Host,
}

impl Role {
    /// Role given to ordinary joiners.
    pub fn default_for(kind: ScopeKind) -> Self {
        match kind {
            ScopeKind::Group => Role::Member,
            ScopeKind::Event => Role::Attendee,
        }
    }

    /// Role given to whoever creates the scope.
    pub fn founder_for(kind: ScopeKind) -> Self {
        match kind {
            ScopeKind::Group => Role::Owner,
            ScopeKind::Event => Role::Organizer,
        }
    }
}

/// Membership lifecycle. Only `Pending` is non-terminal within a cycle;
/// `Accepted` is the live state a cycle ends in until someone leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipStatus {
    Pending,
    Accepted,
    Declined,
    Rejected,
    Canceled,
}

impl MembershipStatus {
    /// PENDING or ACCEPTED: the user holds a live relationship with the scope.
    pub fn is_active(self) -> bool {
        matches!(self, MembershipStatus::Pending | MembershipStatus::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MembershipStatus::Pending => "PENDING",
            MembershipStatus::Accepted => "ACCEPTED",
            MembershipStatus::Declined => "DECLINED",
            MembershipStatus::Rejected => "REJECTED",
            MembershipStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's relationship with a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Membership {
    pub id: MembershipId,
    pub user_id: UserId,
    pub scope_id: ScopeId,
    pub role: Role,
    pub status: MembershipStatus,
    pub joined_at: i64,
    pub check_in_time: Option<i64>,
}
