use crate::db::{EntryId, Membership, MembershipId, Role, UserId, WaitlistEntry};
use crate::error::AdmissionError;
use serde::Serialize;
use tokio::sync::oneshot;

/// Reply channel carried by every event.
pub type Reply<T> = oneshot::Sender<Result<T, AdmissionError>>;

/// Result of a join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum AdmissionOutcome {
    /// Admitted on the spot.
    Accepted(Membership),
    /// Waiting for a reviewer.
    Pending(Membership),
    /// Scope full; placed at the tail of the waitlist.
    Waitlisted(WaitlistEntry),
}

impl AdmissionOutcome {
    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            AdmissionOutcome::Accepted(_) => "accepted",
            AdmissionOutcome::Pending(_) => "pending",
            AdmissionOutcome::Waitlisted(_) => "waitlisted",
        }
    }
}

/// Result of leaving a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// An accepted membership, now CANCELED.
    Left(Membership),
    /// A pending application, now deleted. Carries the row as it was.
    Withdrawn(Membership),
}

/// Events that can be sent to a Scope Actor.
#[derive(Debug)]
pub enum ScopeEvent {
    /// User asking to join.
    RequestJoin {
        user_id: UserId,
        reply_tx: Reply<AdmissionOutcome>,
    },
    /// User leaving, or withdrawing an application.
    Leave {
        user_id: UserId,
        reply_tx: Reply<LeaveOutcome>,
    },
    /// User giving up their waitlist place.
    LeaveWaitlist {
        user_id: UserId,
        reply_tx: Reply<WaitlistEntry>,
    },
    Approve {
        membership_id: MembershipId,
        actor_id: UserId,
        reply_tx: Reply<Membership>,
    },
    Reject {
        membership_id: MembershipId,
        actor_id: UserId,
        reply_tx: Reply<Membership>,
    },
    AssignRole {
        membership_id: MembershipId,
        role: Role,
        actor_id: UserId,
        reply_tx: Reply<Membership>,
    },
    CheckIn {
        membership_id: MembershipId,
        actor_id: UserId,
        reply_tx: Reply<Membership>,
    },
    AcceptInvitation {
        entry_id: EntryId,
        user_id: UserId,
        reply_tx: Reply<Membership>,
    },
    DeclineInvitation {
        entry_id: EntryId,
        user_id: UserId,
        reply_tx: Reply<WaitlistEntry>,
    },
    InviteFromWaitlist {
        entry_id: EntryId,
        actor_id: UserId,
        reply_tx: Reply<WaitlistEntry>,
    },
    /// Capacity may have opened up; promote from the waitlist.
    SlotFreed { reply_tx: Reply<Vec<WaitlistEntry>> },
    /// Expire invitations that lapsed at or before `now`. Replies with the
    /// number expired.
    ExpireInvitations { now: i64, reply_tx: Reply<usize> },
    /// Seed the creator's founding membership.
    Found {
        owner_id: UserId,
        reply_tx: Reply<Membership>,
    },
}
