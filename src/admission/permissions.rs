//! Capabilities and which roles hold them.

use crate::db::{Membership, MembershipStatus, Role, ScopeId, UnitOfWork};
use crate::error::AdmissionError;

/// Something a member may be allowed to do to other people's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ReviewApplications,
    RemoveMembers,
    AssignRoles,
    ViewWaitlist,
    InviteFromWaitlist,
    CheckInAttendees,
}

impl Role {
    /// Whether this role carries `cap`.
    pub fn grants(self, cap: Capability) -> bool {
        match self {
            Role::Owner => true,
            Role::Admin | Role::Organizer | Role::Host => cap != Capability::AssignRoles,
            Role::Moderator => matches!(
                cap,
                Capability::ReviewApplications
                    | Capability::ViewWaitlist
                    | Capability::CheckInAttendees
            ),
            Role::Member | Role::Attendee => false,
        }
    }
}

/// Who may drive a membership into a given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// A member of the scope holding this capability.
    Capability(Capability),
    /// Only the membership's own user.
    SelfOnly,
}

impl Authority {
    /// Authority for moving a membership into `to`, or `None` when no edge
    /// ends in that status.
    pub fn for_target(to: MembershipStatus) -> Option<Self> {
        match to {
            MembershipStatus::Accepted | MembershipStatus::Declined => {
                Some(Authority::Capability(Capability::ReviewApplications))
            }
            MembershipStatus::Rejected => Some(Authority::Capability(Capability::RemoveMembers)),
            MembershipStatus::Canceled => Some(Authority::SelfOnly),
            MembershipStatus::Pending => None,
        }
    }
}

/// The actor's ACCEPTED membership in `scope_id`, provided its role grants
/// `cap`. Anything else is `PermissionDenied`.
pub async fn require(
    uow: &mut UnitOfWork,
    scope_id: ScopeId,
    actor_id: &str,
    cap: Capability,
) -> Result<Membership, AdmissionError> {
    match uow.memberships().find_for(actor_id, scope_id).await? {
        Some(m) if m.status == MembershipStatus::Accepted && m.role.grants(cap) => Ok(m),
        _ => Err(AdmissionError::PermissionDenied),
    }
}

/// Check `authority` for `actor_id` acting on `target`.
pub async fn authorize(
    uow: &mut UnitOfWork,
    target: &Membership,
    actor_id: &str,
    authority: Authority,
) -> Result<(), AdmissionError> {
    match authority {
        Authority::SelfOnly if target.user_id == actor_id => Ok(()),
        Authority::SelfOnly => Err(AdmissionError::PermissionDenied),
        Authority::Capability(cap) => require(uow, target.scope_id, actor_id, cap)
            .await
            .map(|_| ()),
    }
}
