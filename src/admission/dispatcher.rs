//! Invitation dispatcher: turns freed slots into time-boxed invitations
//! for the head of the waitlist, and settles those invitations.

use super::permissions::{self, Capability};
use super::{Moment, capacity, queue, registry};
use crate::db::{EntryId, EntryStatus, Membership, MembershipStatus, Role, Scope, UnitOfWork, WaitlistEntry};
use crate::error::AdmissionError;
use crate::notify::NotificationKind;
use tracing::{debug, info};

/// Promote waiters while there is room: one invitation per free slot, or
/// the whole queue for an unbounded scope. An empty waitlist is a no-op.
pub async fn on_slot_freed(
    uow: &mut UnitOfWork,
    scope: &Scope,
    at: Moment,
) -> Result<Vec<WaitlistEntry>, AdmissionError> {
    let mut promoted = Vec::new();
    let scope = &capacity::current(uow, scope).await?;
    if !scope.is_active() {
        return Ok(promoted);
    }

    while capacity::has_free_slot(uow, scope, at.now).await? {
        let Some(head) = queue::dequeue_head(uow, scope.id).await? else {
            break;
        };
        let invited = queue::mark_invited(uow, head.id, at.invitation_deadline()).await?;
        uow.notify(&invited.user_id, NotificationKind::WaitlistInvitation, invited.id);
        info!(
            scope_id = scope.id,
            user_id = %invited.user_id,
            entry_id = invited.id,
            expires_at = at.invitation_deadline(),
            "Waitlist head invited"
        );
        promoted.push(invited);
    }

    Ok(promoted)
}

/// Take up an open invitation: the user becomes ACCEPTED and the entry
/// leaves the waitlist, together or not at all.
pub async fn accept_invitation(
    uow: &mut UnitOfWork,
    scope: &Scope,
    entry_id: EntryId,
    user_id: &str,
    at: Moment,
) -> Result<Membership, AdmissionError> {
    let entry = queue::find(uow, entry_id).await?;
    if entry.user_id != user_id {
        return Err(AdmissionError::PermissionDenied);
    }
    if !capacity::current(uow, scope).await?.is_active() {
        return Err(AdmissionError::ScopeNotActive);
    }
    if !entry.invitation_open(at.now) {
        return Err(AdmissionError::InvitationNotPending);
    }

    let membership = registry::create_or_reapply(
        uow,
        user_id,
        scope.id,
        MembershipStatus::Accepted,
        Role::default_for(scope.kind),
        at.now,
    )
    .await?;
    queue::remove(uow, entry.id).await?;

    info!(scope_id = scope.id, user_id, membership_id = membership.id, "Invitation accepted");
    Ok(membership)
}

/// Turn an open invitation down. The freed slot is handed on by a separate
/// unit of work once this one commits.
pub async fn decline_invitation(
    uow: &mut UnitOfWork,
    entry_id: EntryId,
    user_id: &str,
) -> Result<WaitlistEntry, AdmissionError> {
    let entry = queue::find(uow, entry_id).await?;
    if entry.user_id != user_id {
        return Err(AdmissionError::PermissionDenied);
    }
    let declined = queue::mark_declined_or_expired(uow, entry.id, EntryStatus::Declined).await?;
    debug!(scope_id = declined.scope_id, user_id, entry_id, "Invitation declined");
    Ok(declined)
}

/// Close every lapsed invitation of `scope`, then refill the slots they held.
/// Returns (expired, promoted).
pub async fn expire_scope_invitations(
    uow: &mut UnitOfWork,
    scope: &Scope,
    at: Moment,
) -> Result<(Vec<WaitlistEntry>, Vec<WaitlistEntry>), AdmissionError> {
    let lapsed = uow.waitlist().expired_invitations(scope.id, at.now).await?;

    let mut expired = Vec::with_capacity(lapsed.len());
    for entry in lapsed {
        // Lost to an accept or decline earlier in the mailbox.
        if !uow.waitlist().close_invitation(entry.id, EntryStatus::Expired).await? {
            continue;
        }
        uow.notify(&entry.user_id, NotificationKind::InvitationExpired, entry.id);
        expired.push(WaitlistEntry {
            status: EntryStatus::Expired,
            ..entry
        });
    }

    let promoted = if expired.is_empty() {
        Vec::new()
    } else {
        on_slot_freed(uow, scope, at).await?
    };
    Ok((expired, promoted))
}

/// Invite a specific waiter out of turn. Like an approval this skips both
/// FIFO order and the capacity check.
pub async fn invite_manually(
    uow: &mut UnitOfWork,
    entry_id: EntryId,
    actor_id: &str,
    at: Moment,
) -> Result<WaitlistEntry, AdmissionError> {
    let entry = queue::find(uow, entry_id).await?;
    permissions::require(uow, entry.scope_id, actor_id, Capability::InviteFromWaitlist).await?;

    let invited = queue::mark_invited(uow, entry.id, at.invitation_deadline()).await?;
    uow.notify(&invited.user_id, NotificationKind::WaitlistInvitation, invited.id);
    info!(
        scope_id = invited.scope_id,
        user_id = %invited.user_id,
        actor_id,
        "Waiter invited out of turn"
    );
    Ok(invited)
}
