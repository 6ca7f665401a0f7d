//! Admission coordinator: join requests, departures and reviews.
//!
//! Each function runs inside one unit of work. The scope actor that calls
//! it guarantees nobody else mutates the same scope in between.

use super::permissions::{self, Capability};
use super::{AdmissionOutcome, LeaveOutcome, Moment, capacity, dispatcher, queue, registry};
use crate::db::{
    EntryStatus, Membership, MembershipId, MembershipStatus, Role, Scope, ScopeKind, UnitOfWork,
    WaitlistEntry,
};
use crate::error::AdmissionError;
use crate::notify::NotificationKind;
use tracing::{debug, info};

/// Decide what happens to `user_id` asking to join `scope`.
pub async fn request_join(
    uow: &mut UnitOfWork,
    scope: &Scope,
    user_id: &str,
    at: Moment,
) -> Result<AdmissionOutcome, AdmissionError> {
    let scope = &capacity::current(uow, scope).await?;
    if !scope.is_active() {
        return Err(AdmissionError::ScopeNotActive);
    }
    if let Some(existing) = registry::get_membership(uow, user_id, scope.id).await?
        && existing.status.is_active()
    {
        return Err(AdmissionError::AlreadyActive);
    }
    if uow.waitlist().find_live_for(scope.id, user_id).await?.is_some() {
        return Err(AdmissionError::AlreadyWaiting);
    }

    let role = Role::default_for(scope.kind);

    if scope.visibility.requires_review() {
        let membership = registry::create_or_reapply(
            uow,
            user_id,
            scope.id,
            MembershipStatus::Pending,
            role,
            at.now,
        )
        .await?;
        notify_reviewers(uow, scope, &membership).await?;
        debug!(scope_id = scope.id, user_id, "Join request awaiting review");
        return Ok(AdmissionOutcome::Pending(membership));
    }

    // Waiters are served before newcomers. Lapsed invitations are closed
    // and any free slot goes down the queue first; if anyone is still
    // waiting after that, the newcomer queues behind them.
    let (expired, _) = dispatcher::expire_scope_invitations(uow, scope, at).await?;
    let promoted = dispatcher::on_slot_freed(uow, scope, at).await?;
    if !expired.is_empty() || !promoted.is_empty() {
        debug!(
            scope_id = scope.id,
            expired = expired.len(),
            promoted = promoted.len(),
            "Caught up on the waitlist before admitting"
        );
    }

    let queue_ahead = queue::dequeue_head(uow, scope.id).await?.is_some();
    if queue_ahead || !capacity::has_free_slot(uow, scope, at.now).await? {
        let entry = queue::enqueue(uow, scope.id, user_id, at.now).await?;
        debug!(scope_id = scope.id, user_id, position = entry.position, "Waitlisted");
        return Ok(AdmissionOutcome::Waitlisted(entry));
    }

    let membership = registry::create_or_reapply(
        uow,
        user_id,
        scope.id,
        MembershipStatus::Accepted,
        role,
        at.now,
    )
    .await?;
    capacity::verify_ceiling(uow, scope, at.now).await?;
    debug!(scope_id = scope.id, user_id, "Admitted");
    Ok(AdmissionOutcome::Accepted(membership))
}

/// Everyone in the scope who may review applications.
async fn notify_reviewers(
    uow: &mut UnitOfWork,
    scope: &Scope,
    application: &Membership,
) -> Result<(), AdmissionError> {
    let reviewers: Vec<_> = uow
        .memberships()
        .list_accepted(scope.id)
        .await?
        .into_iter()
        .filter(|m| m.role.grants(Capability::ReviewApplications))
        .collect();
    for reviewer in reviewers {
        uow.notify(&reviewer.user_id, NotificationKind::JoinRequested, application.id);
    }
    Ok(())
}

/// `user_id` walks away: a pending application is withdrawn, an accepted
/// membership is canceled and its slot goes to the waitlist.
pub async fn leave(
    uow: &mut UnitOfWork,
    scope: &Scope,
    user_id: &str,
    at: Moment,
) -> Result<LeaveOutcome, AdmissionError> {
    let membership = registry::get_membership(uow, user_id, scope.id)
        .await?
        .filter(|m| m.status.is_active())
        .ok_or_else(|| AdmissionError::NotFound(format!("membership in scope {}", scope.id)))?;

    if membership.status == MembershipStatus::Pending {
        registry::withdraw(uow, &membership, user_id).await?;
        info!(scope_id = scope.id, user_id, "Application withdrawn");
        return Ok(LeaveOutcome::Withdrawn(membership));
    }

    let left = registry::transition(uow, membership.id, MembershipStatus::Canceled, user_id).await?;
    let promoted = dispatcher::on_slot_freed(uow, scope, at).await?;
    info!(scope_id = scope.id, user_id, promoted = promoted.len(), "Member left");
    Ok(LeaveOutcome::Left(left))
}

/// `user_id` gives up their waitlist place. A WAITING entry is deleted; an
/// INVITED one is declined, and the caller hands the slot on afterwards.
pub async fn leave_waitlist(
    uow: &mut UnitOfWork,
    scope: &Scope,
    user_id: &str,
) -> Result<WaitlistEntry, AdmissionError> {
    let entry = uow
        .waitlist()
        .find_live_for(scope.id, user_id)
        .await?
        .ok_or_else(|| AdmissionError::NotFound(format!("waitlist entry in scope {}", scope.id)))?;

    match entry.status {
        EntryStatus::Invited => dispatcher::decline_invitation(uow, entry.id, user_id).await,
        _ => {
            queue::remove(uow, entry.id).await?;
            debug!(scope_id = scope.id, user_id, "Left waitlist");
            Ok(entry)
        }
    }
}

/// PENDING → ACCEPTED. Deferred admission: capacity is not consulted.
pub async fn approve(
    uow: &mut UnitOfWork,
    membership_id: MembershipId,
    actor_id: &str,
) -> Result<Membership, AdmissionError> {
    let approved =
        registry::transition(uow, membership_id, MembershipStatus::Accepted, actor_id).await?;
    uow.notify(&approved.user_id, NotificationKind::MembershipApproved, approved.id);
    info!(
        scope_id = approved.scope_id,
        user_id = %approved.user_id,
        actor_id,
        "Application approved"
    );
    Ok(approved)
}

/// Decline an application, or remove an accepted member and refill the slot.
pub async fn reject(
    uow: &mut UnitOfWork,
    scope: &Scope,
    membership_id: MembershipId,
    actor_id: &str,
    at: Moment,
) -> Result<Membership, AdmissionError> {
    let current = registry::find(uow, membership_id).await?;
    let target = if current.status == MembershipStatus::Accepted {
        MembershipStatus::Rejected
    } else {
        MembershipStatus::Declined
    };

    let rejected = registry::transition(uow, membership_id, target, actor_id).await?;
    if target == MembershipStatus::Rejected {
        uow.notify(&rejected.user_id, NotificationKind::MemberRemoved, rejected.id);
        dispatcher::on_slot_freed(uow, scope, at).await?;
    } else {
        uow.notify(&rejected.user_id, NotificationKind::MembershipDeclined, rejected.id);
    }
    info!(
        scope_id = rejected.scope_id,
        user_id = %rejected.user_id,
        actor_id,
        status = %rejected.status,
        "Membership rejected"
    );
    Ok(rejected)
}

/// Change an accepted member's role. The last OWNER cannot be demoted.
pub async fn assign_role(
    uow: &mut UnitOfWork,
    membership_id: MembershipId,
    role: Role,
    actor_id: &str,
) -> Result<Membership, AdmissionError> {
    let target = registry::find(uow, membership_id).await?;
    permissions::require(uow, target.scope_id, actor_id, Capability::AssignRoles).await?;

    let not_member = || AdmissionError::InvalidTransition {
        from: target.status.as_str(),
        to: "ROLE_CHANGE",
    };
    if target.status != MembershipStatus::Accepted {
        return Err(not_member());
    }
    if target.role == Role::Owner && role != Role::Owner {
        registry::ensure_not_sole_owner(uow, target.scope_id).await?;
    }

    let updated = uow
        .memberships()
        .set_role(membership_id, role)
        .await?
        .ok_or_else(not_member)?;
    info!(
        scope_id = updated.scope_id,
        user_id = %updated.user_id,
        actor_id,
        role = ?role,
        "Role assigned"
    );
    Ok(updated)
}

/// Record an attendee's arrival at an event.
pub async fn check_in(
    uow: &mut UnitOfWork,
    scope: &Scope,
    membership_id: MembershipId,
    actor_id: &str,
    at: Moment,
) -> Result<Membership, AdmissionError> {
    let target = registry::find(uow, membership_id).await?;
    if target.user_id != actor_id {
        permissions::require(uow, target.scope_id, actor_id, Capability::CheckInAttendees).await?;
    }

    let invalid = || AdmissionError::InvalidTransition {
        from: target.status.as_str(),
        to: "CHECKED_IN",
    };
    if scope.kind != ScopeKind::Event || target.status != MembershipStatus::Accepted {
        return Err(invalid());
    }

    uow.memberships()
        .set_check_in(membership_id, at.now)
        .await?
        .ok_or_else(invalid)
}

/// Seed the creator's membership with the founding role.
pub async fn found_scope(
    uow: &mut UnitOfWork,
    scope: &Scope,
    creator_id: &str,
    at: Moment,
) -> Result<Membership, AdmissionError> {
    let founder = registry::create_or_reapply(
        uow,
        creator_id,
        scope.id,
        MembershipStatus::Accepted,
        Role::founder_for(scope.kind),
        at.now,
    )
    .await?;
    info!(scope_id = scope.id, user_id = creator_id, role = ?founder.role, "Scope founded");
    Ok(founder)
}
