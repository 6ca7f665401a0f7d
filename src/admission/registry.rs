//! Membership registry: the membership state machine on top of
//! [`MembershipRepository`](crate::db::MembershipRepository).
//!
//! ```text
//! PENDING ──approve──▶ ACCEPTED ──leave──▶ CANCELED
//!    │                    └──────remove──▶ REJECTED
//!    ├──reject──▶ DECLINED
//!    └──withdraw──▶ (row deleted)
//! ```
//!
//! Terminal rows come back to life through [`create_or_reapply`].

use super::permissions::{self, Authority};
use crate::db::{Membership, MembershipId, MembershipStatus, Role, ScopeId, UnitOfWork};
use crate::error::AdmissionError;

pub async fn get_membership(
    uow: &mut UnitOfWork,
    user_id: &str,
    scope_id: ScopeId,
) -> Result<Option<Membership>, AdmissionError> {
    Ok(uow.memberships().find_for(user_id, scope_id).await?)
}

pub async fn find(uow: &mut UnitOfWork, id: MembershipId) -> Result<Membership, AdmissionError> {
    uow.memberships()
        .find(id)
        .await?
        .ok_or_else(|| AdmissionError::NotFound(format!("membership {id}")))
}

/// Start a new cycle for `user_id`: insert a row, or reuse a terminal one.
pub async fn create_or_reapply(
    uow: &mut UnitOfWork,
    user_id: &str,
    scope_id: ScopeId,
    initial: MembershipStatus,
    role: Role,
    now: i64,
) -> Result<Membership, AdmissionError> {
    match uow.memberships().find_for(user_id, scope_id).await? {
        Some(existing) if existing.status.is_active() => Err(AdmissionError::AlreadyActive),
        Some(existing) => uow
            .memberships()
            .reapply(existing.id, initial, role, now)
            .await?
            .ok_or(AdmissionError::AlreadyActive),
        None => match uow
            .memberships()
            .insert(user_id, scope_id, initial, role, now)
            .await
        {
            Ok(m) => Ok(m),
            Err(e) if e.is_unique_violation() => Err(AdmissionError::AlreadyActive),
            Err(e) => Err(e.into()),
        },
    }
}

/// The one legal source status for each target.
fn source_of(to: MembershipStatus) -> Option<MembershipStatus> {
    match to {
        MembershipStatus::Accepted | MembershipStatus::Declined => Some(MembershipStatus::Pending),
        MembershipStatus::Rejected | MembershipStatus::Canceled => Some(MembershipStatus::Accepted),
        MembershipStatus::Pending => None,
    }
}

/// Move a membership along one edge on behalf of `actor_id`.
///
/// Permission is checked before state, so an unauthorized caller learns
/// nothing about the record.
pub async fn transition(
    uow: &mut UnitOfWork,
    id: MembershipId,
    to: MembershipStatus,
    actor_id: &str,
) -> Result<Membership, AdmissionError> {
    let current = find(uow, id).await?;
    let invalid = || AdmissionError::InvalidTransition {
        from: current.status.as_str(),
        to: to.as_str(),
    };

    let authority = Authority::for_target(to).ok_or_else(invalid)?;
    permissions::authorize(uow, &current, actor_id, authority).await?;

    let from = source_of(to).ok_or_else(invalid)?;
    if current.status != from {
        return Err(invalid());
    }

    if current.role == Role::Owner && from == MembershipStatus::Accepted {
        ensure_not_sole_owner(uow, current.scope_id).await?;
    }

    uow.memberships()
        .update_status(id, from, to)
        .await?
        .ok_or_else(invalid)
}

/// Fails when the scope has exactly one accepted OWNER. Callers check the
/// target holds OWNER first.
pub async fn ensure_not_sole_owner(
    uow: &mut UnitOfWork,
    scope_id: ScopeId,
) -> Result<(), AdmissionError> {
    let owners = uow
        .memberships()
        .count_accepted_with_role(scope_id, Role::Owner)
        .await?;
    if owners <= 1 {
        return Err(AdmissionError::SoleOwnerCannotLeave);
    }
    Ok(())
}

/// Drop a PENDING application. Only its own user may withdraw it.
pub async fn withdraw(
    uow: &mut UnitOfWork,
    membership: &Membership,
    actor_id: &str,
) -> Result<(), AdmissionError> {
    permissions::authorize(uow, membership, actor_id, Authority::SelfOnly).await?;
    if !uow.memberships().delete_pending(membership.id).await? {
        return Err(AdmissionError::InvalidTransition {
            from: membership.status.as_str(),
            to: "WITHDRAWN",
        });
    }
    Ok(())
}

pub async fn count_accepted(uow: &mut UnitOfWork, scope_id: ScopeId) -> Result<u32, AdmissionError> {
    Ok(uow.memberships().count_accepted(scope_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, Scope, ScopeKind, Visibility};

    async fn setup() -> UnitOfWork {
        let db = Database::new(":memory:").await.unwrap();
        let mut uow = db.begin().await.unwrap();
        uow.scopes()
            .upsert(&Scope::new(1, "choir", ScopeKind::Group, Visibility::Private, None))
            .await
            .unwrap();
        uow.memberships()
            .insert("owner", 1, MembershipStatus::Accepted, Role::Owner, 0)
            .await
            .unwrap();
        uow
    }

    #[tokio::test]
    async fn reapply_reuses_terminal_row() {
        let mut uow = setup().await;
        let first = create_or_reapply(&mut uow, "ann", 1, MembershipStatus::Pending, Role::Member, 10)
            .await
            .unwrap();
        let err = create_or_reapply(&mut uow, "ann", 1, MembershipStatus::Pending, Role::Member, 11)
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::AlreadyActive));

        transition(&mut uow, first.id, MembershipStatus::Declined, "owner")
            .await
            .unwrap();
        let again = create_or_reapply(&mut uow, "ann", 1, MembershipStatus::Pending, Role::Member, 20)
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.status, MembershipStatus::Pending);
        assert_eq!(again.joined_at, 20);
    }

    #[tokio::test]
    async fn permission_is_checked_before_state() {
        let mut uow = setup().await;
        let m = create_or_reapply(&mut uow, "ben", 1, MembershipStatus::Accepted, Role::Member, 0)
            .await
            .unwrap();

        // ACCEPTED -> ACCEPTED is not an edge, but a stranger hears "denied".
        let err = transition(&mut uow, m.id, MembershipStatus::Accepted, "stranger")
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::PermissionDenied));

        let err = transition(&mut uow, m.id, MembershipStatus::Accepted, "owner")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::InvalidTransition {
                from: "ACCEPTED",
                to: "ACCEPTED"
            }
        ));
    }

    #[tokio::test]
    async fn only_self_may_leave() {
        let mut uow = setup().await;
        let m = create_or_reapply(&mut uow, "cat", 1, MembershipStatus::Accepted, Role::Member, 0)
            .await
            .unwrap();
        let err = transition(&mut uow, m.id, MembershipStatus::Canceled, "owner")
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::PermissionDenied));

        let left = transition(&mut uow, m.id, MembershipStatus::Canceled, "cat")
            .await
            .unwrap();
        assert_eq!(left.status, MembershipStatus::Canceled);
        assert_eq!(count_accepted(&mut uow, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sole_owner_is_pinned() {
        let mut uow = setup().await;
        let owner = get_membership(&mut uow, "owner", 1).await.unwrap().unwrap();
        let err = transition(&mut uow, owner.id, MembershipStatus::Canceled, "owner")
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::SoleOwnerCannotLeave));

        create_or_reapply(&mut uow, "co", 1, MembershipStatus::Accepted, Role::Owner, 0)
            .await
            .unwrap();
        transition(&mut uow, owner.id, MembershipStatus::Canceled, "owner")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn withdraw_deletes_pending_row() {
        let mut uow = setup().await;
        let m = create_or_reapply(&mut uow, "dee", 1, MembershipStatus::Pending, Role::Member, 0)
            .await
            .unwrap();
        assert!(matches!(
            withdraw(&mut uow, &m, "owner").await.unwrap_err(),
            AdmissionError::PermissionDenied
        ));
        withdraw(&mut uow, &m, "dee").await.unwrap();
        assert!(get_membership(&mut uow, "dee", 1).await.unwrap().is_none());
    }
}
