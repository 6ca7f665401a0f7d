//! Capacity guard.
//!
//! Occupancy is derived on every call: ACCEPTED memberships plus INVITED
//! waitlist entries whose window is still open. An open invitation holds
//! its slot so a newcomer cannot take the place freed for a waiter.
//! Always evaluated inside the unit of work whose decision it gates.

use crate::db::{Scope, UnitOfWork};
use crate::error::AdmissionError;

/// The scope row as this unit sees it. Status and capacity gate the
/// decision, so they are re-read inside the same transaction; a scope the
/// store does not know keeps the copy it came with.
pub async fn current(uow: &mut UnitOfWork, scope: &Scope) -> Result<Scope, AdmissionError> {
    Ok(uow
        .scopes()
        .find(scope.id)
        .await?
        .unwrap_or_else(|| scope.clone()))
}

/// Slots currently taken in `scope`.
pub async fn occupied(
    uow: &mut UnitOfWork,
    scope: &Scope,
    now: i64,
) -> Result<u32, AdmissionError> {
    let accepted = uow.memberships().count_accepted(scope.id).await?;
    let reserved = uow.waitlist().count_open_invitations(scope.id, now).await?;
    Ok(accepted.saturating_add(reserved))
}

/// Free slots, or `None` for an unbounded scope.
pub async fn free_slots(
    uow: &mut UnitOfWork,
    scope: &Scope,
    now: i64,
) -> Result<Option<u32>, AdmissionError> {
    let Some(max) = scope.max_capacity else {
        return Ok(None);
    };
    let taken = occupied(uow, scope, now).await?;
    Ok(Some(max.saturating_sub(taken)))
}

pub async fn has_free_slot(
    uow: &mut UnitOfWork,
    scope: &Scope,
    now: i64,
) -> Result<bool, AdmissionError> {
    Ok(free_slots(uow, scope, now).await?.is_none_or(|n| n > 0))
}

/// Re-read occupancy after an admission write. Over the ceiling means
/// another writer slipped in between check and insert; the unit must roll
/// back and start over.
pub async fn verify_ceiling(
    uow: &mut UnitOfWork,
    scope: &Scope,
    now: i64,
) -> Result<(), AdmissionError> {
    if let Some(max) = scope.max_capacity
        && occupied(uow, scope, now).await? > max
    {
        return Err(AdmissionError::CapacityRace);
    }
    Ok(())
}
