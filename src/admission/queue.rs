//! Waitlist queue.
//!
//! FIFO by `position`. Positions come from the waitlist's tail counter and
//! are never reused; gaps left by removals are harmless and never compacted.

use crate::db::{EntryId, EntryStatus, ScopeId, UnitOfWork, WaitlistEntry};
use crate::error::AdmissionError;
use tracing::debug;

pub async fn find(uow: &mut UnitOfWork, id: EntryId) -> Result<WaitlistEntry, AdmissionError> {
    uow.waitlist()
        .find_entry(id)
        .await?
        .ok_or_else(|| AdmissionError::NotFound(format!("waitlist entry {id}")))
}

/// Put `user_id` at the tail of the scope's waitlist.
///
/// A user's DECLINED or EXPIRED entry is replaced, so a re-join always
/// lands behind everybody currently waiting.
pub async fn enqueue(
    uow: &mut UnitOfWork,
    scope_id: ScopeId,
    user_id: &str,
    now: i64,
) -> Result<WaitlistEntry, AdmissionError> {
    if uow.waitlist().find_live_for(scope_id, user_id).await?.is_some() {
        return Err(AdmissionError::AlreadyWaiting);
    }

    let waitlist = uow.waitlist().ensure_waitlist(scope_id).await?;
    let replaced = uow.waitlist().delete_stale_for(waitlist.id, user_id).await?;
    let position = uow.waitlist().take_position(waitlist.id).await?;

    let entry = match uow
        .waitlist()
        .insert_entry(&waitlist, user_id, position, now)
        .await
    {
        Ok(entry) => entry,
        Err(e) if e.is_unique_violation() => return Err(AdmissionError::AlreadyWaiting),
        Err(e) => return Err(e.into()),
    };

    debug!(scope_id, user_id, position, replaced, "Enqueued on waitlist");
    Ok(entry)
}

/// Lowest-position WAITING entry. Reads only.
pub async fn dequeue_head(
    uow: &mut UnitOfWork,
    scope_id: ScopeId,
) -> Result<Option<WaitlistEntry>, AdmissionError> {
    Ok(uow.waitlist().head(scope_id).await?)
}

/// WAITING → INVITED with the given deadline.
pub async fn mark_invited(
    uow: &mut UnitOfWork,
    id: EntryId,
    expires_at: i64,
) -> Result<WaitlistEntry, AdmissionError> {
    if !uow.waitlist().mark_invited(id, expires_at).await? {
        let current = find(uow, id).await?;
        return Err(AdmissionError::InvalidTransition {
            from: current.status.as_str(),
            to: EntryStatus::Invited.as_str(),
        });
    }
    find(uow, id).await
}

/// INVITED → DECLINED or EXPIRED.
pub async fn mark_declined_or_expired(
    uow: &mut UnitOfWork,
    id: EntryId,
    reason: EntryStatus,
) -> Result<WaitlistEntry, AdmissionError> {
    if !matches!(reason, EntryStatus::Declined | EntryStatus::Expired) {
        return Err(AdmissionError::InvalidTransition {
            from: EntryStatus::Invited.as_str(),
            to: reason.as_str(),
        });
    }
    if !uow.waitlist().close_invitation(id, reason).await? {
        return Err(AdmissionError::InvitationNotPending);
    }
    find(uow, id).await
}

/// Hard delete.
pub async fn remove(uow: &mut UnitOfWork, id: EntryId) -> Result<(), AdmissionError> {
    if !uow.waitlist().delete_entry(id).await? {
        return Err(AdmissionError::NotFound(format!("waitlist entry {id}")));
    }
    Ok(())
}

/// WAITING entries, ascending by position.
pub async fn list_waiting(
    uow: &mut UnitOfWork,
    scope_id: ScopeId,
) -> Result<Vec<WaitlistEntry>, AdmissionError> {
    Ok(uow.waitlist().list(scope_id, &[EntryStatus::Waiting]).await?)
}

/// WAITING and INVITED entries, ascending by position.
pub async fn list_live(
    uow: &mut UnitOfWork,
    scope_id: ScopeId,
) -> Result<Vec<WaitlistEntry>, AdmissionError> {
    Ok(uow
        .waitlist()
        .list(scope_id, &[EntryStatus::Waiting, EntryStatus::Invited])
        .await?)
}
