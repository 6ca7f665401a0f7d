//! Admission core.
//!
//! Decides whether a join request is accepted, held for review or
//! waitlisted, and promotes waiters as capacity frees up.
//!
//! # Layout
//!
//! - [`registry`], [`queue`], [`capacity`]: state machines and the capacity
//!   guard over one [`UnitOfWork`](crate::db::UnitOfWork).
//! - [`dispatcher`], [`coordinator`]: the operations built from them.
//! - [`actor`], [`manager`]: one actor per scope serializing those operations.
//! - [`AdmissionService`]: the entry point. Routes each call to the right
//!   actor, bounds how long a caller waits and records metrics.

pub mod actor;
pub mod capacity;
pub mod coordinator;
pub mod dispatcher;
pub mod manager;
pub mod permissions;
pub mod queue;
pub mod registry;

pub use actor::{AdmissionOutcome, LeaveOutcome, Reply, ScopeEvent};
pub use manager::ScopeManager;
pub use permissions::Capability;

use crate::clock::Clock;
use crate::config::AdmissionConfig;
use crate::db::{
    Database, EntryId, EntryStatus, Membership, MembershipId, Role, ScopeId, ScopeLookup,
    WaitlistEntry,
};
use crate::error::AdmissionError;
use crate::identity::CurrentUser;
use crate::metrics;
use crate::notify::{NotificationSink, Outbox};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The instant a unit of work runs at, and how long invitations it hands
/// out stay open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    pub now: i64,
    pub invitation_window: i64,
}

impl Moment {
    /// `expires_at` for an invitation issued now.
    pub fn invitation_deadline(self) -> i64 {
        self.now.saturating_add(self.invitation_window)
    }
}

/// Everything a scope actor needs, shared by all of them.
pub struct AdmissionCore {
    pub db: Database,
    pub scopes: Arc<dyn ScopeLookup>,
    pub outbox: Outbox,
    pub clock: Arc<dyn Clock>,
    pub settings: AdmissionConfig,
}

/// Front door of the admission core.
pub struct AdmissionService {
    core: Arc<AdmissionCore>,
    manager: ScopeManager,
}

impl AdmissionService {
    /// Build the service and start its notification delivery task. Must be
    /// called inside a Tokio runtime.
    pub fn new(
        db: Database,
        scopes: Arc<dyn ScopeLookup>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settings: AdmissionConfig,
    ) -> Self {
        let outbox = Outbox::spawn(notifier, settings.outbox_capacity);
        let core = Arc::new(AdmissionCore {
            db,
            scopes,
            outbox,
            clock,
            settings,
        });
        Self {
            manager: ScopeManager::new(Arc::clone(&core)),
            core,
        }
    }

    pub fn database(&self) -> &Database {
        &self.core.db
    }

    /// The service clock's current time.
    pub fn now(&self) -> i64 {
        self.core.clock.now()
    }

    /// Scope actors currently running.
    pub fn actor_count(&self) -> usize {
        self.manager.len()
    }

    /// Wait until every notification committed so far has been handed to
    /// the sink.
    pub async fn flush_notifications(&self) {
        self.core.outbox.flush().await;
    }

    // ------------------------------------------------------------------
    // Joining and leaving
    // ------------------------------------------------------------------

    /// Ask to join a scope.
    pub async fn request_join(
        &self,
        user: &CurrentUser,
        scope_id: ScopeId,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        self.call("request_join", scope_id, |reply_tx| ScopeEvent::RequestJoin {
            user_id: user.id.clone(),
            reply_tx,
        })
        .await
    }

    /// Leave a scope, or withdraw a pending application.
    pub async fn leave(
        &self,
        user: &CurrentUser,
        scope_id: ScopeId,
    ) -> Result<LeaveOutcome, AdmissionError> {
        self.call("leave", scope_id, |reply_tx| ScopeEvent::Leave {
            user_id: user.id.clone(),
            reply_tx,
        })
        .await
    }

    /// Give up a waitlist place. Returns the entry as it ended up: WAITING
    /// (now deleted) or DECLINED.
    pub async fn leave_waitlist(
        &self,
        user: &CurrentUser,
        scope_id: ScopeId,
    ) -> Result<WaitlistEntry, AdmissionError> {
        let entry = self
            .call("leave_waitlist", scope_id, |reply_tx| ScopeEvent::LeaveWaitlist {
                user_id: user.id.clone(),
                reply_tx,
            })
            .await?;
        if entry.status == EntryStatus::Declined {
            self.pass_on_slot(scope_id).await;
        }
        Ok(entry)
    }

    /// Seed the creator's membership of a new scope.
    pub async fn found_scope(
        &self,
        scope_id: ScopeId,
        creator: &CurrentUser,
    ) -> Result<Membership, AdmissionError> {
        self.call("found_scope", scope_id, |reply_tx| ScopeEvent::Found {
            owner_id: creator.id.clone(),
            reply_tx,
        })
        .await
    }

    // ------------------------------------------------------------------
    // Review
    // ------------------------------------------------------------------

    pub async fn approve(
        &self,
        membership_id: MembershipId,
        actor: &CurrentUser,
    ) -> Result<Membership, AdmissionError> {
        let scope_id = self.scope_of_membership("approve", membership_id).await?;
        self.call("approve", scope_id, |reply_tx| ScopeEvent::Approve {
            membership_id,
            actor_id: actor.id.clone(),
            reply_tx,
        })
        .await
    }

    /// Decline a pending application or remove an accepted member.
    pub async fn reject(
        &self,
        membership_id: MembershipId,
        actor: &CurrentUser,
    ) -> Result<Membership, AdmissionError> {
        let scope_id = self.scope_of_membership("reject", membership_id).await?;
        self.call("reject", scope_id, |reply_tx| ScopeEvent::Reject {
            membership_id,
            actor_id: actor.id.clone(),
            reply_tx,
        })
        .await
    }

    pub async fn assign_role(
        &self,
        membership_id: MembershipId,
        role: Role,
        actor: &CurrentUser,
    ) -> Result<Membership, AdmissionError> {
        let scope_id = self.scope_of_membership("assign_role", membership_id).await?;
        self.call("assign_role", scope_id, |reply_tx| ScopeEvent::AssignRole {
            membership_id,
            role,
            actor_id: actor.id.clone(),
            reply_tx,
        })
        .await
    }

    pub async fn check_in(
        &self,
        membership_id: MembershipId,
        actor: &CurrentUser,
    ) -> Result<Membership, AdmissionError> {
        let scope_id = self.scope_of_membership("check_in", membership_id).await?;
        self.call("check_in", scope_id, |reply_tx| ScopeEvent::CheckIn {
            membership_id,
            actor_id: actor.id.clone(),
            reply_tx,
        })
        .await
    }

    // ------------------------------------------------------------------
    // Invitations
    // ------------------------------------------------------------------

    pub async fn accept_invitation(
        &self,
        entry_id: EntryId,
        user: &CurrentUser,
    ) -> Result<Membership, AdmissionError> {
        let scope_id = self.scope_of_entry("accept_invitation", entry_id).await?;
        self.call("accept_invitation", scope_id, |reply_tx| {
            ScopeEvent::AcceptInvitation {
                entry_id,
                user_id: user.id.clone(),
                reply_tx,
            }
        })
        .await
    }

    /// Decline an invitation. The slot it held is offered to the next
    /// waiter in a separate step once the decline has committed.
    pub async fn decline_invitation(
        &self,
        entry_id: EntryId,
        user: &CurrentUser,
    ) -> Result<WaitlistEntry, AdmissionError> {
        let scope_id = self.scope_of_entry("decline_invitation", entry_id).await?;
        let declined = self
            .call("decline_invitation", scope_id, |reply_tx| {
                ScopeEvent::DeclineInvitation {
                    entry_id,
                    user_id: user.id.clone(),
                    reply_tx,
                }
            })
            .await?;
        self.pass_on_slot(scope_id).await;
        Ok(declined)
    }

    /// Invite a specific waiter, ignoring queue order and capacity.
    pub async fn invite_from_waitlist(
        &self,
        entry_id: EntryId,
        actor: &CurrentUser,
    ) -> Result<WaitlistEntry, AdmissionError> {
        let scope_id = self.scope_of_entry("invite_from_waitlist", entry_id).await?;
        self.call("invite_from_waitlist", scope_id, |reply_tx| {
            ScopeEvent::InviteFromWaitlist {
                entry_id,
                actor_id: actor.id.clone(),
                reply_tx,
            }
        })
        .await
    }

    /// Promote waiters into whatever capacity is free.
    pub async fn on_slot_freed(
        &self,
        scope_id: ScopeId,
    ) -> Result<Vec<WaitlistEntry>, AdmissionError> {
        self.call("on_slot_freed", scope_id, |reply_tx| ScopeEvent::SlotFreed {
            reply_tx,
        })
        .await
    }

    /// Hook for the scope owner raising `max_capacity`.
    pub async fn on_capacity_changed(
        &self,
        scope_id: ScopeId,
    ) -> Result<Vec<WaitlistEntry>, AdmissionError> {
        let promoted = self.on_slot_freed(scope_id).await?;
        debug!(scope_id, promoted = promoted.len(), "Capacity changed");
        Ok(promoted)
    }

    /// Expire every invitation whose window closed at or before `now`, then
    /// refill the freed slots. Returns how many invitations expired.
    ///
    /// A failing scope is logged and skipped; the next sweep retries it.
    pub async fn expire_stale_invitations(&self, now: i64) -> Result<usize, AdmissionError> {
        let scopes = observe("expire_stale_invitations", async {
            let mut uow = self.core.db.begin().await?;
            Ok::<_, AdmissionError>(uow.waitlist().scopes_with_expired_invitations(now).await?)
        }
        .await)?;

        let mut expired = 0;
        for scope_id in scopes {
            match self
                .call("expire_stale_invitations", scope_id, |reply_tx| {
                    ScopeEvent::ExpireInvitations { now, reply_tx }
                })
                .await
            {
                Ok(n) => expired += n,
                Err(e) => warn!(scope_id, error = %e, "Invitation expiry failed for scope"),
            }
        }
        Ok(expired)
    }

    // ------------------------------------------------------------------
    // Reads. These do not go through the actors.
    // ------------------------------------------------------------------

    /// WAITING and INVITED entries by position. Requires `ViewWaitlist`.
    pub async fn list_waitlist(
        &self,
        scope_id: ScopeId,
        actor: &CurrentUser,
    ) -> Result<Vec<WaitlistEntry>, AdmissionError> {
        observe("list_waitlist", async {
            let mut uow = self.core.db.begin().await?;
            permissions::require(&mut uow, scope_id, &actor.id, Capability::ViewWaitlist).await?;
            queue::list_live(&mut uow, scope_id).await
        }
        .await)
    }

    /// The caller's membership row in a scope, whatever its status.
    pub async fn membership(
        &self,
        user: &CurrentUser,
        scope_id: ScopeId,
    ) -> Result<Option<Membership>, AdmissionError> {
        observe("membership", async {
            let mut uow = self.core.db.begin().await?;
            registry::get_membership(&mut uow, &user.id, scope_id).await
        }
        .await)
    }

    async fn scope_of_membership(
        &self,
        operation: &'static str,
        id: MembershipId,
    ) -> Result<ScopeId, AdmissionError> {
        observe(operation, async {
            let mut uow = self.core.db.begin().await?;
            Ok::<_, AdmissionError>(registry::find(&mut uow, id).await?.scope_id)
        }
        .await)
    }

    async fn scope_of_entry(
        &self,
        operation: &'static str,
        id: EntryId,
    ) -> Result<ScopeId, AdmissionError> {
        observe(operation, async {
            let mut uow = self.core.db.begin().await?;
            Ok::<_, AdmissionError>(queue::find(&mut uow, id).await?.scope_id)
        }
        .await)
    }

    /// Follow-up promotion after a decline. The decline already stands, so
    /// a failure here is only logged; the sweep will catch up.
    async fn pass_on_slot(&self, scope_id: ScopeId) {
        if let Err(e) = self.on_slot_freed(scope_id).await {
            warn!(scope_id, error = %e, "Promotion after decline failed");
        }
    }

    /// Send one event to the scope's actor and wait for the answer, at most
    /// `request_timeout`. A timed-out unit still completes or rolls back
    /// inside the actor.
    async fn call<T>(
        &self,
        operation: &'static str,
        scope_id: ScopeId,
        event: impl FnOnce(Reply<T>) -> ScopeEvent,
    ) -> Result<T, AdmissionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let tx = self.manager.get_or_create_actor(scope_id);

        let request = async {
            tx.send(event(reply_tx))
                .await
                .map_err(|_| AdmissionError::Transient("scope actor unavailable".into()))?;
            reply_rx
                .await
                .map_err(|_| AdmissionError::Transient("scope actor dropped the request".into()))?
        };

        let result = match tokio::time::timeout(self.core.settings.request_timeout(), request).await
        {
            Ok(result) => result,
            Err(_) => Err(AdmissionError::Transient(format!("{operation} timed out"))),
        };

        if matches!(result, Err(AdmissionError::Transient(_))) {
            self.manager.evict_if_closed(scope_id);
        }
        observe(operation, result)
    }
}

/// Record a finished operation. Contention never escapes as `CapacityRace`.
fn observe<T>(
    operation: &'static str,
    result: Result<T, AdmissionError>,
) -> Result<T, AdmissionError> {
    let result = result.map_err(|e| match e {
        AdmissionError::CapacityRace => {
            AdmissionError::Transient(format!("{operation}: storage busy"))
        }
        other => other,
    });

    if let Err(e) = &result {
        metrics::record_error(operation, e.error_code());
        if e.is_logical() {
            debug!(operation, error = %e, "Admission request refused");
        } else {
            warn!(operation, error = %e, "Admission request failed");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_now_plus_window() {
        let at = Moment {
            now: 1_000,
            invitation_window: 60,
        };
        assert_eq!(at.invitation_deadline(), 1_060);
        let edge = Moment {
            now: i64::MAX - 1,
            invitation_window: 60,
        };
        assert_eq!(edge.invitation_deadline(), i64::MAX);
    }

    #[test]
    fn capacity_race_surfaces_as_transient() {
        let out: Result<(), _> = observe("request_join", Err(AdmissionError::CapacityRace));
        assert!(matches!(out, Err(AdmissionError::Transient(_))));

        let out: Result<(), _> = observe("request_join", Err(AdmissionError::AlreadyActive));
        assert!(matches!(out, Err(AdmissionError::AlreadyActive)));
    }
}
