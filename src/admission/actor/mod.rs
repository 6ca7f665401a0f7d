//! Actor model for scope admission.
//!
//! Every mutation of a scope's memberships and waitlist goes through that
//! scope's `ScopeActor`, a Tokio task draining one mailbox. Two requests
//! for the same scope therefore never interleave, which is what keeps the
//! capacity check and the insert it gates together.
//!
//! Inside the actor each event is one [`UnitOfWork`]. Lock contention from
//! other processes (or other scopes' actors on a file-backed database) is
//! retried from the top of the unit with linear backoff.
//!
//! An actor whose mailbox stays empty for `actor_idle_ms` leaves the
//! registry and stops; the next request for its scope spawns a fresh one.

use super::manager::ActorRegistry;
use super::{AdmissionCore, Moment};
use crate::db::{Scope, ScopeId, UnitOfWork};
use crate::error::AdmissionError;
use crate::metrics;
use crate::notify::Notification;
use futures_util::future::BoxFuture;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

mod handlers;
mod types;

pub use types::*;

/// The Scope Actor.
pub struct ScopeActor {
    scope_id: ScopeId,
    core: Arc<AdmissionCore>,
    registry: Weak<ActorRegistry>,
    mailbox: mpsc::WeakSender<ScopeEvent>,
}

impl ScopeActor {
    /// Create a new Scope Actor and spawn it.
    pub fn spawn(
        scope_id: ScopeId,
        core: Arc<AdmissionCore>,
        registry: Weak<ActorRegistry>,
    ) -> mpsc::Sender<ScopeEvent> {
        let (tx, rx) = mpsc::channel(core.settings.mailbox_capacity.max(1));
        let actor = Self {
            scope_id,
            core,
            registry,
            mailbox: tx.downgrade(),
        };

        tokio::spawn(async move {
            actor.run(rx).await;
        });

        tx
    }

    /// The main actor loop.
    async fn run(self, mut rx: mpsc::Receiver<ScopeEvent>) {
        metrics::scope_actor_started();
        debug!(scope_id = self.scope_id, "Scope actor started");

        let idle = self.core.settings.actor_idle();
        loop {
            match tokio::time::timeout(idle, rx.recv()).await {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => break,
                Err(_) => {
                    if self.retire(&rx) {
                        break;
                    }
                }
            }
        }

        metrics::scope_actor_stopped();
        debug!(scope_id = self.scope_id, "Scope actor stopped");
    }

    /// Leave the registry once nobody can reach this actor: the registry
    /// holds the only outside handle and nothing is queued. The check runs
    /// under the registry's entry lock, so no caller can pick the handle up
    /// in between.
    fn retire(&self, rx: &mpsc::Receiver<ScopeEvent>) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return true;
        };
        let Some(me) = self.mailbox.upgrade() else {
            return true;
        };

        // Two strong handles: the registry's and `me`.
        let removed = registry
            .remove_if(&self.scope_id, |_, tx| {
                tx.same_channel(&me) && me.strong_count() == 2 && rx.is_empty()
            })
            .is_some();
        if removed {
            debug!(scope_id = self.scope_id, "Scope actor idle, retiring");
            return true;
        }

        // Evicted earlier and nobody left holding a handle.
        me.strong_count() == 1 && rx.is_empty()
    }

    async fn handle_event(&self, event: ScopeEvent) {
        match event {
            ScopeEvent::RequestJoin { user_id, reply_tx } => {
                self.handle_join(user_id, reply_tx).await;
            }
            ScopeEvent::Leave { user_id, reply_tx } => {
                self.handle_leave(user_id, reply_tx).await;
            }
            ScopeEvent::LeaveWaitlist { user_id, reply_tx } => {
                self.handle_leave_waitlist(user_id, reply_tx).await;
            }
            ScopeEvent::Approve {
                membership_id,
                actor_id,
                reply_tx,
            } => {
                self.handle_approve(membership_id, actor_id, reply_tx).await;
            }
            ScopeEvent::Reject {
                membership_id,
                actor_id,
                reply_tx,
            } => {
                self.handle_reject(membership_id, actor_id, reply_tx).await;
            }
            ScopeEvent::AssignRole {
                membership_id,
                role,
                actor_id,
                reply_tx,
            } => {
                self.handle_assign_role(membership_id, role, actor_id, reply_tx)
                    .await;
            }
            ScopeEvent::CheckIn {
                membership_id,
                actor_id,
                reply_tx,
            } => {
                self.handle_check_in(membership_id, actor_id, reply_tx).await;
            }
            ScopeEvent::AcceptInvitation {
                entry_id,
                user_id,
                reply_tx,
            } => {
                self.handle_accept_invitation(entry_id, user_id, reply_tx)
                    .await;
            }
            ScopeEvent::DeclineInvitation {
                entry_id,
                user_id,
                reply_tx,
            } => {
                self.handle_decline_invitation(entry_id, user_id, reply_tx)
                    .await;
            }
            ScopeEvent::InviteFromWaitlist {
                entry_id,
                actor_id,
                reply_tx,
            } => {
                self.handle_invite_from_waitlist(entry_id, actor_id, reply_tx)
                    .await;
            }
            ScopeEvent::SlotFreed { reply_tx } => {
                self.handle_slot_freed(reply_tx).await;
            }
            ScopeEvent::ExpireInvitations { now, reply_tx } => {
                self.handle_expire(now, reply_tx).await;
            }
            ScopeEvent::Found { owner_id, reply_tx } => {
                self.handle_found(owner_id, reply_tx).await;
            }
        }
    }

    /// Current scope metadata. Fetched before the unit opens so the lookup
    /// never competes with it for a connection.
    async fn scope(&self) -> Result<Scope, AdmissionError> {
        self.core
            .scopes
            .get(self.scope_id)
            .await?
            .ok_or_else(|| AdmissionError::NotFound(format!("scope {}", self.scope_id)))
    }

    fn moment(&self) -> Moment {
        self.moment_at(self.core.clock.now())
    }

    fn moment_at(&self, now: i64) -> Moment {
        Moment {
            now,
            invitation_window: self.core.settings.invitation_window_secs,
        }
    }

    /// Run `work` in a fresh unit of work, committing on success and
    /// posting its notifications to the outbox afterwards. Contention rolls the unit
    /// back and starts over, up to `retry_attempts` times.
    async fn transact<T, F>(&self, operation: &'static str, mut work: F) -> Result<T, AdmissionError>
    where
        F: for<'u> FnMut(&'u mut UnitOfWork) -> BoxFuture<'u, Result<T, AdmissionError>>,
    {
        let attempts = self.core.settings.retry_attempts.max(1);
        let backoff = self.core.settings.retry_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt(&mut work).await {
                Ok((value, committed)) => {
                    self.core.outbox.post(committed);
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    metrics::record_retry(operation);
                    debug!(
                        scope_id = self.scope_id,
                        operation,
                        attempt,
                        error = %e,
                        "Contention, retrying unit of work"
                    );
                    tokio::time::sleep(backoff * attempt).await;
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        scope_id = self.scope_id,
                        operation,
                        attempts,
                        error = %e,
                        "Contention persisted, giving up"
                    );
                    return Err(AdmissionError::Transient(format!(
                        "{operation}: storage busy after {attempts} attempts"
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt<T, F>(&self, work: &mut F) -> Result<(T, Vec<Notification>), AdmissionError>
    where
        F: for<'u> FnMut(&'u mut UnitOfWork) -> BoxFuture<'u, Result<T, AdmissionError>>,
    {
        let mut uow = self.core.db.begin().await?;
        let value = work(&mut uow).await?;
        let outbox = uow.commit().await?;
        Ok((value, outbox))
    }
}
