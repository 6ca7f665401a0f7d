use super::super::{Reply, ScopeActor};
use crate::admission::dispatcher;
use crate::db::{EntryId, Membership, UserId, WaitlistEntry};
use crate::metrics;
use futures_util::FutureExt;
use tracing::info;

impl ScopeActor {
    pub(crate) async fn handle_accept_invitation(
        &self,
        entry_id: EntryId,
        user_id: UserId,
        reply_tx: Reply<Membership>,
    ) {
        let result = async {
            let scope = self.scope().await?;
            let at = self.moment();
            self.transact("accept_invitation", |uow| {
                let scope = scope.clone();
                let user_id = user_id.clone();
                async move {
                    dispatcher::accept_invitation(uow, &scope, entry_id, &user_id, at).await
                }
                .boxed()
            })
            .await
        }
        .await;
        let _ = reply_tx.send(result);
    }

    pub(crate) async fn handle_decline_invitation(
        &self,
        entry_id: EntryId,
        user_id: UserId,
        reply_tx: Reply<WaitlistEntry>,
    ) {
        let result = self
            .transact("decline_invitation", |uow| {
                let user_id = user_id.clone();
                async move { dispatcher::decline_invitation(uow, entry_id, &user_id).await }.boxed()
            })
            .await;
        let _ = reply_tx.send(result);
    }

    pub(crate) async fn handle_invite_from_waitlist(
        &self,
        entry_id: EntryId,
        actor_id: UserId,
        reply_tx: Reply<WaitlistEntry>,
    ) {
        let at = self.moment();
        let result = self
            .transact("invite_from_waitlist", |uow| {
                let actor_id = actor_id.clone();
                async move { dispatcher::invite_manually(uow, entry_id, &actor_id, at).await }
                    .boxed()
            })
            .await;
        if result.is_ok() {
            metrics::record_promotions(1);
        }
        let _ = reply_tx.send(result);
    }

    pub(crate) async fn handle_slot_freed(&self, reply_tx: Reply<Vec<WaitlistEntry>>) {
        let result = async {
            let scope = self.scope().await?;
            let at = self.moment();
            self.transact("on_slot_freed", |uow| {
                let scope = scope.clone();
                async move { dispatcher::on_slot_freed(uow, &scope, at).await }.boxed()
            })
            .await
        }
        .await;
        if let Ok(promoted) = &result {
            metrics::record_promotions(promoted.len());
        }
        let _ = reply_tx.send(result);
    }

    pub(crate) async fn handle_expire(&self, now: i64, reply_tx: Reply<usize>) {
        let result = async {
            let scope = self.scope().await?;
            let at = self.moment_at(now);
            self.transact("expire_invitations", |uow| {
                let scope = scope.clone();
                async move { dispatcher::expire_scope_invitations(uow, &scope, at).await }.boxed()
            })
            .await
        }
        .await;

        let result = result.map(|(expired, promoted)| {
            metrics::record_expirations(expired.len());
            metrics::record_promotions(promoted.len());
            if !expired.is_empty() {
                info!(
                    scope_id = self.scope_id,
                    expired = expired.len(),
                    promoted = promoted.len(),
                    "Expired stale invitations"
                );
            }
            expired.len()
        });
        let _ = reply_tx.send(result);
    }
}
