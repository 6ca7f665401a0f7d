use super::super::{Reply, ScopeActor};
use crate::admission::coordinator;
use crate::db::{Membership, MembershipId, Role, UserId};
use futures_util::FutureExt;

impl ScopeActor {
    pub(crate) async fn handle_approve(
        &self,
        membership_id: MembershipId,
        actor_id: UserId,
        reply_tx: Reply<Membership>,
    ) {
        let result = self
            .transact("approve", |uow| {
                let actor_id = actor_id.clone();
                async move { coordinator::approve(uow, membership_id, &actor_id).await }.boxed()
            })
            .await;
        let _ = reply_tx.send(result);
    }

    pub(crate) async fn handle_reject(
        &self,
        membership_id: MembershipId,
        actor_id: UserId,
        reply_tx: Reply<Membership>,
    ) {
        let result = async {
            let scope = self.scope().await?;
            let at = self.moment();
            self.transact("reject", |uow| {
                let scope = scope.clone();
                let actor_id = actor_id.clone();
                async move { coordinator::reject(uow, &scope, membership_id, &actor_id, at).await }
                    .boxed()
            })
            .await
        }
        .await;
        let _ = reply_tx.send(result);
    }

    pub(crate) async fn handle_assign_role(
        &self,
        membership_id: MembershipId,
        role: Role,
        actor_id: UserId,
        reply_tx: Reply<Membership>,
    ) {
        let result = self
            .transact("assign_role", |uow| {
                let actor_id = actor_id.clone();
                async move { coordinator::assign_role(uow, membership_id, role, &actor_id).await }
                    .boxed()
            })
            .await;
        let _ = reply_tx.send(result);
    }

    pub(crate) async fn handle_check_in(
        &self,
        membership_id: MembershipId,
        actor_id: UserId,
        reply_tx: Reply<Membership>,
    ) {
        let result = async {
            let scope = self.scope().await?;
            let at = self.moment();
            self.transact("check_in", |uow| {
                let scope = scope.clone();
                let actor_id = actor_id.clone();
                async move { coordinator::check_in(uow, &scope, membership_id, &actor_id, at).await }
                    .boxed()
            })
            .await
        }
        .await;
        let _ = reply_tx.send(result);
    }
}
