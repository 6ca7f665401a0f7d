use super::super::{LeaveOutcome, Reply, ScopeActor};
use crate::admission::coordinator;
use crate::db::{UserId, WaitlistEntry};
use futures_util::FutureExt;

impl ScopeActor {
    pub(crate) async fn handle_leave(&self, user_id: UserId, reply_tx: Reply<LeaveOutcome>) {
        let result = async {
            let scope = self.scope().await?;
            let at = self.moment();
            self.transact("leave", |uow| {
                let scope = scope.clone();
                let user_id = user_id.clone();
                async move { coordinator::leave(uow, &scope, &user_id, at).await }.boxed()
            })
            .await
        }
        .await;
        let _ = reply_tx.send(result);
    }

    pub(crate) async fn handle_leave_waitlist(
        &self,
        user_id: UserId,
        reply_tx: Reply<WaitlistEntry>,
    ) {
        let result = async {
            let scope = self.scope().await?;
            self.transact("leave_waitlist", |uow| {
                let scope = scope.clone();
                let user_id = user_id.clone();
                async move { coordinator::leave_waitlist(uow, &scope, &user_id).await }.boxed()
            })
            .await
        }
        .await;
        let _ = reply_tx.send(result);
    }
}
