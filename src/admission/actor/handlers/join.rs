use super::super::{AdmissionOutcome, Reply, ScopeActor};
use crate::admission::coordinator;
use crate::db::{Membership, UserId};
use crate::error::AdmissionError;
use crate::metrics;
use futures_util::FutureExt;

impl ScopeActor {
    pub(crate) async fn handle_join(&self, user_id: UserId, reply_tx: Reply<AdmissionOutcome>) {
        let _ = reply_tx.send(self.join(user_id).await);
    }

    async fn join(&self, user_id: UserId) -> Result<AdmissionOutcome, AdmissionError> {
        let scope = self.scope().await?;
        let at = self.moment();

        let outcome = self
            .transact("request_join", |uow| {
                let scope = scope.clone();
                let user_id = user_id.clone();
                async move { coordinator::request_join(uow, &scope, &user_id, at).await }.boxed()
            })
            .await?;

        metrics::record_outcome(outcome.label());
        Ok(outcome)
    }

    pub(crate) async fn handle_found(&self, owner_id: UserId, reply_tx: Reply<Membership>) {
        let result = async {
            let scope = self.scope().await?;
            let at = self.moment();
            self.transact("found_scope", |uow| {
                let scope = scope.clone();
                let owner_id = owner_id.clone();
                async move { coordinator::found_scope(uow, &scope, &owner_id, at).await }.boxed()
            })
            .await
        }
        .await;
        let _ = reply_tx.send(result);
    }
}
