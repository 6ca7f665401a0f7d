//! Invitation expiry background task.
//!
//! Stands in for an external scheduler: every tick, invitations whose
//! window has closed are expired and their slots handed to the next waiters.

use crate::admission::AdmissionService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Spawn the invitation sweeper.
///
/// Uses the service's clock for "now". The first sweep runs immediately.
pub fn spawn_invitation_sweeper(
    service: Arc<AdmissionService>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match service.expire_stale_invitations(service.now()).await {
                Ok(0) => {}
                Ok(expired) => debug!(expired, "Invitation sweep finished"),
                Err(e) => warn!(error = %e, "Invitation sweep failed"),
            }
        }
    })
}
