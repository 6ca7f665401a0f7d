//! Notification requests emitted by the admission core.
//!
//! Delivery is somebody else's job. Scope actors post each committed batch
//! to an [`Outbox`] and move on; one background task hands the batches to
//! the [`NotificationSink`] in commit order. A failed send is logged and
//! otherwise ignored.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A reviewer has a new application to decide (related id: membership).
    JoinRequested,
    /// The recipient's application was approved (related id: membership).
    MembershipApproved,
    /// The recipient's application was declined (related id: membership).
    MembershipDeclined,
    /// The recipient was removed from the scope (related id: membership).
    MemberRemoved,
    /// A slot is being held for the recipient (related id: waitlist entry).
    WaitlistInvitation,
    /// The recipient's invitation lapsed (related id: waitlist entry).
    InvitationExpired,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::JoinRequested => "join_requested",
            NotificationKind::MembershipApproved => "membership_approved",
            NotificationKind::MembershipDeclined => "membership_declined",
            NotificationKind::MemberRemoved => "member_removed",
            NotificationKind::WaitlistInvitation => "waitlist_invitation",
            NotificationKind::InvitationExpired => "invitation_expired",
        }
    }
}

/// A notification request, buffered until its unit of work commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub related_id: i64,
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// External notification collaborator.
///
/// Implementations should hand off quickly (enqueue, not deliver): the core
/// calls `send` from the scope's actor after the unit commits.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(
        &self,
        user_id: &str,
        kind: NotificationKind,
        related_id: i64,
    ) -> Result<(), NotifyError>;
}

/// Sink that only records notifications in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(
        &self,
        user_id: &str,
        kind: NotificationKind,
        related_id: i64,
    ) -> Result<(), NotifyError> {
        debug!(user_id, kind = kind.as_str(), related_id, "notification");
        Ok(())
    }
}

enum Delivery {
    Batch(Vec<Notification>),
    Flush(oneshot::Sender<()>),
}

/// Queue between the scope actors and the sink.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Delivery>,
}

impl Outbox {
    /// Spawn the delivery task. Must be called inside a Tokio runtime.
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));

        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    Delivery::Batch(batch) => dispatch(&sink, batch).await,
                    Delivery::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Notification outbox closed");
        });

        Self { tx }
    }

    /// Queue a committed batch without waiting for delivery. When the
    /// outbox is full the batch is dropped with a warning.
    pub fn post(&self, batch: Vec<Notification>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        match self.tx.try_send(Delivery::Batch(batch)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(count, "Notification outbox full, dropping batch");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(count, "Notification outbox closed, dropping batch");
            }
        }
    }

    /// Wait until everything posted before this call has been handed to
    /// the sink.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Delivery::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Deliver committed notifications. Failures are logged, never propagated.
pub async fn dispatch(sink: &Arc<dyn NotificationSink>, notifications: Vec<Notification>) {
    for n in notifications {
        if let Err(e) = sink.send(&n.user_id, n.kind, n.related_id).await {
            warn!(
                user_id = %n.user_id,
                kind = n.kind.as_str(),
                related_id = n.related_id,
                error = %e,
                "Failed to hand off notification"
            );
        }
    }
}
