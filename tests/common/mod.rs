//! Integration test common infrastructure.
//!
//! Builds an [`AdmissionService`] over a private database with a manual
//! clock and a notification sink that remembers everything it was handed.

#![allow(dead_code)]

use async_trait::async_trait;
use rollcall::config::AdmissionConfig;
use rollcall::{
    AdmissionService, CurrentUser, Database, ManualClock, Notification, NotificationKind,
    NotificationSink, Scope, ScopeKind, SqliteScopeLookup, Visibility,
};
use rollcall::notify::NotifyError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Start of test time, 2023-11-14.
pub const T0: i64 = 1_700_000_000;

/// Default invitation window in tests.
pub const WINDOW: i64 = 3_600;

/// Sink that records notifications, optionally failing every send.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn fail(&self, yes: bool) {
        self.failing.store(yes, Ordering::SeqCst);
    }

    /// Everything handed over so far, draining the log.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Kinds received by one user, in order, draining nothing.
    pub fn kinds_for(&self, user: &str) -> Vec<NotificationKind> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.user_id == user)
            .map(|n| n.kind)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(
        &self,
        user_id: &str,
        kind: NotificationKind,
        related_id: i64,
    ) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(Notification {
            user_id: user_id.to_string(),
            kind,
            related_id,
        });
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError("sink offline".into()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub service: Arc<AdmissionService>,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    /// Fresh in-memory database, default settings with a one-hour window.
    pub async fn new() -> Self {
        let db = Database::new(":memory:").await.expect("memory database");
        Self::with_database(db, settings())
    }

    pub fn with_database(db: Database, settings: AdmissionConfig) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let sink = Arc::new(RecordingSink::default());
        let service = AdmissionService::new(
            db.clone(),
            Arc::new(SqliteScopeLookup::new(db.clone())),
            sink.clone(),
            clock.clone(),
            settings,
        );
        Self {
            service: Arc::new(service),
            db,
            clock,
            sink,
        }
    }

    /// Insert an ACTIVE scope.
    pub async fn scope(
        &self,
        id: i64,
        kind: ScopeKind,
        visibility: Visibility,
        max_capacity: Option<u32>,
    ) -> Scope {
        let scope = Scope::new(id, &format!("scope-{id}"), kind, visibility, max_capacity);
        let mut uow = self.db.begin().await.unwrap();
        uow.scopes().upsert(&scope).await.unwrap();
        uow.commit().await.unwrap();
        scope
    }

    pub async fn set_capacity(&self, id: i64, max_capacity: Option<u32>) {
        let mut uow = self.db.begin().await.unwrap();
        assert!(uow.scopes().set_capacity(id, max_capacity).await.unwrap());
        uow.commit().await.unwrap();
    }

    /// Kinds delivered to one user so far, after waiting for the outbox.
    pub async fn kinds_for(&self, user: &str) -> Vec<NotificationKind> {
        self.service.flush_notifications().await;
        self.sink.kinds_for(user)
    }

    /// Everything delivered so far, after waiting for the outbox.
    pub async fn take_notifications(&self) -> Vec<Notification> {
        self.service.flush_notifications().await;
        self.sink.take()
    }

    pub async fn accepted_count(&self, scope_id: i64) -> u32 {
        let mut uow = self.db.begin().await.unwrap();
        uow.memberships().count_accepted(scope_id).await.unwrap()
    }
}

pub fn settings() -> AdmissionConfig {
    AdmissionConfig {
        invitation_window_secs: WINDOW,
        ..AdmissionConfig::default()
    }
}

pub fn user(id: &str) -> CurrentUser {
    CurrentUser::new(id)
}
