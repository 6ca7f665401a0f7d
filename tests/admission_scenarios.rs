mod common;

use common::{Harness, T0, WINDOW, user};
use rollcall::{
    AdmissionError, AdmissionOutcome, EntryStatus, LeaveOutcome, MembershipStatus,
    NotificationKind, Role, ScopeKind, Visibility,
};

#[tokio::test]
async fn waitlisted_user_is_invited_when_a_member_leaves() {
    let h = Harness::new().await;
    h.scope(1, ScopeKind::Group, Visibility::Public, Some(2)).await;

    for name in ["alice", "bob"] {
        let outcome = h.service.request_join(&user(name), 1).await.unwrap();
        assert!(matches!(outcome, AdmissionOutcome::Accepted(_)), "{name}: {outcome:?}");
    }
    let AdmissionOutcome::Waitlisted(entry) = h.service.request_join(&user("carol"), 1).await.unwrap()
    else {
        panic!("carol should be waitlisted");
    };

    let left = h.service.leave(&user("alice"), 1).await.unwrap();
    assert!(matches!(left, LeaveOutcome::Left(ref m) if m.status == MembershipStatus::Canceled));
    assert_eq!(h.kinds_for("carol").await, [NotificationKind::WaitlistInvitation]);

    // The freed slot is held for carol, not up for grabs.
    let outcome = h.service.request_join(&user("dave"), 1).await.unwrap();
    assert!(matches!(outcome, AdmissionOutcome::Waitlisted(_)));

    let membership = h.service.accept_invitation(entry.id, &user("carol")).await.unwrap();
    assert_eq!(membership.status, MembershipStatus::Accepted);
    assert_eq!(membership.role, Role::Member);
    assert_eq!(h.accepted_count(1).await, 2);
}

#[tokio::test]
async fn private_application_is_approved_past_capacity() {
    let h = Harness::new().await;
    h.scope(2, ScopeKind::Group, Visibility::Private, Some(1)).await;
    h.service.found_scope(2, &user("owner")).await.unwrap();

    let AdmissionOutcome::Pending(pending) = h.service.request_join(&user("x"), 2).await.unwrap()
    else {
        panic!("private scopes hold requests for review");
    };
    assert_eq!(h.kinds_for("owner").await, [NotificationKind::JoinRequested]);

    let approved = h.service.approve(pending.id, &user("owner")).await.unwrap();
    assert_eq!(approved.status, MembershipStatus::Accepted);
    assert_eq!(h.kinds_for("x").await, [NotificationKind::MembershipApproved]);
    assert_eq!(h.accepted_count(2).await, 2);
}

#[tokio::test]
async fn sole_owner_cannot_leave() {
    let h = Harness::new().await;
    h.scope(3, ScopeKind::Group, Visibility::Public, None).await;
    let founder = h.service.found_scope(3, &user("owner")).await.unwrap();
    assert_eq!(founder.role, Role::Owner);

    let err = h.service.leave(&user("owner"), 3).await.unwrap_err();
    assert!(matches!(err, AdmissionError::SoleOwnerCannotLeave));
    assert_eq!(err.error_code(), "sole_owner_cannot_leave");

    let still = h.service.membership(&user("owner"), 3).await.unwrap().unwrap();
    assert_eq!(still.status, MembershipStatus::Accepted);
}

#[tokio::test]
async fn expiry_sweep_passes_the_slot_down_the_line() {
    let h = Harness::new().await;
    h.scope(4, ScopeKind::Event, Visibility::Public, Some(1)).await;

    h.service.request_join(&user("a"), 4).await.unwrap();
    let AdmissionOutcome::Waitlisted(b) = h.service.request_join(&user("b"), 4).await.unwrap() else {
        panic!("b should wait");
    };
    let AdmissionOutcome::Waitlisted(c) = h.service.request_join(&user("c"), 4).await.unwrap() else {
        panic!("c should wait");
    };

    h.service.leave(&user("a"), 4).await.unwrap();

    h.clock.advance(WINDOW - 1);
    assert_eq!(h.service.expire_stale_invitations(h.service.now()).await.unwrap(), 0);

    h.clock.advance(1);
    assert_eq!(h.service.expire_stale_invitations(h.service.now()).await.unwrap(), 1);

    assert_eq!(
        h.kinds_for("b").await,
        [NotificationKind::WaitlistInvitation, NotificationKind::InvitationExpired]
    );
    assert_eq!(h.kinds_for("c").await, [NotificationKind::WaitlistInvitation]);

    let err = h.service.accept_invitation(b.id, &user("b")).await.unwrap_err();
    assert!(matches!(err, AdmissionError::InvitationNotPending));

    let m = h.service.accept_invitation(c.id, &user("c")).await.unwrap();
    assert_eq!(m.role, Role::Attendee);
    assert_eq!(m.joined_at, T0 + WINDOW);
}

#[tokio::test]
async fn declining_hands_the_slot_to_the_next_waiter() {
    let h = Harness::new().await;
    h.scope(5, ScopeKind::Group, Visibility::Public, Some(1)).await;
    h.service.request_join(&user("a"), 5).await.unwrap();
    let AdmissionOutcome::Waitlisted(b) = h.service.request_join(&user("b"), 5).await.unwrap() else {
        panic!("b should wait");
    };
    h.service.request_join(&user("c"), 5).await.unwrap();
    h.service.leave(&user("a"), 5).await.unwrap();

    let declined = h.service.decline_invitation(b.id, &user("b")).await.unwrap();
    assert_eq!(declined.status, EntryStatus::Declined);
    assert_eq!(h.kinds_for("c").await, [NotificationKind::WaitlistInvitation]);

    // A second decline finds nothing to decline.
    let err = h.service.decline_invitation(b.id, &user("b")).await.unwrap_err();
    assert!(matches!(err, AdmissionError::InvitationNotPending));
}

#[tokio::test]
async fn rejoin_after_decline_lands_behind_current_waiters() {
    let h = Harness::new().await;
    h.scope(6, ScopeKind::Group, Visibility::Public, Some(1)).await;
    h.service.request_join(&user("a"), 6).await.unwrap();
    let AdmissionOutcome::Waitlisted(b) = h.service.request_join(&user("b"), 6).await.unwrap() else {
        panic!("b should wait");
    };
    h.service.request_join(&user("c"), 6).await.unwrap();
    h.service.request_join(&user("d"), 6).await.unwrap();

    h.service.leave(&user("a"), 6).await.unwrap();
    h.service.decline_invitation(b.id, &user("b")).await.unwrap();

    let AdmissionOutcome::Waitlisted(again) = h.service.request_join(&user("b"), 6).await.unwrap()
    else {
        panic!("b should wait again");
    };
    assert_ne!(again.id, b.id);

    let listed = h.service.list_waitlist(6, &user("c")).await;
    assert!(matches!(listed, Err(AdmissionError::PermissionDenied)));

    // c holds the invitation now; the queue reads c, d, b.
    let mut uow = h.db.begin().await.unwrap();
    let live = uow
        .waitlist()
        .list(6, &[EntryStatus::Waiting, EntryStatus::Invited])
        .await
        .unwrap();
    let order: Vec<_> = live.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(order, ["c", "d", "b"]);
    assert!(live.windows(2).all(|w| w[0].position < w[1].position));
}

#[tokio::test]
async fn removal_and_review_need_the_right_roles() {
    let h = Harness::new().await;
    h.scope(7, ScopeKind::Group, Visibility::Private, Some(3)).await;
    h.service.found_scope(7, &user("owner")).await.unwrap();

    let AdmissionOutcome::Pending(m) = h.service.request_join(&user("mod"), 7).await.unwrap() else {
        panic!("pending expected");
    };
    h.service.approve(m.id, &user("owner")).await.unwrap();
    h.service
        .assign_role(m.id, Role::Moderator, &user("owner"))
        .await
        .unwrap();

    let AdmissionOutcome::Pending(p) = h.service.request_join(&user("p"), 7).await.unwrap() else {
        panic!("pending expected");
    };

    // A moderator may review but not remove.
    let err = h.service.reject(m.id, &user("mod")).await.unwrap_err();
    assert!(matches!(err, AdmissionError::PermissionDenied));
    let declined = h.service.reject(p.id, &user("mod")).await.unwrap();
    assert_eq!(declined.status, MembershipStatus::Declined);
    assert_eq!(h.kinds_for("p").await, [NotificationKind::MembershipDeclined]);

    let err = h.service.approve(p.id, &user("mod")).await.unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::InvalidTransition {
            from: "DECLINED",
            to: "ACCEPTED"
        }
    ));

    let removed = h.service.reject(m.id, &user("owner")).await.unwrap();
    assert_eq!(removed.status, MembershipStatus::Rejected);
    assert_eq!(
        h.kinds_for("mod").await,
        [
            NotificationKind::MembershipApproved,
            NotificationKind::JoinRequested,
            NotificationKind::MemberRemoved
        ]
    );

    let waitlist = h.service.list_waitlist(7, &user("owner")).await.unwrap();
    assert!(waitlist.is_empty());
}

#[tokio::test]
async fn unknown_and_closed_scopes() {
    let h = Harness::new().await;
    let err = h.service.request_join(&user("a"), 99).await.unwrap_err();
    assert!(matches!(err, AdmissionError::NotFound(_)));

    h.scope(8, ScopeKind::Event, Visibility::Public, None).await;
    let mut uow = h.db.begin().await.unwrap();
    uow.scopes()
        .set_status(8, rollcall::ScopeStatus::Canceled)
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let err = h.service.request_join(&user("a"), 8).await.unwrap_err();
    assert!(matches!(err, AdmissionError::ScopeNotActive));

    let err = h.service.approve(12345, &user("a")).await.unwrap_err();
    assert!(matches!(err, AdmissionError::NotFound(_)));
}

#[tokio::test]
async fn capacity_increase_promotes_waiters() {
    let h = Harness::new().await;
    h.scope(9, ScopeKind::Event, Visibility::Public, Some(1)).await;
    for name in ["a", "b", "c", "d"] {
        h.service.request_join(&user(name), 9).await.unwrap();
    }

    h.set_capacity(9, Some(3)).await;
    let promoted = h.service.on_capacity_changed(9).await.unwrap();
    let users: Vec<_> = promoted.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(users, ["b", "c"]);

    // Nothing left to hand out.
    assert!(h.service.on_slot_freed(9).await.unwrap().is_empty());
    assert!(h.service.on_slot_freed(9).await.unwrap().is_empty());
}

#[tokio::test]
async fn leaving_the_waitlist() {
    let h = Harness::new().await;
    h.scope(10, ScopeKind::Group, Visibility::Public, Some(0)).await;
    h.service.request_join(&user("a"), 10).await.unwrap();
    h.service.request_join(&user("b"), 10).await.unwrap();

    let gone = h.service.leave_waitlist(&user("a"), 10).await.unwrap();
    assert_eq!(gone.status, EntryStatus::Waiting);

    let err = h.service.leave_waitlist(&user("a"), 10).await.unwrap_err();
    assert!(matches!(err, AdmissionError::NotFound(_)));

    // Rejoining after leaving gets a fresh place behind b.
    let AdmissionOutcome::Waitlisted(again) = h.service.request_join(&user("a"), 10).await.unwrap()
    else {
        panic!("a should wait");
    };
    assert!(again.position > gone.position);
}

#[tokio::test]
async fn event_check_in() {
    let h = Harness::new().await;
    h.scope(11, ScopeKind::Event, Visibility::Public, None).await;
    let organizer = h.service.found_scope(11, &user("org")).await.unwrap();
    assert_eq!(organizer.role, Role::Organizer);

    let AdmissionOutcome::Accepted(m) = h.service.request_join(&user("guest"), 11).await.unwrap()
    else {
        panic!("open event");
    };
    h.clock.advance(90);
    let checked = h.service.check_in(m.id, &user("org")).await.unwrap();
    assert_eq!(checked.check_in_time, Some(T0 + 90));
}

#[tokio::test]
async fn failed_notification_delivery_does_not_undo_the_decision() {
    let h = Harness::new().await;
    h.scope(12, ScopeKind::Group, Visibility::Private, None).await;
    h.service.found_scope(12, &user("owner")).await.unwrap();
    let AdmissionOutcome::Pending(p) = h.service.request_join(&user("x"), 12).await.unwrap() else {
        panic!("pending expected");
    };

    h.sink.fail(true);
    let approved = h.service.approve(p.id, &user("owner")).await.unwrap();
    assert_eq!(approved.status, MembershipStatus::Accepted);

    let stored = h.service.membership(&user("x"), 12).await.unwrap().unwrap();
    assert_eq!(stored.status, MembershipStatus::Accepted);
}

#[tokio::test]
async fn refused_requests_emit_nothing() {
    let h = Harness::new().await;
    h.scope(13, ScopeKind::Group, Visibility::Private, None).await;
    h.service.found_scope(13, &user("owner")).await.unwrap();
    h.service.request_join(&user("x"), 13).await.unwrap();
    h.take_notifications().await;

    let err = h.service.request_join(&user("x"), 13).await.unwrap_err();
    assert!(matches!(err, AdmissionError::AlreadyActive));
    assert!(h.take_notifications().await.is_empty());
}

#[tokio::test]
async fn background_sweeper_expires_invitations() {
    let h = Harness::new().await;
    h.scope(14, ScopeKind::Group, Visibility::Public, Some(1)).await;
    h.service.request_join(&user("a"), 14).await.unwrap();
    h.service.request_join(&user("b"), 14).await.unwrap();
    h.service.leave(&user("a"), 14).await.unwrap();

    h.clock.advance(WINDOW);
    let sweeper = rollcall::spawn_invitation_sweeper(
        h.service.clone(),
        std::time::Duration::from_millis(10),
    );

    let mut expired = false;
    for _ in 0..200 {
        if h.sink.kinds_for("b").contains(&NotificationKind::InvitationExpired) {
            expired = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    sweeper.abort();
    assert!(expired, "sweeper never expired b's invitation");
}

#[tokio::test]
async fn newcomer_cannot_overtake_waiter_after_invitation_lapses() {
    let h = Harness::new().await;
    h.scope(15, ScopeKind::Group, Visibility::Public, Some(1)).await;
    h.service.request_join(&user("a"), 15).await.unwrap();
    h.service.request_join(&user("b"), 15).await.unwrap();
    let AdmissionOutcome::Waitlisted(c) = h.service.request_join(&user("c"), 15).await.unwrap()
    else {
        panic!("c should wait");
    };
    h.service.leave(&user("a"), 15).await.unwrap();

    // b's window closes and no sweep has run yet.
    h.clock.advance(WINDOW + 1);
    let outcome = h.service.request_join(&user("d"), 15).await.unwrap();
    assert!(matches!(outcome, AdmissionOutcome::Waitlisted(_)), "{outcome:?}");
    assert_eq!(h.accepted_count(15).await, 0);

    assert_eq!(
        h.kinds_for("b").await,
        [NotificationKind::WaitlistInvitation, NotificationKind::InvitationExpired]
    );
    assert_eq!(h.kinds_for("c").await, [NotificationKind::WaitlistInvitation]);
    assert!(h.kinds_for("d").await.is_empty());

    let m = h.service.accept_invitation(c.id, &user("c")).await.unwrap();
    assert_eq!(m.status, MembershipStatus::Accepted);
    assert_eq!(h.accepted_count(15).await, 1);
}

#[tokio::test]
async fn idle_scope_actors_retire() {
    let settings = rollcall::config::AdmissionConfig {
        actor_idle_ms: 50,
        ..common::settings()
    };
    let db = rollcall::Database::new(":memory:").await.unwrap();
    let h = Harness::with_database(db, settings);
    h.scope(16, ScopeKind::Group, Visibility::Public, None).await;
    h.scope(17, ScopeKind::Group, Visibility::Public, None).await;

    h.service.request_join(&user("a"), 16).await.unwrap();
    h.service.request_join(&user("a"), 17).await.unwrap();
    assert_eq!(h.service.actor_count(), 2);

    let mut retired = false;
    for _ in 0..100 {
        if h.service.actor_count() == 0 {
            retired = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(retired, "{} actors still running", h.service.actor_count());

    // The next request spawns a fresh actor that sees the stored state.
    let err = h.service.request_join(&user("a"), 16).await.unwrap_err();
    assert!(matches!(err, AdmissionError::AlreadyActive));
    h.service.request_join(&user("b"), 16).await.unwrap();
    assert_eq!(h.service.actor_count(), 1);
}

#[tokio::test]
async fn callers_come_from_the_session_layer() {
    use rollcall::{CurrentUserProvider, FixedUser};

    let h = Harness::new().await;
    h.scope(18, ScopeKind::Event, Visibility::Public, None).await;

    let session = FixedUser(Some(user("guest")));
    let caller = session.resolve().unwrap();
    let outcome = h.service.request_join(&caller, 18).await.unwrap();
    assert!(matches!(outcome, AdmissionOutcome::Accepted(ref m) if m.user_id == "guest"));

    let anonymous = FixedUser(None);
    assert!(matches!(
        anonymous.resolve().unwrap_err(),
        AdmissionError::PermissionDenied
    ));
}

/// Sink that takes longer than a caller is willing to wait.
struct SlowSink {
    delay: std::time::Duration,
    delivered: std::sync::Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl rollcall::NotificationSink for SlowSink {
    async fn send(
        &self,
        user_id: &str,
        _kind: NotificationKind,
        _related_id: i64,
    ) -> Result<(), rollcall::notify::NotifyError> {
        tokio::time::sleep(self.delay).await;
        self.delivered.lock().unwrap().push(user_id.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn slow_notification_sink_does_not_delay_replies() {
    use rollcall::{AdmissionService, Database, ManualClock, SqliteScopeLookup};
    use std::sync::Arc;

    let settings = rollcall::config::AdmissionConfig {
        request_timeout_ms: 200,
        ..common::settings()
    };
    let db = Database::new(":memory:").await.unwrap();
    let sink = Arc::new(SlowSink {
        delay: std::time::Duration::from_millis(500),
        delivered: std::sync::Mutex::new(Vec::new()),
    });
    let service = AdmissionService::new(
        db.clone(),
        Arc::new(SqliteScopeLookup::new(db.clone())),
        sink.clone(),
        Arc::new(ManualClock::new(T0)),
        settings,
    );
    let mut uow = db.begin().await.unwrap();
    uow.scopes()
        .upsert(&rollcall::Scope::new(
            19,
            "book club",
            ScopeKind::Group,
            Visibility::Private,
            None,
        ))
        .await
        .unwrap();
    uow.commit().await.unwrap();
    service.found_scope(19, &user("owner")).await.unwrap();

    // Each request notifies the owner; none of them waits for delivery.
    for name in ["x", "y"] {
        let outcome = service.request_join(&user(name), 19).await.unwrap();
        assert!(matches!(outcome, AdmissionOutcome::Pending(_)), "{name}: {outcome:?}");
    }
    assert!(sink.delivered.lock().unwrap().is_empty());

    service.flush_notifications().await;
    assert_eq!(*sink.delivered.lock().unwrap(), vec!["owner", "owner"]);
}
