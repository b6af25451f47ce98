use crate::common::*;
use entity::{
    bookings, class_sessions,
    sea_orm_active_enums::{BookingKind, BookingStatus, PaymentMethod, PaymentStatus, UserPackageStatus},
};
use futures::future::join_all;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use std::sync::Arc;
use studio_ledger::{
    config::BookingConfig,
    error::is_unique_violation,
    models::{
        actor::Actor,
        bookings::{BookingRequest, CancelOptions},
    },
    services::{notifier::LogNotifier, BookingEngine},
    BookingError,
};
use time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_package_booking_debits_one_credit() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;
    let account = create_account(&db, member, Some(5), Duration::days(30)).await;

    let booking = engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Booked);
    assert_eq!(booking.kind, BookingKind::Package);
    assert_eq!(booking.payment_status, PaymentStatus::Paid);
    assert_eq!(booking.amount_due, CLASS_PRICE);
    assert_eq!(booking.amount_paid, CLASS_PRICE);
    assert_eq!(booking.user_package_id, Some(account.id));

    assert_eq!(reload_class(&db, class.id).await.booked_count, 1);
    let account = reload_account(&db, account.id).await;
    assert_eq!(account.credits_remaining, Some(4));
    assert_eq!(account.usage_count, 1);
}

#[tokio::test]
async fn test_last_seat_goes_to_exactly_one_booking() {
    let db = setup_test_db().await;
    let engine = Arc::new(engine(&db));
    let class = create_class(&db, 1, Duration::days(1)).await;

    let members = [Uuid::new_v4(), Uuid::new_v4()];
    let attempts = members.iter().map(|member| {
        let engine = engine.clone();
        let request = BookingRequest::member_drop_in(*member, class.id, Some(PaymentMethod::Cash));
        async move { engine.create_booking(request).await }
    });
    let results = join_all(attempts).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::ClassFull)))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(full, 1);
    assert_eq!(reload_class(&db, class.id).await.booked_count, 1);
}

#[tokio::test]
async fn test_full_class_rejects_without_side_effects() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let class = create_class(&db, 10, Duration::days(1)).await;

    for _ in 0..10 {
        engine
            .create_booking(BookingRequest::member_drop_in(Uuid::new_v4(), class.id, None))
            .await
            .unwrap();
    }

    let member = Uuid::new_v4();
    let account = create_account(&db, member, Some(3), Duration::days(30)).await;
    let result = engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await;

    assert!(matches!(result, Err(BookingError::ClassFull)));
    assert_eq!(reload_class(&db, class.id).await.booked_count, 10);
    // Credit untouched because the seat was never taken
    assert_eq!(reload_account(&db, account.id).await.credits_remaining, Some(3));
}

#[tokio::test]
async fn test_member_cannot_double_book() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;
    let account = create_account(&db, member, Some(5), Duration::days(30)).await;

    engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await
        .unwrap();
    let second = engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await;

    assert!(matches!(second, Err(BookingError::AlreadyBooked)));
    assert_eq!(reload_class(&db, class.id).await.booked_count, 1);
    assert_eq!(reload_account(&db, account.id).await.credits_remaining, Some(4));
}

#[tokio::test]
async fn test_member_can_rebook_after_cancelling() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;

    let first = engine
        .create_booking(BookingRequest::member_drop_in(member, class.id, None))
        .await
        .unwrap();
    engine
        .cancel_booking(first.id, Actor::Member(member), CancelOptions::default())
        .await
        .unwrap();

    let again = engine
        .create_booking(BookingRequest::member_drop_in(member, class.id, None))
        .await;
    assert!(again.is_ok());
    assert_eq!(reload_class(&db, class.id).await.booked_count, 1);
}

#[tokio::test]
async fn test_cancel_restores_seat_and_credit() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(2)).await;
    let account = create_account(&db, member, Some(5), Duration::days(30)).await;

    let booking = engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await
        .unwrap();

    let outcome = engine
        .cancel_booking(booking.id, Actor::Member(member), CancelOptions::default())
        .await
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.booking.status, BookingStatus::Cancelled);
    assert!(outcome.booking.cancelled_at.is_some());
    assert!(outcome.booking.credit_refunded);

    assert_eq!(reload_class(&db, class.id).await.booked_count, 0);
    let account = reload_account(&db, account.id).await;
    assert_eq!(account.credits_remaining, Some(5));
    assert_eq!(account.usage_count, 0);
}

#[tokio::test]
async fn test_repeated_cancel_is_a_no_op() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(2)).await;
    let account = create_account(&db, member, Some(5), Duration::days(30)).await;

    // Someone else holds a seat so a double release would be visible
    engine
        .create_booking(BookingRequest::member_drop_in(Uuid::new_v4(), class.id, None))
        .await
        .unwrap();
    let booking = engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await
        .unwrap();

    let first = engine
        .cancel_booking(booking.id, Actor::Member(member), CancelOptions::default())
        .await
        .unwrap();
    let second = engine
        .cancel_booking(booking.id, Actor::Member(member), CancelOptions::default())
        .await
        .unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(second.booking.status, BookingStatus::Cancelled);
    assert_eq!(reload_class(&db, class.id).await.booked_count, 1);
    assert_eq!(reload_account(&db, account.id).await.credits_remaining, Some(5));
}

#[tokio::test]
async fn test_concurrent_cancels_release_once() {
    let db = setup_test_db().await;
    let engine = Arc::new(engine(&db));
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(2)).await;
    let account = create_account(&db, member, Some(2), Duration::days(30)).await;

    let booking = engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await
        .unwrap();

    let cancels = (0..3).map(|_| {
        let engine = engine.clone();
        async move {
            engine
                .cancel_booking(booking.id, Actor::Member(member), CancelOptions::default())
                .await
        }
    });
    let results = join_all(cancels).await;

    let changed = results
        .iter()
        .filter(|r| matches!(r, Ok(outcome) if outcome.changed))
        .count();
    assert_eq!(changed, 1);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(reload_class(&db, class.id).await.booked_count, 0);
    assert_eq!(reload_account(&db, account.id).await.credits_remaining, Some(2));
}

#[tokio::test]
async fn test_late_cancel_keeps_credit() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    // Inside the 120 minute refund cutoff
    let class = create_class(&db, 10, Duration::minutes(30)).await;
    let account = create_account(&db, member, Some(5), Duration::days(30)).await;

    let booking = engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await
        .unwrap();
    let outcome = engine
        .cancel_booking(booking.id, Actor::Member(member), CancelOptions::default())
        .await
        .unwrap();

    assert!(!outcome.booking.credit_refunded);
    assert_eq!(reload_class(&db, class.id).await.booked_count, 0);
    assert_eq!(reload_account(&db, account.id).await.credits_remaining, Some(4));
}

#[tokio::test]
async fn test_admin_can_force_refund_after_cutoff() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::minutes(30)).await;
    let account = create_account(&db, member, Some(5), Duration::days(30)).await;

    let booking = engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await
        .unwrap();
    let outcome = engine
        .cancel_booking(
            booking.id,
            Actor::Admin(admin),
            CancelOptions { force_refund: true },
        )
        .await
        .unwrap();

    assert!(outcome.booking.credit_refunded);
    assert_eq!(reload_account(&db, account.id).await.credits_remaining, Some(5));
}

#[tokio::test]
async fn test_member_force_refund_is_ignored() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::minutes(30)).await;
    let account = create_account(&db, member, Some(5), Duration::days(30)).await;

    let booking = engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await
        .unwrap();
    let outcome = engine
        .cancel_booking(
            booking.id,
            Actor::Member(member),
            CancelOptions { force_refund: true },
        )
        .await
        .unwrap();

    assert!(!outcome.booking.credit_refunded);
    assert_eq!(reload_account(&db, account.id).await.credits_remaining, Some(4));
}

#[tokio::test]
async fn test_member_cannot_cancel_someone_elses_booking() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let owner = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;

    let booking = engine
        .create_booking(BookingRequest::member_drop_in(owner, class.id, None))
        .await
        .unwrap();
    let result = engine
        .cancel_booking(
            booking.id,
            Actor::Member(Uuid::new_v4()),
            CancelOptions::default(),
        )
        .await;

    assert!(matches!(result, Err(BookingError::BookingNotFound(_))));
    assert_eq!(reload_class(&db, class.id).await.booked_count, 1);
}

#[tokio::test]
async fn test_walk_in_guest_drop_in() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let admin = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;

    let booking = engine
        .create_booking(BookingRequest::walk_in_guest(
            admin,
            class.id,
            "Walk-in Guest",
            "+66 81 234 5678",
            Some(PaymentMethod::Cash),
        ))
        .await
        .unwrap();

    assert_eq!(booking.user_id, None);
    assert_eq!(booking.guest_name.as_deref(), Some("Walk-in Guest"));
    assert_eq!(booking.kind, BookingKind::DropIn);
    assert_eq!(booking.payment_status, PaymentStatus::Unpaid);
    assert_eq!(booking.amount_due, CLASS_PRICE);
    assert_eq!(booking.amount_paid, 0);
    assert_eq!(booking.user_package_id, None);
    assert_eq!(booking.created_by, admin);
    assert_eq!(reload_class(&db, class.id).await.booked_count, 1);
}

#[tokio::test]
async fn test_members_cannot_book_guests_or_others() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;

    let mut guest = BookingRequest::walk_in_guest(member, class.id, "Friend", "friend@example.com", None);
    guest.actor = Actor::Member(member);
    assert!(matches!(
        engine.create_booking(guest).await,
        Err(BookingError::Forbidden(_))
    ));

    let mut for_other = BookingRequest::member_drop_in(Uuid::new_v4(), class.id, None);
    for_other.actor = Actor::Member(member);
    assert!(matches!(
        engine.create_booking(for_other).await,
        Err(BookingError::Forbidden(_))
    ));

    assert_eq!(reload_class(&db, class.id).await.booked_count, 0);
}

#[tokio::test]
async fn test_request_validation() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;

    // Package booking without an account
    let mut request = BookingRequest::member_drop_in(member, class.id, None);
    request.kind = BookingKind::Package;
    assert!(matches!(
        engine.create_booking(request).await,
        Err(BookingError::Validation(_))
    ));

    // Guest without contact
    let guest = BookingRequest::walk_in_guest(Uuid::new_v4(), class.id, "Guest", "  ", None);
    assert!(matches!(
        engine.create_booking(guest).await,
        Err(BookingError::Validation(_))
    ));

    // Slip that is not an http(s) URL
    let mut request = BookingRequest::member_drop_in(member, class.id, None);
    request.slip_url = Some("file:///tmp/slip.png".to_string());
    assert!(matches!(
        engine.create_booking(request).await,
        Err(BookingError::Validation(_))
    ));
}

#[tokio::test]
async fn test_drop_in_with_slip_waits_for_verification() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;

    let mut request =
        BookingRequest::member_drop_in(member, class.id, Some(PaymentMethod::BankTransfer));
    request.slip_url = Some("https://cdn.example.com/slips/1.jpg".to_string());
    let booking = engine.create_booking(request).await.unwrap();

    assert_eq!(booking.payment_status, PaymentStatus::PendingVerification);
    assert_eq!(booking.amount_paid, 0);
}

#[tokio::test]
async fn test_missing_and_cancelled_classes() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();

    let missing = engine
        .create_booking(BookingRequest::member_drop_in(member, Uuid::new_v4(), None))
        .await;
    assert!(matches!(missing, Err(BookingError::ClassNotFound(_))));

    let class = create_class(&db, 10, Duration::days(1)).await;
    catalog(&db)
        .cancel_class(Actor::Admin(Uuid::new_v4()), class.id)
        .await
        .unwrap();

    let cancelled = engine
        .create_booking(BookingRequest::member_drop_in(member, class.id, None))
        .await;
    assert!(matches!(cancelled, Err(BookingError::ClassCancelled)));
    assert_eq!(reload_class(&db, class.id).await.booked_count, 0);
}

#[tokio::test]
async fn test_booking_closed_after_start() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let class = create_class(&db, 10, -Duration::hours(1)).await;

    let result = engine
        .create_booking(BookingRequest::member_drop_in(Uuid::new_v4(), class.id, None))
        .await;

    assert!(matches!(result, Err(BookingError::Validation(_))));
}

#[tokio::test]
async fn test_insufficient_credits_rolls_back_seat() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let first = create_class(&db, 10, Duration::days(1)).await;
    let second = create_class(&db, 10, Duration::days(2)).await;
    let account = create_account(&db, member, Some(1), Duration::days(30)).await;

    engine
        .create_booking(BookingRequest::member_package(member, first.id, account.id))
        .await
        .unwrap();
    let result = engine
        .create_booking(BookingRequest::member_package(member, second.id, account.id))
        .await;

    assert!(matches!(result, Err(BookingError::InsufficientCredits)));
    assert_eq!(reload_class(&db, second.id).await.booked_count, 0);
    assert_eq!(reload_account(&db, account.id).await.credits_remaining, Some(0));
}

#[tokio::test]
async fn test_expired_account_is_flagged_and_rejected() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;
    let account = create_account(&db, member, Some(5), -Duration::hours(1)).await;

    let result = engine
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await;

    assert!(matches!(result, Err(BookingError::PackageExpired)));
    let account = reload_account(&db, account.id).await;
    assert_eq!(account.status, UserPackageStatus::Expired);
    assert_eq!(account.credits_remaining, Some(5));
    assert_eq!(reload_class(&db, class.id).await.booked_count, 0);
}

#[tokio::test]
async fn test_someone_elses_package_is_not_found() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let class = create_class(&db, 10, Duration::days(1)).await;
    let account = create_account(&db, Uuid::new_v4(), Some(5), Duration::days(30)).await;

    let result = engine
        .create_booking(BookingRequest::member_package(
            Uuid::new_v4(),
            class.id,
            account.id,
        ))
        .await;

    assert!(matches!(result, Err(BookingError::PackageNotFound(_))));
    assert_eq!(reload_account(&db, account.id).await.credits_remaining, Some(5));
}

#[tokio::test]
async fn test_unlimited_account_tracks_usage() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let account = create_account(&db, member, None, Duration::days(30)).await;

    let mut booked = Vec::new();
    for day in 1..=3 {
        let class = create_class(&db, 10, Duration::days(day)).await;
        booked.push(
            engine
                .create_booking(BookingRequest::member_package(member, class.id, account.id))
                .await
                .unwrap(),
        );
    }

    let after_booking = reload_account(&db, account.id).await;
    assert_eq!(after_booking.credits_remaining, None);
    assert_eq!(after_booking.usage_count, 3);

    engine
        .cancel_booking(booked[2].id, Actor::Member(member), CancelOptions::default())
        .await
        .unwrap();
    assert_eq!(reload_account(&db, account.id).await.usage_count, 2);
}

#[tokio::test]
async fn test_attendance_transitions() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let admin = Actor::Admin(Uuid::new_v4());
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;

    let booking = engine
        .create_booking(BookingRequest::member_drop_in(member, class.id, None))
        .await
        .unwrap();

    assert!(matches!(
        engine.mark_attended(booking.id, Actor::Member(member)).await,
        Err(BookingError::Forbidden(_))
    ));

    let attended = engine.mark_attended(booking.id, admin).await.unwrap();
    assert_eq!(attended.status, BookingStatus::Attended);
    assert!(attended.is_attended);
    // Attendance keeps the seat
    assert_eq!(reload_class(&db, class.id).await.booked_count, 1);

    assert!(matches!(
        engine.mark_no_show(booking.id, admin).await,
        Err(BookingError::InvalidStateTransition(_))
    ));
    assert!(matches!(
        engine
            .cancel_booking(booking.id, admin, CancelOptions::default())
            .await,
        Err(BookingError::InvalidStateTransition(_))
    ));
}

#[tokio::test]
async fn test_failing_notifier_does_not_affect_booking() {
    let db = setup_test_db().await;
    let notifier = Arc::new(FailingNotifier::default());
    let engine = engine_with(&db, test_policy(), notifier.clone());
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;

    let booking = engine
        .create_booking(BookingRequest::member_drop_in(member, class.id, None))
        .await;
    assert!(booking.is_ok());

    // Give the spawned delivery a chance to run
    for _ in 0..50 {
        if notifier.calls() > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(notifier.calls(), 1);

    let stored = bookings::Entity::find()
        .filter(bookings::Column::ClassId.eq(class.id))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn test_listings() {
    let db = setup_test_db().await;
    let engine = engine(&db);
    let member = Uuid::new_v4();
    let first = create_class(&db, 10, Duration::days(1)).await;
    let second = create_class(&db, 10, Duration::days(2)).await;

    let kept = engine
        .create_booking(BookingRequest::member_drop_in(member, first.id, None))
        .await
        .unwrap();
    let dropped = engine
        .create_booking(BookingRequest::member_drop_in(member, second.id, None))
        .await
        .unwrap();
    engine
        .cancel_booking(dropped.id, Actor::Member(member), CancelOptions::default())
        .await
        .unwrap();

    let live = engine.list_bookings_for_user(member, false).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, kept.id);
    assert_eq!(engine.list_bookings_for_user(member, true).await.unwrap().len(), 2);

    assert!(matches!(
        engine
            .list_bookings_for_class(first.id, Actor::Member(member))
            .await,
        Err(BookingError::Forbidden(_))
    ));
    let roster = engine
        .list_bookings_for_class(first.id, Actor::Admin(Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(roster.len(), 1);
}

/// Engine whose request budget is already spent when the first query runs
fn impatient_engine(db: &sea_orm::DatabaseConnection) -> BookingEngine {
    engine_with(
        db,
        BookingConfig {
            request_timeout_ms: 0,
            ..test_policy()
        },
        Arc::new(LogNotifier),
    )
}

async fn bookings_for_class(db: &sea_orm::DatabaseConnection, class_id: Uuid) -> u64 {
    bookings::Entity::find()
        .filter(bookings::Column::ClassId.eq(class_id))
        .count(db)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_timed_out_booking_leaves_no_trace() {
    let db = setup_test_db().await;
    let impatient = impatient_engine(&db);
    let patient = engine(&db);
    let member = Uuid::new_v4();
    let account = create_account(&db, member, Some(40), Duration::days(30)).await;

    let mut timeouts = 0;
    for _ in 0..20 {
        let class = create_class(&db, 10, Duration::days(1)).await;
        let credits_before = reload_account(&db, account.id).await.credits_remaining;

        match impatient
            .create_booking(BookingRequest::member_package(member, class.id, account.id))
            .await
        {
            Err(BookingError::Timeout) => {
                timeouts += 1;
                assert_eq!(reload_class(&db, class.id).await.booked_count, 0);
                assert_eq!(
                    reload_account(&db, account.id).await.credits_remaining,
                    credits_before
                );
                assert_eq!(bookings_for_class(&db, class.id).await, 0);

                // Nothing was kept, so booking again is a fresh booking
                patient
                    .create_booking(BookingRequest::member_package(member, class.id, account.id))
                    .await
                    .unwrap();
            }
            Ok(_) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(reload_class(&db, class.id).await.booked_count, 1);
        assert_eq!(bookings_for_class(&db, class.id).await, 1);
        assert_eq!(
            reload_account(&db, account.id).await.credits_remaining,
            credits_before.map(|c| c - 1)
        );
    }

    assert!(timeouts > 0);
}

#[tokio::test]
async fn test_timed_out_cancel_and_attendance_change_nothing() {
    let db = setup_test_db().await;
    let impatient = impatient_engine(&db);
    let patient = engine(&db);
    let member = Uuid::new_v4();
    let admin = Actor::Admin(Uuid::new_v4());
    let account = create_account(&db, member, Some(40), Duration::days(30)).await;

    let mut timeouts = 0;
    for _ in 0..10 {
        let class = create_class(&db, 10, Duration::days(1)).await;
        let booking = patient
            .create_booking(BookingRequest::member_package(member, class.id, account.id))
            .await
            .unwrap();
        let credits_before = reload_account(&db, account.id).await.credits_remaining;

        match impatient
            .cancel_booking(booking.id, Actor::Member(member), CancelOptions::default())
            .await
        {
            Err(BookingError::Timeout) => {
                timeouts += 1;
                let current = patient.get_booking(booking.id, admin).await.unwrap();
                assert_eq!(current.status, BookingStatus::Booked);
                assert!(!current.credit_refunded);
                assert_eq!(reload_class(&db, class.id).await.booked_count, 1);
                assert_eq!(
                    reload_account(&db, account.id).await.credits_remaining,
                    credits_before
                );
            }
            Ok(outcome) => {
                assert!(outcome.changed);
                continue;
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }

        match impatient.mark_attended(booking.id, admin).await {
            Err(BookingError::Timeout) => {
                let current = patient.get_booking(booking.id, admin).await.unwrap();
                assert_eq!(current.status, BookingStatus::Booked);
                assert!(!current.is_attended);
            }
            Ok(attended) => assert_eq!(attended.status, BookingStatus::Attended),
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert!(timeouts > 0);
}

#[tokio::test]
async fn test_only_the_live_booking_index_counts_as_duplicate() {
    let db = setup_test_db().await;
    let member = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;

    let row = |id: Uuid| {
        let now = time::OffsetDateTime::now_utc();
        bookings::ActiveModel {
            id: Set(id),
            user_id: Set(Some(member)),
            guest_name: Set(None),
            guest_contact: Set(None),
            class_id: Set(class.id),
            kind: Set(BookingKind::DropIn),
            status: Set(BookingStatus::Booked),
            is_attended: Set(false),
            user_package_id: Set(None),
            payment_status: Set(PaymentStatus::Unpaid),
            amount_due: Set(CLASS_PRICE),
            amount_paid: Set(0),
            payment_method: Set(None),
            payment_slip_url: Set(None),
            payment_note: Set(None),
            paid_at: Set(None),
            cancelled_at: Set(None),
            credit_refunded: Set(false),
            created_by: Set(member),
            created_at: Set(now),
            updated_at: Set(now),
        }
    };

    row(Uuid::new_v4()).insert(&db).await.unwrap();
    let duplicate = row(Uuid::new_v4()).insert(&db).await.unwrap_err();
    assert!(is_unique_violation(&duplicate));

    // A CHECK failure is not a duplicate booking
    let overfilled = class_sessions::Entity::update_many()
        .col_expr(
            class_sessions::Column::BookedCount,
            Expr::col(class_sessions::Column::Capacity).add(1),
        )
        .filter(class_sessions::Column::Id.eq(class.id))
        .exec(&db)
        .await
        .unwrap_err();
    assert!(!is_unique_violation(&overfilled));
}
