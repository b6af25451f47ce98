use crate::common::*;
use entity::sea_orm_active_enums::{PaymentLogStatus, PaymentMethod, PaymentStatus};
use studio_ledger::{
    models::{
        actor::Actor,
        bookings::{BookingRequest, CancelOptions},
        payments::{ApprovePaymentRequest, MarkCashPaidRequest, SlipUploadRequest},
    },
    BookingError,
};
use time::Duration;
use uuid::Uuid;

const SLIP: &str = "https://cdn.example.com/slips/transfer-001.jpg";

fn slip() -> SlipUploadRequest {
    SlipUploadRequest {
        slip_url: SLIP.to_string(),
        note: Some("Transferred from SCB".to_string()),
        payment_method: Some(PaymentMethod::BankTransfer),
    }
}

fn approve(amount: i64) -> ApprovePaymentRequest {
    ApprovePaymentRequest {
        confirmed_amount: amount,
        note: None,
    }
}

fn cash(amount: i64) -> MarkCashPaidRequest {
    MarkCashPaidRequest {
        amount,
        method: PaymentMethod::Cash,
        note: None,
    }
}

/// Member drop-in booking on a fresh class
async fn drop_in(db: &sea_orm::DatabaseConnection, member: Uuid) -> entity::bookings::Model {
    let class = create_class(db, 10, Duration::days(1)).await;
    engine(db)
        .create_booking(BookingRequest::member_drop_in(member, class.id, None))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_slip_then_full_approval_is_paid() {
    let db = setup_test_db().await;
    let workflow = payments(&db);
    let member = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let booking = drop_in(&db, member).await;

    let pending = workflow
        .upload_slip(booking.id, Actor::Member(member), slip())
        .await
        .unwrap();
    assert_eq!(pending.payment_status, PaymentStatus::PendingVerification);
    assert_eq!(pending.payment_slip_url.as_deref(), Some(SLIP));
    assert_eq!(pending.payment_method, Some(PaymentMethod::BankTransfer));

    let paid = workflow
        .approve(booking.id, Actor::Admin(admin), approve(CLASS_PRICE))
        .await
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.amount_paid, CLASS_PRICE);
    assert!(paid.paid_at.is_some());

    let history = workflow
        .payment_history(booking.id, Actor::Member(member))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].amount, CLASS_PRICE);
    assert_eq!(history[0].recorded_by, admin);
    assert_eq!(history[0].log_status, PaymentLogStatus::Verified);
    assert_eq!(history[0].evidence_url.as_deref(), Some(SLIP));
}

#[tokio::test]
async fn test_reject_returns_to_unpaid_and_clears_slip() {
    let db = setup_test_db().await;
    let workflow = payments(&db);
    let member = Uuid::new_v4();
    let booking = drop_in(&db, member).await;

    workflow
        .upload_slip(booking.id, Actor::Member(member), slip())
        .await
        .unwrap();
    let rejected = workflow
        .reject(
            booking.id,
            Actor::Admin(Uuid::new_v4()),
            Some("Amount does not match".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(rejected.payment_status, PaymentStatus::Unpaid);
    assert_eq!(rejected.payment_slip_url, None);
    assert_eq!(rejected.payment_note.as_deref(), Some("Amount does not match"));
    assert_eq!(rejected.amount_paid, 0);

    // Member may try again
    let retried = workflow
        .upload_slip(booking.id, Actor::Member(member), slip())
        .await
        .unwrap();
    assert_eq!(retried.payment_status, PaymentStatus::PendingVerification);
}

#[tokio::test]
async fn test_partial_approval_then_cash_settles() {
    let db = setup_test_db().await;
    let workflow = payments(&db);
    let member = Uuid::new_v4();
    let admin = Actor::Admin(Uuid::new_v4());
    let booking = drop_in(&db, member).await;

    workflow
        .upload_slip(booking.id, Actor::Member(member), slip())
        .await
        .unwrap();
    let partial = workflow
        .approve(booking.id, admin, approve(10_000))
        .await
        .unwrap();
    assert_eq!(partial.payment_status, PaymentStatus::Partial);
    assert_eq!(partial.amount_paid, 10_000);
    assert!(partial.paid_at.is_none());

    assert!(matches!(
        workflow.mark_cash_paid(booking.id, admin, cash(5_000)).await,
        Err(BookingError::Validation(_))
    ));

    let paid = workflow
        .mark_cash_paid(booking.id, admin, cash(CLASS_PRICE - 10_000))
        .await
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.amount_paid, CLASS_PRICE);
    assert_eq!(paid.payment_method, Some(PaymentMethod::Cash));

    let history = workflow.payment_history(booking.id, admin).await.unwrap();
    assert_eq!(history.len(), 2);
    let total: i64 = history.iter().map(|p| p.amount).sum();
    assert_eq!(total, CLASS_PRICE);
}

#[tokio::test]
async fn test_cash_for_walk_in_guest() {
    let db = setup_test_db().await;
    let workflow = payments(&db);
    let admin = Uuid::new_v4();
    let class = create_class(&db, 10, Duration::days(1)).await;

    let booking = engine(&db)
        .create_booking(BookingRequest::walk_in_guest(
            admin,
            class.id,
            "Guest",
            "guest@example.com",
            Some(PaymentMethod::Cash),
        ))
        .await
        .unwrap();

    let paid = workflow
        .mark_cash_paid(booking.id, Actor::Admin(admin), cash(CLASS_PRICE))
        .await
        .unwrap();

    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    let history = workflow
        .payment_history(booking.id, Actor::Admin(admin))
        .await
        .unwrap();
    assert_eq!(history[0].user_id, None);
}

#[tokio::test]
async fn test_members_cannot_verify_payments() {
    let db = setup_test_db().await;
    let workflow = payments(&db);
    let member = Uuid::new_v4();
    let booking = drop_in(&db, member).await;

    workflow
        .upload_slip(booking.id, Actor::Member(member), slip())
        .await
        .unwrap();

    assert!(matches!(
        workflow
            .approve(booking.id, Actor::Member(member), approve(CLASS_PRICE))
            .await,
        Err(BookingError::Forbidden(_))
    ));
    assert!(matches!(
        workflow.reject(booking.id, Actor::Member(member), None).await,
        Err(BookingError::Forbidden(_))
    ));
    assert!(matches!(
        workflow
            .mark_cash_paid(booking.id, Actor::Member(member), cash(CLASS_PRICE))
            .await,
        Err(BookingError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_slip_rules() {
    let db = setup_test_db().await;
    let workflow = payments(&db);
    let member = Uuid::new_v4();
    let booking = drop_in(&db, member).await;

    // Someone else's booking
    assert!(matches!(
        workflow
            .upload_slip(booking.id, Actor::Member(Uuid::new_v4()), slip())
            .await,
        Err(BookingError::BookingNotFound(_))
    ));

    // Non-http evidence
    let mut bad = slip();
    bad.slip_url = "ftp://example.com/slip.jpg".to_string();
    assert!(matches!(
        workflow.upload_slip(booking.id, Actor::Member(member), bad).await,
        Err(BookingError::Validation(_))
    ));

    // Package bookings are settled by credit
    let class = create_class(&db, 10, Duration::days(1)).await;
    let account = create_account(&db, member, Some(2), Duration::days(30)).await;
    let package_booking = engine(&db)
        .create_booking(BookingRequest::member_package(member, class.id, account.id))
        .await
        .unwrap();
    assert!(matches!(
        workflow
            .upload_slip(package_booking.id, Actor::Member(member), slip())
            .await,
        Err(BookingError::InvalidStateTransition(_))
    ));

    // Nothing to approve before a slip arrives
    assert!(matches!(
        workflow
            .approve(booking.id, Actor::Admin(Uuid::new_v4()), approve(CLASS_PRICE))
            .await,
        Err(BookingError::InvalidStateTransition(_))
    ));
}

#[tokio::test]
async fn test_cancelling_paid_drop_in_flags_refund() {
    let db = setup_test_db().await;
    let workflow = payments(&db);
    let member = Uuid::new_v4();
    let admin = Actor::Admin(Uuid::new_v4());
    let booking = drop_in(&db, member).await;

    workflow
        .mark_cash_paid(booking.id, admin, cash(CLASS_PRICE))
        .await
        .unwrap();

    let outcome = engine(&db)
        .cancel_booking(booking.id, Actor::Member(member), CancelOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.booking.payment_status, PaymentStatus::RefundPending);
    assert_eq!(outcome.booking.amount_paid, CLASS_PRICE);
}

#[tokio::test]
async fn test_approval_after_cancel_needs_refund() {
    let db = setup_test_db().await;
    let workflow = payments(&db);
    let member = Uuid::new_v4();
    let booking = drop_in(&db, member).await;

    workflow
        .upload_slip(booking.id, Actor::Member(member), slip())
        .await
        .unwrap();
    let cancelled = engine(&db)
        .cancel_booking(booking.id, Actor::Member(member), CancelOptions::default())
        .await
        .unwrap();
    assert_eq!(
        cancelled.booking.payment_status,
        PaymentStatus::PendingVerification
    );

    let approved = workflow
        .approve(booking.id, Actor::Admin(Uuid::new_v4()), approve(CLASS_PRICE))
        .await
        .unwrap();
    assert_eq!(approved.payment_status, PaymentStatus::RefundPending);

    // No new evidence on a cancelled booking
    assert!(matches!(
        workflow
            .upload_slip(booking.id, Actor::Member(member), slip())
            .await,
        Err(BookingError::InvalidStateTransition(_))
    ));
}

#[tokio::test]
async fn test_payment_method_choice() {
    let db = setup_test_db().await;
    let workflow = payments(&db);
    let member = Uuid::new_v4();
    let booking = drop_in(&db, member).await;

    let updated = workflow
        .set_payment_method(booking.id, Actor::Member(member), PaymentMethod::Promptpay)
        .await
        .unwrap();
    assert_eq!(updated.payment_method, Some(PaymentMethod::Promptpay));
    assert_eq!(updated.payment_status, PaymentStatus::Unpaid);

    workflow
        .mark_cash_paid(booking.id, Actor::Admin(Uuid::new_v4()), cash(CLASS_PRICE))
        .await
        .unwrap();
    assert!(matches!(
        workflow
            .set_payment_method(booking.id, Actor::Member(member), PaymentMethod::CreditCard)
            .await,
        Err(BookingError::InvalidStateTransition(_))
    ));
}
