//! Booking engine: seat reservation and package debits in one transaction
//!
//! Capacity and credits are guarded by conditional UPDATEs
//! (`booked_count < capacity`, `credits_remaining >= n`) checked through the
//! affected-row count. Both statements share one ledger transaction, so a
//! failed debit rolls the seat back with it. Nothing here reads a counter
//! into application code and writes it back.
//!
//! The request timeout bounds the in-transaction work only. COMMIT is sent
//! after that work has finished, so `Timeout` always means rolled back.

use crate::{
    config::BookingConfig,
    error::{is_unique_violation, BookingError},
    models::{
        actor::Actor,
        booking_ext::BookingExt,
        bookings::{Attendee, BookingRequest, CancelOptions, CancelOutcome},
    },
    services::{
        credit_account::CreditAccountService,
        notifier::{self, Notifier, StudioEvent},
        retry::RetryPolicy,
    },
};
use entity::{
    bookings, class_sessions,
    sea_orm_active_enums::{BookingKind, BookingStatus, PaymentStatus},
    user_packages,
};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, DatabaseConnection, DatabaseTransaction,
    TransactionTrait,
};
use std::{future::Future, sync::Arc};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const MAX_GUEST_FIELD_LEN: usize = 120;

pub struct BookingEngine {
    db: DatabaseConnection,
    policy: BookingConfig,
    retry: RetryPolicy,
    notifier: Arc<dyn Notifier>,
}

impl BookingEngine {
    pub fn new(db: DatabaseConnection, policy: BookingConfig, notifier: Arc<dyn Notifier>) -> Self {
        let retry = RetryPolicy::from_config(&policy);
        Self {
            db,
            policy,
            retry,
            notifier,
        }
    }

    // ------------------------------------------------------------------
    // create_booking
    // ------------------------------------------------------------------

    /// Reserve a seat and, for package bookings, debit one credit.
    #[instrument(skip(self, request), fields(class_id = %request.class_id, kind = ?request.kind))]
    pub async fn create_booking(
        &self,
        request: BookingRequest,
    ) -> Result<bookings::Model, BookingError> {
        self.validate_request(&request)?;

        let booking = self
            .retry
            .run("create_booking", || self.create_booking_once(&request))
            .await?;

        info!(
            booking_id = %booking.id,
            class_id = %booking.class_id,
            user_id = ?booking.user_id,
            payment_status = ?booking.payment_status,
            "Booking created"
        );

        notifier::dispatch(
            self.notifier.clone(),
            StudioEvent::BookingConfirmed {
                booking_id: booking.id,
                class_id: booking.class_id,
                user_id: booking.user_id,
                guest_contact: booking.guest_contact.clone(),
            },
        );

        Ok(booking)
    }

    fn validate_request(&self, request: &BookingRequest) -> Result<(), BookingError> {
        match &request.attendee {
            Attendee::Member(user_id) => {
                if !request.actor.may_act_for(Some(*user_id)) {
                    return Err(BookingError::Forbidden(
                        "Members can only book for themselves".to_string(),
                    ));
                }
            }
            Attendee::Guest { name, contact } => {
                if !request.actor.is_admin() {
                    return Err(BookingError::Forbidden(
                        "Guest bookings are made by studio staff".to_string(),
                    ));
                }
                let name = name.trim();
                let contact = contact.trim();
                if name.is_empty() || contact.is_empty() {
                    return Err(BookingError::Validation(
                        "Guest bookings need a name and a contact".to_string(),
                    ));
                }
                if name.len() > MAX_GUEST_FIELD_LEN || contact.len() > MAX_GUEST_FIELD_LEN {
                    return Err(BookingError::Validation(
                        "Guest name or contact is too long".to_string(),
                    ));
                }
                if request.kind == BookingKind::Package {
                    return Err(BookingError::Validation(
                        "Guests can only book drop-in".to_string(),
                    ));
                }
            }
        }

        match request.kind {
            BookingKind::Package => {
                if request.user_package_id.is_none() {
                    return Err(BookingError::Validation(
                        "Package bookings require user_package_id".to_string(),
                    ));
                }
                if request.payment_method.is_some() || request.slip_url.is_some() {
                    return Err(BookingError::Validation(
                        "Package bookings are paid by credit, not by payment method".to_string(),
                    ));
                }
            }
            BookingKind::DropIn => {
                if request.user_package_id.is_some() {
                    return Err(BookingError::Validation(
                        "Drop-in bookings cannot reference a package".to_string(),
                    ));
                }
            }
        }

        if let Some(slip_url) = &request.slip_url {
            validate_slip_url(slip_url)?;
        }

        Ok(())
    }

    async fn create_booking_once(
        &self,
        request: &BookingRequest,
    ) -> Result<bookings::Model, BookingError> {
        let txn = self.db.begin().await?;

        match self
            .with_timeout(self.create_booking_in_txn(&txn, request))
            .await
        {
            Ok(booking) => {
                txn.commit().await?;
                Ok(booking)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("Rollback after failed booking errored: {}", rollback_err);
                }
                if let (BookingError::PackageExpired, Some(package_id)) =
                    (&e, request.user_package_id)
                {
                    if let Err(expire_err) =
                        CreditAccountService::expire_if_lapsed(&self.db, package_id).await
                    {
                        warn!(
                            user_package_id = %package_id,
                            "Failed to flag lapsed credit account: {}", expire_err
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn create_booking_in_txn(
        &self,
        txn: &DatabaseTransaction,
        request: &BookingRequest,
    ) -> Result<bookings::Model, BookingError> {
        let now = OffsetDateTime::now_utc();

        let class = class_sessions::Entity::find_by_id(request.class_id)
            .one(txn)
            .await?
            .ok_or(BookingError::ClassNotFound(request.class_id))?;

        if class.is_cancelled {
            return Err(BookingError::ClassCancelled);
        }
        if now >= class.starts_at - self.policy.booking_cutoff() {
            return Err(BookingError::Validation(
                "Booking for this class is closed".to_string(),
            ));
        }

        let user_id = request.attendee.user_id();

        if let Some(user_id) = user_id {
            let existing = bookings::Entity::find()
                .filter(bookings::Column::ClassId.eq(class.id))
                .filter(bookings::Column::UserId.eq(user_id))
                .filter(bookings::Column::Status.ne(BookingStatus::Cancelled))
                .count(txn)
                .await?;
            if existing > 0 {
                return Err(BookingError::AlreadyBooked);
            }
        }

        // Ownership check before any state change
        if let (BookingKind::Package, Some(package_id)) = (request.kind, request.user_package_id) {
            let account = user_packages::Entity::find_by_id(package_id)
                .one(txn)
                .await?
                .ok_or(BookingError::PackageNotFound(package_id))?;
            if Some(account.user_id) != user_id {
                return Err(BookingError::PackageNotFound(package_id));
            }
            CreditAccountService::ensure_fundable(&account, now)?;
        }

        self.reserve_seat(txn, class.id, now).await?;

        if let (BookingKind::Package, Some(package_id)) = (request.kind, request.user_package_id) {
            CreditAccountService::debit(txn, package_id, 1).await?;
        }

        let (payment_status, amount_paid, paid_at) = match request.kind {
            BookingKind::Package => (PaymentStatus::Paid, class.price, Some(now)),
            BookingKind::DropIn if request.slip_url.is_some() => {
                (PaymentStatus::PendingVerification, 0, None)
            }
            BookingKind::DropIn => (PaymentStatus::Unpaid, 0, None),
        };

        let (guest_name, guest_contact) = match &request.attendee {
            Attendee::Member(_) => (None, None),
            Attendee::Guest { name, contact } => {
                (Some(name.trim().to_string()), Some(contact.trim().to_string()))
            }
        };

        let booking = bookings::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            guest_name: Set(guest_name),
            guest_contact: Set(guest_contact),
            class_id: Set(class.id),
            kind: Set(request.kind),
            status: Set(BookingStatus::Booked),
            is_attended: Set(false),
            user_package_id: Set(request.user_package_id),
            payment_status: Set(payment_status),
            amount_due: Set(class.price),
            amount_paid: Set(amount_paid),
            payment_method: Set(request.payment_method),
            payment_slip_url: Set(request.slip_url.clone()),
            payment_note: Set(None),
            paid_at: Set(paid_at),
            cancelled_at: Set(None),
            credit_refunded: Set(false),
            created_by: Set(request.actor.id()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await
        .map_err(|e| {
            // The partial unique index catches a concurrent duplicate
            if is_unique_violation(&e) {
                BookingError::AlreadyBooked
            } else {
                BookingError::from(e)
            }
        })?;

        Ok(booking)
    }

    /// `booked_count + 1` only while below capacity
    async fn reserve_seat(
        &self,
        txn: &DatabaseTransaction,
        class_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<(), BookingError> {
        let result = class_sessions::Entity::update_many()
            .col_expr(
                class_sessions::Column::BookedCount,
                Expr::col(class_sessions::Column::BookedCount).add(1),
            )
            .col_expr(class_sessions::Column::UpdatedAt, Expr::value(now))
            .filter(class_sessions::Column::Id.eq(class_id))
            .filter(class_sessions::Column::IsCancelled.eq(false))
            .filter(
                Expr::col(class_sessions::Column::BookedCount)
                    .lt(Expr::col(class_sessions::Column::Capacity)),
            )
            .exec(txn)
            .await?;

        if result.rows_affected == 1 {
            return Ok(());
        }

        // Cancelled between our read and the update, or simply full
        let class = class_sessions::Entity::find_by_id(class_id)
            .one(txn)
            .await?
            .ok_or(BookingError::ClassNotFound(class_id))?;
        if class.is_cancelled {
            Err(BookingError::ClassCancelled)
        } else {
            Err(BookingError::ClassFull)
        }
    }

    /// `booked_count - 1`, floored at zero
    async fn release_seat(
        &self,
        txn: &DatabaseTransaction,
        class_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<(), BookingError> {
        let result = class_sessions::Entity::update_many()
            .col_expr(
                class_sessions::Column::BookedCount,
                Expr::col(class_sessions::Column::BookedCount).sub(1),
            )
            .col_expr(class_sessions::Column::UpdatedAt, Expr::value(now))
            .filter(class_sessions::Column::Id.eq(class_id))
            .filter(class_sessions::Column::BookedCount.gt(0))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            warn!(class_id = %class_id, "Released a seat on a class with booked_count already 0");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // cancel_booking
    // ------------------------------------------------------------------

    /// Cancel a booking and reverse its seat and credit effects exactly once.
    /// Cancelling an already-cancelled booking returns it unchanged.
    #[instrument(skip(self))]
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        actor: Actor,
        options: CancelOptions,
    ) -> Result<CancelOutcome, BookingError> {
        let outcome = self
            .retry
            .run("cancel_booking", || {
                self.cancel_booking_once(booking_id, actor, options)
            })
            .await?;

        if outcome.changed {
            let booking = &outcome.booking;
            info!(
                booking_id = %booking.id,
                credit_refunded = booking.credit_refunded,
                payment_status = ?booking.payment_status,
                "Booking cancelled"
            );

            notifier::dispatch(
                self.notifier.clone(),
                StudioEvent::BookingCancelled {
                    booking_id: booking.id,
                    class_id: booking.class_id,
                    user_id: booking.user_id,
                    credit_refunded: booking.credit_refunded,
                },
            );
        }

        Ok(outcome)
    }

    async fn cancel_booking_once(
        &self,
        booking_id: Uuid,
        actor: Actor,
        options: CancelOptions,
    ) -> Result<CancelOutcome, BookingError> {
        let txn = self.db.begin().await?;

        match self
            .with_timeout(self.cancel_booking_in_txn(&txn, booking_id, actor, options))
            .await
        {
            Ok(outcome) => {
                txn.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("Rollback after failed cancel errored: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn cancel_booking_in_txn(
        &self,
        txn: &DatabaseTransaction,
        booking_id: Uuid,
        actor: Actor,
        options: CancelOptions,
    ) -> Result<CancelOutcome, BookingError> {
        let now = OffsetDateTime::now_utc();
        let booking = find_booking(txn, booking_id).await?;

        if !actor.may_act_for(booking.user_id) {
            return Err(BookingError::BookingNotFound(booking_id));
        }

        match booking.status {
            BookingStatus::Cancelled => {
                return Ok(CancelOutcome {
                    booking,
                    changed: false,
                })
            }
            BookingStatus::Booked => {}
            other => {
                return Err(BookingError::InvalidStateTransition(format!(
                    "Cannot cancel a booking that is {:?}",
                    other
                )))
            }
        }

        let class = class_sessions::Entity::find_by_id(booking.class_id)
            .one(txn)
            .await?
            .ok_or(BookingError::ClassNotFound(booking.class_id))?;

        let within_refund_window = now < class.starts_at - self.policy.refund_cutoff();
        let refund_credit = booking.kind == BookingKind::Package
            && booking.user_package_id.is_some()
            && (within_refund_window || (options.force_refund && actor.is_admin()));

        let payment_status = if booking.is_drop_in() && booking.has_confirmed_payment() {
            PaymentStatus::RefundPending
        } else {
            booking.payment_status
        };

        // booked -> cancelled is the once-only gate for the reversal below
        let result = bookings::Entity::update_many()
            .col_expr(
                bookings::Column::Status,
                Expr::value(BookingStatus::Cancelled),
            )
            .col_expr(bookings::Column::CancelledAt, Expr::value(Some(now)))
            .col_expr(bookings::Column::PaymentStatus, Expr::value(payment_status))
            .col_expr(bookings::Column::CreditRefunded, Expr::value(refund_credit))
            .col_expr(bookings::Column::UpdatedAt, Expr::value(now))
            .filter(bookings::Column::Id.eq(booking_id))
            .filter(bookings::Column::Status.eq(BookingStatus::Booked))
            .exec(txn)
            .await?;

        if result.rows_affected != 1 {
            let current = find_booking(txn, booking_id).await?;
            if current.status == BookingStatus::Cancelled {
                return Ok(CancelOutcome {
                    booking: current,
                    changed: false,
                });
            }
            return Err(BookingError::ConcurrencyConflict);
        }

        self.release_seat(txn, booking.class_id, now).await?;

        if let (true, Some(package_id)) = (refund_credit, booking.user_package_id) {
            CreditAccountService::credit(txn, package_id, 1).await?;
        }

        let cancelled = find_booking(txn, booking_id).await?;

        Ok(CancelOutcome {
            booking: cancelled,
            changed: true,
        })
    }

    // ------------------------------------------------------------------
    // attendance
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn mark_attended(
        &self,
        booking_id: Uuid,
        actor: Actor,
    ) -> Result<bookings::Model, BookingError> {
        self.transition_attendance(booking_id, actor, BookingStatus::Attended)
            .await
    }

    #[instrument(skip(self))]
    pub async fn mark_no_show(
        &self,
        booking_id: Uuid,
        actor: Actor,
    ) -> Result<bookings::Model, BookingError> {
        self.transition_attendance(booking_id, actor, BookingStatus::NoShow)
            .await
    }

    /// Pure status change; seats and credits stay as they are
    async fn transition_attendance(
        &self,
        booking_id: Uuid,
        actor: Actor,
        target: BookingStatus,
    ) -> Result<bookings::Model, BookingError> {
        actor.require_admin()?;
        let now = OffsetDateTime::now_utc();

        let txn = self.db.begin().await?;
        let result = match self
            .with_timeout(async {
                bookings::Entity::update_many()
                    .col_expr(bookings::Column::Status, Expr::value(target))
                    .col_expr(
                        bookings::Column::IsAttended,
                        Expr::value(target == BookingStatus::Attended),
                    )
                    .col_expr(bookings::Column::UpdatedAt, Expr::value(now))
                    .filter(bookings::Column::Id.eq(booking_id))
                    .filter(bookings::Column::Status.eq(BookingStatus::Booked))
                    .exec(&txn)
                    .await
                    .map_err(BookingError::from)
            })
            .await
        {
            Ok(result) => {
                txn.commit().await?;
                result
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("Rollback after failed attendance update errored: {}", rollback_err);
                }
                return Err(e);
            }
        };

        let booking = find_booking(&self.db, booking_id).await?;

        if result.rows_affected != 1 {
            return Err(BookingError::InvalidStateTransition(format!(
                "Cannot mark a {:?} booking as {:?}",
                booking.status, target
            )));
        }

        info!(booking_id = %booking_id, status = ?target, "Attendance recorded");
        Ok(booking)
    }

    // ------------------------------------------------------------------
    // reads
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn get_booking(
        &self,
        booking_id: Uuid,
        actor: Actor,
    ) -> Result<bookings::Model, BookingError> {
        let booking = find_booking(&self.db, booking_id).await?;
        if !actor.may_act_for(booking.user_id) {
            return Err(BookingError::BookingNotFound(booking_id));
        }
        Ok(booking)
    }

    #[instrument(skip(self))]
    pub async fn list_bookings_for_user(
        &self,
        user_id: Uuid,
        include_cancelled: bool,
    ) -> Result<Vec<bookings::Model>, BookingError> {
        let mut query = bookings::Entity::find().filter(bookings::Column::UserId.eq(user_id));
        if !include_cancelled {
            query = query.filter(bookings::Column::Status.ne(BookingStatus::Cancelled));
        }
        Ok(query
            .order_by_desc(bookings::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn list_bookings_for_class(
        &self,
        class_id: Uuid,
        actor: Actor,
    ) -> Result<Vec<bookings::Model>, BookingError> {
        actor.require_admin()?;
        Ok(bookings::Entity::find()
            .filter(bookings::Column::ClassId.eq(class_id))
            .order_by_asc(bookings::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Abort with `Timeout` if in-transaction work outlives the request
    /// budget. Callers roll back on any error and commit only on success.
    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, BookingError>
    where
        F: Future<Output = Result<T, BookingError>>,
    {
        match tokio::time::timeout(self.policy.request_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = self.policy.request_timeout_ms,
                    "Booking operation timed out"
                );
                Err(BookingError::Timeout)
            }
        }
    }
}

pub(crate) async fn find_booking<C>(conn: &C, booking_id: Uuid) -> Result<bookings::Model, BookingError>
where
    C: sea_orm::ConnectionTrait,
{
    bookings::Entity::find_by_id(booking_id)
        .one(conn)
        .await?
        .ok_or(BookingError::BookingNotFound(booking_id))
}

/// Slips are stored by the upload service; only absolute http(s) URLs are kept
pub(crate) fn validate_slip_url(slip_url: &str) -> Result<(), BookingError> {
    let parsed = url::Url::parse(slip_url.trim())
        .map_err(|e| BookingError::Validation(format!("Invalid slip URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(BookingError::Validation(format!(
            "Slip URL must be http(s), got {}",
            scheme
        ))),
    }
}
