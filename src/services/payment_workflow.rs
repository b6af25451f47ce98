//! Drop-in payment verification: slip upload, admin approve/reject, cash
//!
//! Transitions are computed by [`next_payment_status`] and written with a
//! compare-and-set UPDATE guarded on the status and `amount_paid` that were
//! read. A lost race surfaces as `ConcurrencyConflict` and is retried.

use crate::{
    error::BookingError,
    models::{
        actor::Actor,
        payments::{ApprovePaymentRequest, MarkCashPaidRequest, SlipUploadRequest},
    },
    services::{
        booking_engine::{find_booking, validate_slip_url},
        notifier::{self, Notifier, StudioEvent},
        retry::RetryPolicy,
    },
};
use entity::{
    bookings, payments,
    sea_orm_active_enums::{
        BookingKind, BookingStatus, PaymentLogStatus, PaymentMethod, PaymentStatus,
    },
};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, ConnectionTrait, DatabaseConnection, TransactionTrait,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Payment-relevant view of a booking
#[derive(Debug, Clone, Copy)]
pub struct PaymentSnapshot {
    pub status: PaymentStatus,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub cancelled: bool,
}

impl From<&bookings::Model> for PaymentSnapshot {
    fn from(booking: &bookings::Model) -> Self {
        Self {
            status: booking.payment_status,
            amount_due: booking.amount_due,
            amount_paid: booking.amount_paid,
            cancelled: booking.status == BookingStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentAction {
    SubmitSlip,
    Approve { amount: i64 },
    Reject,
    MarkPaid { amount: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTransition {
    pub status: PaymentStatus,
    pub amount_paid: i64,
}

/// Drop-in payment state machine
pub fn next_payment_status(
    current: PaymentSnapshot,
    action: PaymentAction,
) -> Result<PaymentTransition, BookingError> {
    use PaymentStatus::*;

    let invalid = || {
        BookingError::InvalidStateTransition(format!(
            "Cannot apply {:?} to a payment that is {:?}",
            action, current.status
        ))
    };

    match action {
        PaymentAction::SubmitSlip => {
            if current.cancelled {
                return Err(invalid());
            }
            match current.status {
                Unpaid | Partial | PendingVerification => Ok(PaymentTransition {
                    status: PendingVerification,
                    amount_paid: current.amount_paid,
                }),
                Paid | RefundPending => Err(invalid()),
            }
        }
        PaymentAction::Approve { amount } => {
            if current.status != PendingVerification {
                return Err(invalid());
            }
            if amount < 1 {
                return Err(BookingError::Validation(
                    "Confirmed amount must be positive".to_string(),
                ));
            }
            let amount_paid = current
                .amount_paid
                .checked_add(amount)
                .ok_or_else(|| BookingError::Validation("Confirmed amount too large".to_string()))?;
            let status = if current.cancelled {
                RefundPending
            } else if amount_paid >= current.amount_due {
                Paid
            } else {
                Partial
            };
            Ok(PaymentTransition {
                status,
                amount_paid,
            })
        }
        PaymentAction::Reject => {
            if current.status != PendingVerification {
                return Err(invalid());
            }
            let status = match (current.amount_paid > 0, current.cancelled) {
                (false, _) => Unpaid,
                (true, false) => Partial,
                (true, true) => RefundPending,
            };
            Ok(PaymentTransition {
                status,
                amount_paid: current.amount_paid,
            })
        }
        PaymentAction::MarkPaid { amount } => {
            if current.cancelled || !matches!(current.status, Unpaid | Partial) {
                return Err(invalid());
            }
            let outstanding = (current.amount_due - current.amount_paid).max(0);
            if amount < outstanding {
                return Err(BookingError::Validation(format!(
                    "Cash amount {} is below the outstanding {}",
                    amount, outstanding
                )));
            }
            Ok(PaymentTransition {
                status: Paid,
                amount_paid: current.amount_paid + amount,
            })
        }
    }
}

pub struct PaymentWorkflow {
    db: DatabaseConnection,
    currency: String,
    retry: RetryPolicy,
    notifier: Arc<dyn Notifier>,
}

impl PaymentWorkflow {
    pub fn new(
        db: DatabaseConnection,
        currency: impl Into<String>,
        retry: RetryPolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            currency: currency.into(),
            retry,
            notifier,
        }
    }

    /// Member attaches transfer evidence; the booking waits for an admin
    #[instrument(skip(self, request))]
    pub async fn upload_slip(
        &self,
        booking_id: Uuid,
        actor: Actor,
        request: SlipUploadRequest,
    ) -> Result<bookings::Model, BookingError> {
        validate_slip_url(&request.slip_url)?;

        let booking = self
            .retry
            .run("upload_slip", || {
                self.upload_slip_once(booking_id, actor, &request)
            })
            .await?;

        info!(booking_id = %booking_id, "Payment slip uploaded");
        notifier::dispatch(
            self.notifier.clone(),
            StudioEvent::SlipUploaded {
                booking_id,
                user_id: booking.user_id,
            },
        );

        Ok(booking)
    }

    async fn upload_slip_once(
        &self,
        booking_id: Uuid,
        actor: Actor,
        request: &SlipUploadRequest,
    ) -> Result<bookings::Model, BookingError> {
        let booking = self.load_drop_in(&self.db, booking_id, actor).await?;
        let next = next_payment_status(PaymentSnapshot::from(&booking), PaymentAction::SubmitSlip)?;

        let mut update = bookings::Entity::update_many()
            .col_expr(bookings::Column::PaymentStatus, Expr::value(next.status))
            .col_expr(
                bookings::Column::PaymentSlipUrl,
                Expr::value(Some(request.slip_url.trim().to_string())),
            )
            .col_expr(
                bookings::Column::PaymentNote,
                Expr::value(request.note.clone()),
            )
            .col_expr(
                bookings::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            );
        if let Some(method) = request.payment_method {
            update = update.col_expr(bookings::Column::PaymentMethod, Expr::value(Some(method)));
        }

        compare_and_set(&self.db, update, &booking).await?;
        find_booking(&self.db, booking_id).await
    }

    /// Record how the member intends to pay; no money moves
    #[instrument(skip(self))]
    pub async fn set_payment_method(
        &self,
        booking_id: Uuid,
        actor: Actor,
        method: PaymentMethod,
    ) -> Result<bookings::Model, BookingError> {
        let booking = self.load_drop_in(&self.db, booking_id, actor).await?;
        if booking.status == BookingStatus::Cancelled
            || matches!(
                booking.payment_status,
                PaymentStatus::Paid | PaymentStatus::RefundPending
            )
        {
            return Err(BookingError::InvalidStateTransition(
                "Payment method is fixed once the booking is settled".to_string(),
            ));
        }

        bookings::Entity::update_many()
            .col_expr(bookings::Column::PaymentMethod, Expr::value(Some(method)))
            .col_expr(
                bookings::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(bookings::Column::Id.eq(booking_id))
            .exec(&self.db)
            .await?;

        find_booking(&self.db, booking_id).await
    }

    /// Admin confirms `confirmed_amount` from the uploaded slip
    #[instrument(skip(self, request))]
    pub async fn approve(
        &self,
        booking_id: Uuid,
        actor: Actor,
        request: ApprovePaymentRequest,
    ) -> Result<bookings::Model, BookingError> {
        let admin_id = actor.require_admin()?;

        let booking = self
            .retry
            .run("approve_payment", || {
                self.approve_once(booking_id, actor, admin_id, &request)
            })
            .await?;

        info!(
            booking_id = %booking_id,
            amount = request.confirmed_amount,
            payment_status = ?booking.payment_status,
            "Payment approved"
        );
        if booking.payment_status == PaymentStatus::RefundPending {
            warn!(booking_id = %booking_id, "Approved payment on a cancelled booking needs a refund");
        }

        notifier::dispatch(
            self.notifier.clone(),
            StudioEvent::PaymentApproved {
                booking_id,
                user_id: booking.user_id,
                payment_status: booking.payment_status,
                amount_paid: booking.amount_paid,
            },
        );

        Ok(booking)
    }

    async fn approve_once(
        &self,
        booking_id: Uuid,
        actor: Actor,
        admin_id: Uuid,
        request: &ApprovePaymentRequest,
    ) -> Result<bookings::Model, BookingError> {
        let txn = self.db.begin().await?;
        let booking = self.load_drop_in(&txn, booking_id, actor).await?;
        let next = next_payment_status(
            PaymentSnapshot::from(&booking),
            PaymentAction::Approve {
                amount: request.confirmed_amount,
            },
        )?;
        let now = OffsetDateTime::now_utc();

        let mut update = bookings::Entity::update_many()
            .col_expr(bookings::Column::PaymentStatus, Expr::value(next.status))
            .col_expr(bookings::Column::AmountPaid, Expr::value(next.amount_paid))
            .col_expr(bookings::Column::UpdatedAt, Expr::value(now));
        if next.status == PaymentStatus::Paid {
            update = update.col_expr(bookings::Column::PaidAt, Expr::value(Some(now)));
        }
        if request.note.is_some() {
            update = update.col_expr(
                bookings::Column::PaymentNote,
                Expr::value(request.note.clone()),
            );
        }
        compare_and_set(&txn, update, &booking).await?;

        self.record_payment(
            &txn,
            &booking,
            PaymentEntry {
                method: booking.payment_method.unwrap_or(PaymentMethod::BankTransfer),
                amount: request.confirmed_amount,
                recorded_by: admin_id,
                evidence_url: booking.payment_slip_url.clone(),
                note: request.note.clone(),
            },
        )
        .await?;

        let updated = find_booking(&txn, booking_id).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Admin rejects the slip; the member may upload a new one
    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        booking_id: Uuid,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<bookings::Model, BookingError> {
        actor.require_admin()?;

        let booking = self
            .retry
            .run("reject_payment", || {
                self.reject_once(booking_id, actor, reason.as_deref())
            })
            .await?;

        info!(booking_id = %booking_id, "Payment slip rejected");
        notifier::dispatch(
            self.notifier.clone(),
            StudioEvent::PaymentRejected {
                booking_id,
                user_id: booking.user_id,
                reason,
            },
        );

        Ok(booking)
    }

    async fn reject_once(
        &self,
        booking_id: Uuid,
        actor: Actor,
        reason: Option<&str>,
    ) -> Result<bookings::Model, BookingError> {
        let booking = self.load_drop_in(&self.db, booking_id, actor).await?;
        let next = next_payment_status(PaymentSnapshot::from(&booking), PaymentAction::Reject)?;

        let update = bookings::Entity::update_many()
            .col_expr(bookings::Column::PaymentStatus, Expr::value(next.status))
            .col_expr(
                bookings::Column::PaymentSlipUrl,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                bookings::Column::PaymentNote,
                Expr::value(reason.map(str::to_string)),
            )
            .col_expr(
                bookings::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            );
        compare_and_set(&self.db, update, &booking).await?;
        find_booking(&self.db, booking_id).await
    }

    /// Admin records money taken at the desk
    #[instrument(skip(self, request))]
    pub async fn mark_cash_paid(
        &self,
        booking_id: Uuid,
        actor: Actor,
        request: MarkCashPaidRequest,
    ) -> Result<bookings::Model, BookingError> {
        let admin_id = actor.require_admin()?;

        let booking = self
            .retry
            .run("mark_cash_paid", || {
                self.mark_cash_paid_once(booking_id, actor, admin_id, &request)
            })
            .await?;

        info!(
            booking_id = %booking_id,
            amount = request.amount,
            method = ?request.method,
            "Cash payment recorded"
        );

        notifier::dispatch(
            self.notifier.clone(),
            StudioEvent::PaymentApproved {
                booking_id,
                user_id: booking.user_id,
                payment_status: booking.payment_status,
                amount_paid: booking.amount_paid,
            },
        );

        Ok(booking)
    }

    async fn mark_cash_paid_once(
        &self,
        booking_id: Uuid,
        actor: Actor,
        admin_id: Uuid,
        request: &MarkCashPaidRequest,
    ) -> Result<bookings::Model, BookingError> {
        let txn = self.db.begin().await?;
        let booking = self.load_drop_in(&txn, booking_id, actor).await?;
        let next = next_payment_status(
            PaymentSnapshot::from(&booking),
            PaymentAction::MarkPaid {
                amount: request.amount,
            },
        )?;
        let now = OffsetDateTime::now_utc();

        let update = bookings::Entity::update_many()
            .col_expr(bookings::Column::PaymentStatus, Expr::value(next.status))
            .col_expr(bookings::Column::AmountPaid, Expr::value(next.amount_paid))
            .col_expr(
                bookings::Column::PaymentMethod,
                Expr::value(Some(request.method)),
            )
            .col_expr(bookings::Column::PaidAt, Expr::value(Some(now)))
            .col_expr(bookings::Column::UpdatedAt, Expr::value(now));
        compare_and_set(&txn, update, &booking).await?;

        self.record_payment(
            &txn,
            &booking,
            PaymentEntry {
                method: request.method,
                amount: request.amount,
                recorded_by: admin_id,
                evidence_url: None,
                note: request.note.clone(),
            },
        )
        .await?;

        let updated = find_booking(&txn, booking_id).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Audit rows for one booking, oldest first
    #[instrument(skip(self))]
    pub async fn payment_history(
        &self,
        booking_id: Uuid,
        actor: Actor,
    ) -> Result<Vec<payments::Model>, BookingError> {
        let booking = find_booking(&self.db, booking_id).await?;
        if !actor.may_act_for(booking.user_id) {
            return Err(BookingError::BookingNotFound(booking_id));
        }

        Ok(payments::Entity::find()
            .filter(payments::Column::BookingId.eq(booking_id))
            .order_by_asc(payments::Column::PaidAt)
            .all(&self.db)
            .await?)
    }

    async fn load_drop_in<C>(
        &self,
        conn: &C,
        booking_id: Uuid,
        actor: Actor,
    ) -> Result<bookings::Model, BookingError>
    where
        C: ConnectionTrait,
    {
        let booking = find_booking(conn, booking_id).await?;
        if !actor.may_act_for(booking.user_id) {
            return Err(BookingError::BookingNotFound(booking_id));
        }
        if booking.kind == BookingKind::Package {
            return Err(BookingError::InvalidStateTransition(
                "Package bookings are paid by credit".to_string(),
            ));
        }
        Ok(booking)
    }

    async fn record_payment<C>(
        &self,
        conn: &C,
        booking: &bookings::Model,
        entry: PaymentEntry,
    ) -> Result<payments::Model, BookingError>
    where
        C: ConnectionTrait,
    {
        Ok(payments::ActiveModel {
            id: Set(Uuid::new_v4()),
            booking_id: Set(Some(booking.id)),
            user_package_id: Set(None),
            user_id: Set(booking.user_id),
            method: Set(entry.method),
            amount: Set(entry.amount),
            currency: Set(self.currency.clone()),
            log_status: Set(PaymentLogStatus::Verified),
            paid_at: Set(OffsetDateTime::now_utc()),
            evidence_url: Set(entry.evidence_url),
            note: Set(entry.note),
            recorded_by: Set(entry.recorded_by),
        }
        .insert(conn)
        .await?)
    }
}

struct PaymentEntry {
    method: PaymentMethod,
    amount: i64,
    recorded_by: Uuid,
    evidence_url: Option<String>,
    note: Option<String>,
}

/// Apply `update` only if the booking still has the payment state we read
async fn compare_and_set<C>(
    conn: &C,
    update: sea_orm::UpdateMany<bookings::Entity>,
    seen: &bookings::Model,
) -> Result<(), BookingError>
where
    C: ConnectionTrait,
{
    let result = update
        .filter(bookings::Column::Id.eq(seen.id))
        .filter(bookings::Column::PaymentStatus.eq(seen.payment_status))
        .filter(bookings::Column::AmountPaid.eq(seen.amount_paid))
        .filter(bookings::Column::Status.eq(seen.status))
        .exec(conn)
        .await?;

    if result.rows_affected != 1 {
        return Err(BookingError::ConcurrencyConflict);
    }
    Ok(())
}
