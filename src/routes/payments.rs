use axum::{
    extract::{Path, State},
    Json,
};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, AppJson, Result},
    middleware::UserIdentity,
    models::{
        bookings::{BookingData, BookingResponse},
        common::SuccessResponse,
        payments::{
            ApprovePaymentRequest, MarkCashPaidRequest, PaymentHistoryResponse,
            PaymentMethodRequest, PaymentRecordData, RejectPaymentRequest, SlipUploadRequest,
        },
    },
};

fn validation_error(e: validator::ValidationErrors) -> ApiError {
    ApiError::BadRequest(format!("Validation error: {}", e))
}

/// POST /api/v1/bookings/{id}/payment/slip
#[instrument(skip(state, identity, request))]
pub async fn upload_slip(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(booking_id): Path<Uuid>,
    AppJson(request): AppJson<SlipUploadRequest>,
) -> Result<Json<BookingResponse>> {
    request.validate().map_err(validation_error)?;

    let booking = state
        .payments
        .upload_slip(booking_id, identity.actor(), request)
        .await?;

    Ok(Json(SuccessResponse::new(BookingData::from(booking))))
}

/// POST /api/v1/bookings/{id}/payment/method
#[instrument(skip(state, identity, request))]
pub async fn set_payment_method(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(booking_id): Path<Uuid>,
    AppJson(request): AppJson<PaymentMethodRequest>,
) -> Result<Json<BookingResponse>> {
    let booking = state
        .payments
        .set_payment_method(booking_id, identity.actor(), request.payment_method)
        .await?;

    Ok(Json(SuccessResponse::new(BookingData::from(booking))))
}

/// POST /api/v1/bookings/{id}/payment/approve
#[instrument(skip(state, identity, request))]
pub async fn approve_payment(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(booking_id): Path<Uuid>,
    AppJson(request): AppJson<ApprovePaymentRequest>,
) -> Result<Json<BookingResponse>> {
    request.validate().map_err(validation_error)?;

    let booking = state
        .payments
        .approve(booking_id, identity.actor(), request)
        .await?;

    Ok(Json(SuccessResponse::new(BookingData::from(booking))))
}

/// POST /api/v1/bookings/{id}/payment/reject
#[instrument(skip(state, identity, request))]
pub async fn reject_payment(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(booking_id): Path<Uuid>,
    request: Option<Json<RejectPaymentRequest>>,
) -> Result<Json<BookingResponse>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate().map_err(validation_error)?;

    let booking = state
        .payments
        .reject(booking_id, identity.actor(), request.reason)
        .await?;

    Ok(Json(SuccessResponse::new(BookingData::from(booking))))
}

/// POST /api/v1/bookings/{id}/payment/mark-cash-paid
#[instrument(skip(state, identity, request))]
pub async fn mark_cash_paid(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(booking_id): Path<Uuid>,
    AppJson(request): AppJson<MarkCashPaidRequest>,
) -> Result<Json<BookingResponse>> {
    request.validate().map_err(validation_error)?;

    let booking = state
        .payments
        .mark_cash_paid(booking_id, identity.actor(), request)
        .await?;

    Ok(Json(SuccessResponse::new(BookingData::from(booking))))
}

/// GET /api/v1/bookings/{id}/payments
#[instrument(skip(state, identity))]
pub async fn payment_history(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<PaymentHistoryResponse>> {
    let records = state
        .payments
        .payment_history(booking_id, identity.actor())
        .await?;

    Ok(Json(SuccessResponse::new(
        records.into_iter().map(PaymentRecordData::from).collect(),
    )))
}
