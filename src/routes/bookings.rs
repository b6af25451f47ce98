use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
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
        bookings::{
            BookingData, BookingListQuery, BookingListResponse, BookingResponse,
            CancelBookingRequest, CancelOptions, CreateBookingRequest,
        },
        common::SuccessResponse,
    },
};

/// POST /api/v1/bookings
#[instrument(skip(state, request), fields(user_id = %identity.user_id))]
pub async fn create_booking(
    State(state): State<AppState>,
    identity: UserIdentity,
    AppJson(request): AppJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>)> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let booking = state
        .booking_engine
        .create_booking(request.into_booking_request(identity.actor()))
        .await?;

    state.catalog.cache().invalidate_classes().await;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::new(BookingData::from(booking))),
    ))
}

/// GET /api/v1/bookings
#[instrument(skip(state, identity))]
pub async fn list_my_bookings(
    State(state): State<AppState>,
    identity: UserIdentity,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<BookingListResponse>> {
    let bookings = state
        .booking_engine
        .list_bookings_for_user(identity.user_id, query.include_cancelled)
        .await?;

    Ok(Json(SuccessResponse::new(
        bookings.into_iter().map(BookingData::from).collect(),
    )))
}

/// GET /api/v1/bookings/{id}
#[instrument(skip(state, identity))]
pub async fn get_booking(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>> {
    let booking = state
        .booking_engine
        .get_booking(booking_id, identity.actor())
        .await?;

    Ok(Json(SuccessResponse::new(BookingData::from(booking))))
}

/// POST /api/v1/bookings/{id}/cancel
///
/// Body is optional (no Content-Type means no body); `forceRefund` is
/// honored for admins only.
#[instrument(skip(state, identity, request))]
pub async fn cancel_booking(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(booking_id): Path<Uuid>,
    request: Option<Json<CancelBookingRequest>>,
) -> Result<Json<BookingResponse>> {
    let options = CancelOptions {
        force_refund: request.map(|Json(r)| r.force_refund).unwrap_or(false),
    };

    let outcome = state
        .booking_engine
        .cancel_booking(booking_id, identity.actor(), options)
        .await?;

    if outcome.changed {
        state.catalog.cache().invalidate_classes().await;
    }

    Ok(Json(SuccessResponse::new(BookingData::from(outcome.booking))))
}

/// POST /api/v1/bookings/{id}/attended
#[instrument(skip(state, identity))]
pub async fn mark_attended(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>> {
    let booking = state
        .booking_engine
        .mark_attended(booking_id, identity.actor())
        .await?;

    Ok(Json(SuccessResponse::new(BookingData::from(booking))))
}

/// POST /api/v1/bookings/{id}/no-show
#[instrument(skip(state, identity))]
pub async fn mark_no_show(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>> {
    let booking = state
        .booking_engine
        .mark_no_show(booking_id, identity.actor())
        .await?;

    Ok(Json(SuccessResponse::new(BookingData::from(booking))))
}

/// GET /api/v1/admin/classes/{id}/bookings
#[instrument(skip(state, identity))]
pub async fn list_class_bookings(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(class_id): Path<Uuid>,
) -> Result<Json<BookingListResponse>> {
    let bookings = state
        .booking_engine
        .list_bookings_for_class(class_id, identity.actor())
        .await?;

    Ok(Json(SuccessResponse::new(
        bookings.into_iter().map(BookingData::from).collect(),
    )))
}
