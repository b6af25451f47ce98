use axum::{
    extract::{Path, Query, State},
    Json,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, AppJson, Result},
    middleware::UserIdentity,
    models::{
        classes::{
            ClassData, ClassListQuery, ClassListResponse, ClassResponse, CreateClassRequest,
            GenerateScheduleRequest, UpdateClassRequest,
        },
        common::SuccessResponse,
    },
};

/// GET /api/v1/classes
#[instrument(skip(state))]
pub async fn list_upcoming_classes(
    State(state): State<AppState>,
    Query(query): Query<ClassListQuery>,
) -> Result<Json<ClassListResponse>> {
    let classes = state
        .catalog
        .list_upcoming_classes(OffsetDateTime::now_utc(), query.limit)
        .await?;

    Ok(Json(SuccessResponse::new(classes)))
}

/// POST /api/v1/admin/classes
#[instrument(skip(state, identity, request))]
pub async fn create_class(
    State(state): State<AppState>,
    identity: UserIdentity,
    AppJson(request): AppJson<CreateClassRequest>,
) -> Result<Json<ClassResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let class = state
        .catalog
        .create_class(identity.actor(), request)
        .await?;

    Ok(Json(SuccessResponse::new(ClassData::from(class))))
}

/// PATCH /api/v1/admin/classes/{id}
#[instrument(skip(state, identity, request))]
pub async fn update_class(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(class_id): Path<Uuid>,
    AppJson(request): AppJson<UpdateClassRequest>,
) -> Result<Json<ClassResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let class = state
        .catalog
        .update_class(identity.actor(), class_id, request)
        .await?;

    Ok(Json(SuccessResponse::new(ClassData::from(class))))
}

/// POST /api/v1/admin/classes/{id}/cancel
#[instrument(skip(state, identity))]
pub async fn cancel_class(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(class_id): Path<Uuid>,
) -> Result<Json<ClassResponse>> {
    let class = state.catalog.cancel_class(identity.actor(), class_id).await?;

    Ok(Json(SuccessResponse::new(ClassData::from(class))))
}

/// POST /api/v1/admin/classes/generate
#[instrument(skip(state, identity, request))]
pub async fn generate_schedule(
    State(state): State<AppState>,
    identity: UserIdentity,
    AppJson(request): AppJson<GenerateScheduleRequest>,
) -> Result<Json<ClassListResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let classes = state
        .catalog
        .generate_schedule(identity.actor(), request)
        .await?;

    Ok(Json(SuccessResponse::new(
        classes.into_iter().map(ClassData::from).collect(),
    )))
}
