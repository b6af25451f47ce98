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
        common::SuccessResponse,
        packages::{
            CreatePackageTemplateRequest, CreditBalance, CreditBalanceListResponse,
            CreditBalanceResponse, GrantPackageRequest, PackageTemplateData,
            PackageTemplateListResponse, PackageTemplateResponse,
        },
    },
};

/// GET /api/v1/packages
#[instrument(skip(state))]
pub async fn list_packages(
    State(state): State<AppState>,
) -> Result<Json<PackageTemplateListResponse>> {
    let templates = state.catalog.list_active_package_templates().await?;

    Ok(Json(SuccessResponse::new(
        templates.into_iter().map(PackageTemplateData::from).collect(),
    )))
}

/// GET /api/v1/me/packages
#[instrument(skip(state, identity))]
pub async fn list_my_packages(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<CreditBalanceListResponse>> {
    let balances = state.credit_accounts.list_for_user(identity.user_id).await?;

    Ok(Json(SuccessResponse::new(balances)))
}

/// GET /api/v1/me/packages/{id}
#[instrument(skip(state, identity))]
pub async fn get_package_balance(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(user_package_id): Path<Uuid>,
) -> Result<Json<CreditBalanceResponse>> {
    let balance = state
        .credit_accounts
        .balance(identity.actor(), user_package_id)
        .await?;

    Ok(Json(SuccessResponse::new(balance)))
}

/// POST /api/v1/admin/packages
#[instrument(skip(state, identity, request))]
pub async fn create_package_template(
    State(state): State<AppState>,
    identity: UserIdentity,
    AppJson(request): AppJson<CreatePackageTemplateRequest>,
) -> Result<Json<PackageTemplateResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let template = state
        .catalog
        .create_package_template(identity.actor(), request)
        .await?;

    Ok(Json(SuccessResponse::new(PackageTemplateData::from(template))))
}

/// POST /api/v1/admin/packages/{id}/deactivate
#[instrument(skip(state, identity))]
pub async fn deactivate_package_template(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(package_id): Path<Uuid>,
) -> Result<Json<PackageTemplateResponse>> {
    let template = state
        .catalog
        .deactivate_package_template(identity.actor(), package_id)
        .await?;

    Ok(Json(SuccessResponse::new(PackageTemplateData::from(template))))
}

/// POST /api/v1/admin/user-packages
#[instrument(skip(state, identity, request))]
pub async fn grant_package(
    State(state): State<AppState>,
    identity: UserIdentity,
    AppJson(request): AppJson<GrantPackageRequest>,
) -> Result<Json<CreditBalanceResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let account = state
        .credit_accounts
        .grant_package(identity.actor(), request)
        .await?;

    Ok(Json(SuccessResponse::new(CreditBalance::from_model(
        &account,
        time::OffsetDateTime::now_utc(),
    ))))
}
