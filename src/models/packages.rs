use entity::{
    package_templates, user_packages,
    sea_orm_active_enums::{PackageType, PaymentMethod, UserPackageStatus},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::common::SuccessResponse;

/// POST /api/v1/admin/packages
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_package_credits"))]
pub struct CreatePackageTemplateRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub package_type: PackageType,
    #[validate(range(min = 1, max = 1000))]
    pub credits: Option<i32>,
    #[validate(range(min = 1, max = 3650))]
    pub duration_days: i32,
    #[validate(range(min = 0))]
    pub price: i64,
}

fn validate_package_credits(request: &CreatePackageTemplateRequest) -> Result<(), ValidationError> {
    match (request.package_type, request.credits) {
        (PackageType::Credits, None) => Err(ValidationError::new("credits_required")),
        (PackageType::Unlimited, Some(_)) => Err(ValidationError::new("unlimited_has_no_credits")),
        _ => Ok(()),
    }
}

/// POST /api/v1/admin/user-packages (purchase approval)
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GrantPackageRequest {
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub method: PaymentMethod,
    /// Defaults to the template price
    #[validate(range(min = 0))]
    pub amount_paid: Option<i64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
    #[validate(url)]
    pub evidence_url: Option<String>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageTemplateData {
    pub id: Uuid,
    pub name: String,
    pub package_type: PackageType,
    pub credits: Option<i32>,
    pub duration_days: i32,
    pub price: i64,
    pub is_active: bool,
}

impl From<package_templates::Model> for PackageTemplateData {
    fn from(model: package_templates::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            package_type: model.package_type,
            credits: model.credits,
            duration_days: model.duration_days,
            price: model.price,
            is_active: model.is_active,
        }
    }
}

/// Read model of a credit account
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub user_package_id: Uuid,
    pub package_id: Uuid,
    pub unlimited: bool,
    pub credits_remaining: Option<i32>,
    pub credits_total: Option<i32>,
    pub usage_count: i32,
    pub status: UserPackageStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
    /// Whether this account could pay for a booking right now
    pub can_fund_booking: bool,
}

impl CreditBalance {
    pub fn from_model(model: &user_packages::Model, now: OffsetDateTime) -> Self {
        use super::user_package_ext::UserPackageExt;

        Self {
            user_package_id: model.id,
            package_id: model.package_id,
            unlimited: model.is_unlimited(),
            credits_remaining: model.credits_remaining,
            credits_total: model.credits_total,
            usage_count: model.usage_count,
            status: if model.is_lapsed(now) {
                UserPackageStatus::Expired
            } else {
                model.status
            },
            expire_at: model.expire_at,
            can_fund_booking: model.can_fund(now, 1),
        }
    }
}

pub type PackageTemplateResponse = SuccessResponse<PackageTemplateData>;

pub type PackageTemplateListResponse = SuccessResponse<Vec<PackageTemplateData>>;

pub type CreditBalanceResponse = SuccessResponse<CreditBalance>;

pub type CreditBalanceListResponse = SuccessResponse<Vec<CreditBalance>>;
