use entity::{
    payments,
    sea_orm_active_enums::{PaymentLogStatus, PaymentMethod},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use super::common::SuccessResponse;

/// POST /api/v1/bookings/{id}/payment/slip
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SlipUploadRequest {
    #[validate(url, length(max = 2048))]
    pub slip_url: String,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

/// POST /api/v1/bookings/{id}/payment/method
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodRequest {
    pub payment_method: PaymentMethod,
}

/// POST /api/v1/bookings/{id}/payment/approve
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApprovePaymentRequest {
    #[validate(range(min = 1))]
    pub confirmed_amount: i64,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// POST /api/v1/bookings/{id}/payment/reject
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RejectPaymentRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// POST /api/v1/bookings/{id}/payment/mark-cash-paid
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkCashPaidRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    #[serde(default = "default_cash")]
    pub method: PaymentMethod,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

fn default_cash() -> PaymentMethod {
    PaymentMethod::Cash
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecordData {
    pub id: Uuid,
    pub booking_id: Option<Uuid>,
    pub user_package_id: Option<Uuid>,
    pub method: PaymentMethod,
    pub amount: i64,
    pub currency: String,
    pub log_status: PaymentLogStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub paid_at: OffsetDateTime,
    pub recorded_by: Uuid,
}

impl From<payments::Model> for PaymentRecordData {
    fn from(model: payments::Model) -> Self {
        Self {
            id: model.id,
            booking_id: model.booking_id,
            user_package_id: model.user_package_id,
            method: model.method,
            amount: model.amount,
            currency: model.currency,
            log_status: model.log_status,
            paid_at: model.paid_at,
            recorded_by: model.recorded_by,
        }
    }
}

pub type PaymentHistoryResponse = SuccessResponse<Vec<PaymentRecordData>>;
