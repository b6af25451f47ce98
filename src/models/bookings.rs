use entity::{
    bookings,
    sea_orm_active_enums::{BookingKind, BookingStatus, PaymentMethod, PaymentStatus},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{actor::Actor, common::SuccessResponse};

// ============================================================================
// Core request shapes
// ============================================================================

/// Who the seat is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attendee {
    Member(Uuid),
    Guest { name: String, contact: String },
}

impl Attendee {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Member(id) => Some(*id),
            Self::Guest { .. } => None,
        }
    }
}

/// Single entry point for member self-booking, admin manual booking and
/// walk-in guests
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub actor: Actor,
    pub attendee: Attendee,
    pub class_id: Uuid,
    pub kind: BookingKind,
    pub user_package_id: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
    pub slip_url: Option<String>,
}

impl BookingRequest {
    pub fn member_package(user_id: Uuid, class_id: Uuid, user_package_id: Uuid) -> Self {
        Self {
            actor: Actor::Member(user_id),
            attendee: Attendee::Member(user_id),
            class_id,
            kind: BookingKind::Package,
            user_package_id: Some(user_package_id),
            payment_method: None,
            slip_url: None,
        }
    }

    pub fn member_drop_in(user_id: Uuid, class_id: Uuid, method: Option<PaymentMethod>) -> Self {
        Self {
            actor: Actor::Member(user_id),
            attendee: Attendee::Member(user_id),
            class_id,
            kind: BookingKind::DropIn,
            user_package_id: None,
            payment_method: method,
            slip_url: None,
        }
    }

    pub fn walk_in_guest(
        admin_id: Uuid,
        class_id: Uuid,
        name: impl Into<String>,
        contact: impl Into<String>,
        method: Option<PaymentMethod>,
    ) -> Self {
        Self {
            actor: Actor::Admin(admin_id),
            attendee: Attendee::Guest {
                name: name.into(),
                contact: contact.into(),
            },
            class_id,
            kind: BookingKind::DropIn,
            user_package_id: None,
            payment_method: method,
            slip_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CancelOptions {
    /// Admin override of the refund cutoff
    pub force_refund: bool,
}

/// Result of a cancel call; `changed` is false for a repeated cancel
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub booking: bookings::Model,
    pub changed: bool,
}

// ============================================================================
// HTTP request bodies
// ============================================================================

/// POST /api/v1/bookings
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_booking_identity"))]
pub struct CreateBookingRequest {
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, max = 120))]
    pub guest_name: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub guest_contact: Option<String>,
    pub class_id: Uuid,
    pub kind: BookingKind,
    pub user_package_id: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
    #[validate(url)]
    pub slip_url: Option<String>,
}

fn validate_booking_identity(request: &CreateBookingRequest) -> Result<(), ValidationError> {
    if request.user_id.is_some() && request.guest_name.is_some() {
        return Err(ValidationError::new("user_id_and_guest_are_exclusive"));
    }
    if request.guest_name.is_some() != request.guest_contact.is_some() {
        return Err(ValidationError::new("guest_requires_name_and_contact"));
    }
    Ok(())
}

impl CreateBookingRequest {
    /// Resolve the attendee: explicit user, guest, or the caller themselves
    pub fn into_booking_request(self, actor: Actor) -> BookingRequest {
        let attendee = match (self.user_id, self.guest_name, self.guest_contact) {
            (Some(user_id), _, _) => Attendee::Member(user_id),
            (None, Some(name), Some(contact)) => Attendee::Guest { name, contact },
            _ => Attendee::Member(actor.id()),
        };

        BookingRequest {
            actor,
            attendee,
            class_id: self.class_id,
            kind: self.kind,
            user_package_id: self.user_package_id,
            payment_method: self.payment_method,
            slip_url: self.slip_url,
        }
    }
}

/// POST /api/v1/bookings/{id}/cancel
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub force_refund: bool,
}

/// GET /api/v1/bookings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingListQuery {
    #[serde(default)]
    pub include_cancelled: bool,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingData {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub guest_contact: Option<String>,
    pub class_id: Uuid,
    pub kind: BookingKind,
    pub status: BookingStatus,
    pub is_attended: bool,
    pub user_package_id: Option<Uuid>,
    pub payment_status: PaymentStatus,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub payment_method: Option<PaymentMethod>,
    pub payment_slip_url: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    pub credit_refunded: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<bookings::Model> for BookingData {
    fn from(model: bookings::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            guest_name: model.guest_name,
            guest_contact: model.guest_contact,
            class_id: model.class_id,
            kind: model.kind,
            status: model.status,
            is_attended: model.is_attended,
            user_package_id: model.user_package_id,
            payment_status: model.payment_status,
            amount_due: model.amount_due,
            amount_paid: model.amount_paid,
            payment_method: model.payment_method,
            payment_slip_url: model.payment_slip_url,
            paid_at: model.paid_at,
            cancelled_at: model.cancelled_at,
            credit_refunded: model.credit_refunded,
            created_at: model.created_at,
        }
    }
}

pub type BookingResponse = SuccessResponse<BookingData>;

pub type BookingListResponse = SuccessResponse<Vec<BookingData>>;
