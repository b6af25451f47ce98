/// Extension methods for bookings entity
use entity::{
    bookings,
    sea_orm_active_enums::{BookingKind, PaymentStatus},
};

pub trait BookingExt {
    /// Drop-in bookings settle through the verification workflow
    fn is_drop_in(&self) -> bool;

    /// Money was confirmed at least partially
    fn has_confirmed_payment(&self) -> bool;
}

impl BookingExt for bookings::Model {
    fn is_drop_in(&self) -> bool {
        self.kind == BookingKind::DropIn
    }

    fn has_confirmed_payment(&self) -> bool {
        matches!(
            self.payment_status,
            PaymentStatus::Paid | PaymentStatus::Partial
        )
    }
}
