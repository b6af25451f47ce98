/// Extension methods for user_packages entity
///
/// Business predicates over the generated model in
/// entity/src/user_packages.rs
use entity::{sea_orm_active_enums::UserPackageStatus, user_packages};
use time::OffsetDateTime;

pub trait UserPackageExt {
    /// Unlimited accounts carry no credit balance
    fn is_unlimited(&self) -> bool;

    /// Still marked active but past its expiry instant
    fn is_lapsed(&self, now: OffsetDateTime) -> bool;

    /// Could pay for `amount` bookings at `now`
    fn can_fund(&self, now: OffsetDateTime, amount: i32) -> bool;
}

impl UserPackageExt for user_packages::Model {
    fn is_unlimited(&self) -> bool {
        self.credits_remaining.is_none()
    }

    fn is_lapsed(&self, now: OffsetDateTime) -> bool {
        self.status == UserPackageStatus::Active && now > self.expire_at
    }

    fn can_fund(&self, now: OffsetDateTime, amount: i32) -> bool {
        if self.status != UserPackageStatus::Active || self.is_lapsed(now) {
            return false;
        }
        match self.credits_remaining {
            None => true,
            Some(remaining) => remaining >= amount,
        }
    }
}
