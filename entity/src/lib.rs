//! `SeaORM` entities for the studio ledger

pub mod prelude;

pub mod bookings;
pub mod class_sessions;
pub mod package_templates;
pub mod payments;
pub mod sea_orm_active_enums;
pub mod user_packages;
