//! `SeaORM` entity prelude

pub use super::bookings::Entity as Bookings;
pub use super::class_sessions::Entity as ClassSessions;
pub use super::package_templates::Entity as PackageTemplates;
pub use super::payments::Entity as Payments;
pub use super::user_packages::Entity as UserPackages;
