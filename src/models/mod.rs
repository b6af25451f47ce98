// Request/Response models
pub mod actor;
pub mod booking_ext; // Extension methods for entity::bookings
pub mod bookings;
pub mod classes;
pub mod common;
pub mod packages;
pub mod payments;
pub mod user_package_ext; // Extension methods for entity::user_packages
