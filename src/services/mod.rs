// Service modules
pub mod booking_engine;
pub mod catalog_service;
pub mod credit_account;
pub mod jwt_service;
pub mod listing_cache;
pub mod notifier;
pub mod payment_workflow;
pub mod retry;

pub use booking_engine::BookingEngine;
pub use catalog_service::CatalogService;
pub use credit_account::CreditAccountService;
pub use listing_cache::ListingCache;
pub use payment_workflow::PaymentWorkflow;
