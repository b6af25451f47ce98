// Middleware modules
pub mod jwt_auth;
pub mod logging;
pub mod rate_limit;

// Export JWT auth middleware components
pub use jwt_auth::{admin_only_middleware, jwt_auth_middleware, UserIdentity};

// Export rate limit middleware components
pub use rate_limit::rate_limit_middleware;

// Export logging middleware
pub use logging::logging_middleware;
