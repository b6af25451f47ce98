// Route modules
pub mod bookings;
pub mod classes;
pub mod packages;
pub mod payments;

use crate::{
    app_state::AppState,
    middleware::{
        admin_only_middleware, jwt_auth_middleware, logging_middleware, rate_limit_middleware,
    },
};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes(state.clone()))
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes(state: AppState) -> Router<AppState> {
    // Member writes: authentication plus rate limiting
    let rate_limiter =
        rate_limit_middleware(state.redis.clone(), state.config.rate_limit.clone());
    let member_write_routes = Router::new()
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/{id}/cancel", post(bookings::cancel_booking))
        .route("/bookings/{id}/payment/slip", post(payments::upload_slip))
        .route(
            "/bookings/{id}/payment/method",
            post(payments::set_payment_method),
        )
        .route_layer(middleware::from_fn(rate_limiter))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Member reads (no rate limiting, require JWT)
    let member_read_routes = Router::new()
        .route("/bookings", get(bookings::list_my_bookings))
        .route("/bookings/{id}", get(bookings::get_booking))
        .route("/bookings/{id}/payments", get(payments::payment_history))
        .route("/me/packages", get(packages::list_my_packages))
        .route("/me/packages/{id}", get(packages::get_package_balance))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Admin routes: JWT with role=admin
    let admin_routes = Router::new()
        .route(
            "/bookings/{id}/payment/approve",
            post(payments::approve_payment),
        )
        .route(
            "/bookings/{id}/payment/reject",
            post(payments::reject_payment),
        )
        .route(
            "/bookings/{id}/payment/mark-cash-paid",
            post(payments::mark_cash_paid),
        )
        .route("/bookings/{id}/attended", post(bookings::mark_attended))
        .route("/bookings/{id}/no-show", post(bookings::mark_no_show))
        .route(
            "/admin/classes/{id}/bookings",
            get(bookings::list_class_bookings),
        )
        .route("/admin/classes", post(classes::create_class))
        .route("/admin/classes/{id}", patch(classes::update_class))
        .route("/admin/classes/{id}/cancel", post(classes::cancel_class))
        .route("/admin/classes/generate", post(classes::generate_schedule))
        .route("/admin/packages", post(packages::create_package_template))
        .route(
            "/admin/packages/{id}/deactivate",
            post(packages::deactivate_package_template),
        )
        .route("/admin/user-packages", post(packages::grant_package))
        .route_layer(middleware::from_fn(admin_only_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/classes", get(classes::list_upcoming_classes))
        .route("/packages", get(packages::list_packages))
        .route("/health", get(health));

    // Combine all routes with request/response body logging
    Router::new()
        .merge(member_write_routes)
        .merge(member_read_routes)
        .merge(admin_routes)
        .merge(public_routes)
        .layer(middleware::from_fn(logging_middleware))
}

async fn health() -> &'static str {
    "ok"
}
