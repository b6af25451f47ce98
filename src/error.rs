use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde_json::json;
use uuid::Uuid;

/// Failures of the booking core. Every variant except `Database` is a
/// business outcome the caller can act on.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Class {0} not found")]
    ClassNotFound(Uuid),

    #[error("Class is full")]
    ClassFull,

    #[error("Class has been cancelled")]
    ClassCancelled,

    #[error("You already have a booking for this class")]
    AlreadyBooked,

    #[error("Package {0} not found")]
    PackageNotFound(Uuid),

    #[error("Package is not active")]
    PackageNotActive,

    #[error("Package has expired")]
    PackageExpired,

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Booking {0} not found")]
    BookingNotFound(Uuid),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Concurrent update conflict, please retry")]
    ConcurrencyConflict,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Database error: {0}")]
    Database(DbErr),
}

impl BookingError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClassNotFound(_) => "CLASS_NOT_FOUND",
            Self::ClassFull => "CLASS_FULL",
            Self::ClassCancelled => "CLASS_CANCELLED",
            Self::AlreadyBooked => "ALREADY_BOOKED",
            Self::PackageNotFound(_) => "PACKAGE_NOT_FOUND",
            Self::PackageNotActive => "PACKAGE_NOT_ACTIVE",
            Self::PackageExpired => "PACKAGE_EXPIRED",
            Self::InsufficientCredits => "INSUFFICIENT_CREDITS",
            Self::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            Self::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Timeout => "TIMEOUT",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Only serialization failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ClassNotFound(_) | Self::PackageNotFound(_) | Self::BookingNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::ClassFull | Self::AlreadyBooked | Self::InvalidStateTransition(_) => {
                StatusCode::CONFLICT
            }
            Self::ClassCancelled
            | Self::PackageNotActive
            | Self::PackageExpired
            | Self::InsufficientCredits => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::ConcurrencyConflict | Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbErr> for BookingError {
    fn from(err: DbErr) -> Self {
        if is_serialization_failure(&err) {
            Self::ConcurrencyConflict
        } else {
            Self::Database(err)
        }
    }
}

/// Postgres 40001/40P01 and SQLite lock contention
pub fn is_serialization_failure(err: &DbErr) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("40001")
        || msg.contains("40p01")
        || msg.contains("could not serialize access")
        || msg.contains("deadlock detected")
        || msg.contains("database is locked")
        || msg.contains("database table is locked")
}

/// Unique-constraint failure as reported by the driver (Postgres 23505,
/// SQLite 2067)
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    ExpiredToken,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Booking(ref e) => match e {
                BookingError::Database(db) => {
                    tracing::error!("Database error in booking core: {:?}", db);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        e.kind(),
                        "An internal database error occurred".to_string(),
                    )
                }
                _ => (e.status_code(), e.kind(), e.to_string()),
            },
            ApiError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            ApiError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::NotFound(ref msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Unauthorized(ref msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            ApiError::InvalidToken(ref msg) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", msg.clone())
            }
            ApiError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                "Access token has expired".to_string(),
            ),
            ApiError::Forbidden(ref msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Too many requests, please try again later".to_string(),
            ),
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

/// JSON extractor whose rejections use the API error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
