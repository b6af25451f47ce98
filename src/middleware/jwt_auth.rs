use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    models::{actor::Actor, common::Role},
    services::jwt_service::JWTService,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Request extension storing verified user identity from JWT
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub role: Role,
}

impl UserIdentity {
    /// The actor value handed to core operations
    pub fn actor(&self) -> Actor {
        match self.role {
            Role::Member => Actor::Member(self.user_id),
            Role::Admin => Actor::Admin(self.user_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// JWT authentication middleware
///
/// Extracts the Authorization header, validates the JWT access token,
/// and stores the verified user identity in request extensions.
///
/// Returns 401 Unauthorized if the header is missing or token validation fails.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let headers = request.headers();

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::InvalidToken(
            "Invalid Authorization format, expected 'Bearer <token>'".to_string(),
        )
    })?;

    let claims = state.jwt_service.validate_token(token)?;

    let identity = UserIdentity {
        user_id: JWTService::user_id_from_claims(&claims)?,
        role: JWTService::role_from_claims(&claims)?,
    };

    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

/// Rejects non-admin identities. Must run after `jwt_auth_middleware`.
pub async fn admin_only_middleware(request: Request, next: Next) -> Result<Response> {
    let identity = request.extensions().get::<UserIdentity>().ok_or_else(|| {
        ApiError::Unauthorized(
            "User identity not found - route must be protected by jwt_auth_middleware".to_string(),
        )
    })?;

    if !identity.is_admin() {
        tracing::warn!(user_id = %identity.user_id, uri = %request.uri(), "Admin route denied");
        return Err(ApiError::Forbidden(
            "Admin role required for this endpoint".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

/// Axum extractor for user identity
///
/// Only works on routes protected by jwt_auth_middleware.
impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserIdentity>()
            .cloned()
            .ok_or_else(|| {
                ApiError::Unauthorized(
                    "User identity not found - route must be protected by jwt_auth_middleware"
                        .to_string(),
                )
            })
    }
}
