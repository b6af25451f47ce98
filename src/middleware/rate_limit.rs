//! Rate limiting middleware using Redis
//!
//! Sliding window counter per user. Admins get a higher ceiling than members.
//! If Redis is unreachable the request is let through.

use crate::{
    config::RateLimitSettings,
    error::{ApiError, Result},
    middleware::jwt_auth::UserIdentity,
    models::common::Role,
};
use axum::{extract::Request, middleware::Next, response::Response};
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Rate limiting middleware
///
/// Returns 429 Too Many Requests when the limit is exceeded.
pub fn rate_limit_middleware(
    redis_client: Arc<Client>,
    config: RateLimitSettings,
) -> impl Fn(
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response>> + Send>>
       + Clone {
    move |request: Request, next: Next| {
        let redis_client = redis_client.clone();
        let config = config.clone();

        Box::pin(async move {
            let identity = request.extensions().get::<UserIdentity>().ok_or_else(|| {
                ApiError::Internal(anyhow::anyhow!(
                    "Rate limit middleware requires jwt_auth_middleware"
                ))
            })?;

            let limit = limit_for(&config, identity.role);

            match check_rate_limit(
                &redis_client,
                &identity.user_id.to_string(),
                limit,
                config.window_seconds,
            )
            .await
            {
                Ok(true) => {
                    debug!(
                        "Rate limit check passed for user: {} (role: {:?})",
                        identity.user_id, identity.role
                    );
                }
                Ok(false) => {
                    warn!(
                        "Rate limit exceeded for user: {} (role: {:?})",
                        identity.user_id, identity.role
                    );
                    return Err(ApiError::RateLimitExceeded);
                }
                Err(e) => {
                    warn!("Rate limiter unavailable, allowing request: {}", e);
                }
            }

            Ok(next.run(request).await)
        })
    }
}

fn limit_for(config: &RateLimitSettings, role: Role) -> u32 {
    match role {
        Role::Member => config.member_rpm,
        Role::Admin => config.admin_rpm,
    }
}

/// Returns true if the request is allowed
async fn check_rate_limit(
    redis_client: &Client,
    user_id: &str,
    limit: u32,
    window_seconds: u32,
) -> redis::RedisResult<bool> {
    let mut conn = redis_client.get_multiplexed_async_connection().await?;

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let key = format!("rate_limit:user:{}", user_id);
    let window_start = now - i64::from(window_seconds);

    // Sorted set scored by request timestamp
    let _: () = conn.zrembyscore(&key, 0, window_start as f64).await?;

    let count: u32 = conn.zcard(&key).await?;
    if count >= limit {
        return Ok(false);
    }

    let member = format!("{}:{}", now, uuid::Uuid::new_v4());
    let _: () = conn.zadd(&key, member, now as f64).await?;
    let _: () = conn.expire(&key, i64::from(window_seconds) + 10).await?;

    Ok(true)
}
