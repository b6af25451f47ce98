//! Redis cache for public class listings
//!
//! Keys embed a version counter; invalidation bumps the counter so stale
//! entries are never read again and simply age out. Every Redis failure is
//! logged and treated as a miss.

use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const VERSION_KEY: &str = "studio:classes:version";

#[derive(Clone)]
pub struct ListingCache {
    redis: Option<Arc<Client>>,
    ttl_seconds: u64,
}

impl ListingCache {
    pub fn new(redis: Arc<Client>, ttl_seconds: u64) -> Self {
        Self {
            redis: Some(redis),
            ttl_seconds,
        }
    }

    /// Cache that always misses
    pub fn disabled() -> Self {
        Self {
            redis: None,
            ttl_seconds: 0,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let client = self.redis.as_ref()?;
        let result: redis::RedisResult<Option<String>> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let version: Option<u64> = conn.get(VERSION_KEY).await?;
            conn.get(versioned_key(version.unwrap_or(0), name)).await
        }
        .await;

        match result {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key = name, "Listing cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = name, "Discarding undecodable cache entry: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = name, "Listing cache read failed: {}", e);
                None
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, name: &str, value: &T) {
        let Some(client) = self.redis.as_ref() else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = name, "Could not encode listing for cache: {}", e);
                return;
            }
        };

        let result: redis::RedisResult<()> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let version: Option<u64> = conn.get(VERSION_KEY).await?;
            conn.set_ex(versioned_key(version.unwrap_or(0), name), raw, self.ttl_seconds)
                .await
        }
        .await;

        if let Err(e) = result {
            warn!(key = name, "Listing cache write failed: {}", e);
        }
    }

    /// Called after any write that changes seat counts or the timetable
    pub async fn invalidate_classes(&self) {
        let Some(client) = self.redis.as_ref() else {
            return;
        };
        let result: redis::RedisResult<u64> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            conn.incr(VERSION_KEY, 1u64).await
        }
        .await;

        match result {
            Ok(version) => debug!(version, "Class listing cache invalidated"),
            Err(e) => warn!("Listing cache invalidation failed: {}", e),
        }
    }
}

fn versioned_key(version: u64, name: &str) -> String {
    format!("studio:classes:v{}:{}", version, name)
}
