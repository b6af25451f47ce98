use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// Apply pending migrations at startup
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_expiration_minutes: u64,
}

/// Booking policy knobs. Cutoffs are measured back from class start.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    /// Booking closes this many minutes before class start (0 = until start)
    pub booking_cutoff_minutes: i64,
    /// Cancelling later than this returns no package credit
    pub refund_cutoff_minutes: i64,
    /// Attempts for serialization-conflicted transactions, first try included
    pub max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub currency: String,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            booking_cutoff_minutes: 0,
            refund_cutoff_minutes: 120,
            max_attempts: 3,
            retry_initial_delay_ms: 25,
            request_timeout_ms: 5_000,
            currency: "THB".to_string(),
        }
    }
}

impl BookingConfig {
    pub fn booking_cutoff(&self) -> time::Duration {
        time::Duration::minutes(self.booking_cutoff_minutes)
    }

    pub fn refund_cutoff(&self) -> time::Duration {
        time::Duration::minutes(self.refund_cutoff_minutes)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub listing_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listing_ttl_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub member_rpm: u32,
    pub admin_rpm: u32,
    pub window_seconds: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            member_rpm: 30,
            admin_rpm: 600,
            window_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    /// When unset, notifications are only logged
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_timeout_ms: Option<u64>,
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        // Build config from config.yml (required) with environment variable overrides
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(
                config::Environment::with_prefix("STUDIO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
