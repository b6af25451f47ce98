use crate::{
    config::Config,
    services::{
        jwt_service::JWTService,
        notifier::{self, Notifier},
        retry::RetryPolicy,
        BookingEngine, CatalogService, CreditAccountService, ListingCache, PaymentWorkflow,
    },
};
use sea_orm::{ConnectOptions, DatabaseConnection};
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub redis: Arc<redis::Client>,
    pub jwt_service: Arc<JWTService>,
    pub booking_engine: Arc<BookingEngine>,
    pub credit_accounts: Arc<CreditAccountService>,
    pub payments: Arc<PaymentWorkflow>,
    pub catalog: Arc<CatalogService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let mut options = ConnectOptions::new(config.database.url.clone());
        options
            .max_connections(config.database.max_connections.unwrap_or(20))
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);
        let db = sea_orm::Database::connect(options).await?;

        let redis = Arc::new(redis::Client::open(config.redis.url.as_str())?);
        let notifier = notifier::from_config(&config.notifications)?;

        Ok(Self::from_parts(db, redis, notifier, config))
    }

    /// Wire services over existing connections
    pub fn from_parts(
        db: DatabaseConnection,
        redis: Arc<redis::Client>,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> Self {
        let cache = if config.cache.enabled {
            ListingCache::new(redis.clone(), config.cache.listing_ttl_seconds)
        } else {
            ListingCache::disabled()
        };

        let booking = &config.booking;
        let jwt_service = Arc::new(JWTService::new(Arc::new(config.auth.clone())));
        let booking_engine = Arc::new(BookingEngine::new(
            db.clone(),
            booking.clone(),
            notifier.clone(),
        ));
        let credit_accounts = Arc::new(CreditAccountService::new(
            db.clone(),
            booking.currency.clone(),
        ));
        let payments = Arc::new(PaymentWorkflow::new(
            db.clone(),
            booking.currency.clone(),
            RetryPolicy::from_config(booking),
            notifier,
        ));
        let catalog = Arc::new(CatalogService::new(db.clone(), cache));

        Self {
            db,
            redis,
            jwt_service,
            booking_engine,
            credit_accounts,
            payments,
            catalog,
            config: Arc::new(config),
        }
    }
}
