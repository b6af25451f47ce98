//! Bounded retry for serialization-conflicted ledger transactions

use crate::{config::BookingConfig, error::BookingError};
use rand::Rng;
use std::{future::Future, time::Duration};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: Duration::from_millis(500),
        }
    }

    pub fn from_config(config: &BookingConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_initial_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `min(initial * 2^attempt, max) * jitter(0.5..=1.0)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * 2f64.powi(attempt.min(16) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_secs_f64(capped * jitter)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Business-rule failures are never retried.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, BookingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BookingError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    attempt += 1;
                    warn!(
                        operation = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Ledger transaction conflicted, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}
