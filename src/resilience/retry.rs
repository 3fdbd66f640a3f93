//! Bounded retry with exponential backoff for backend calls.
//!
//! Every backend round trip of the Redis and SQL stores goes through
//! [`retry`] or [`retry_when`]. Attempts are always bounded: a resource
//! request has a caller waiting on it, so a backend that stays down surfaces
//! as an item or request error instead of a hang.
//!
//! ```
//! use resource_store::RetryConfig;
//!
//! // Connecting and creating schema: a few patient attempts
//! assert_eq!(RetryConfig::startup().max_attempts, 5);
//!
//! // Per-request calls: quick, then give up
//! assert_eq!(RetryConfig::query().max_attempts, 3);
//!
//! // Exactly one attempt
//! assert_eq!(RetryConfig::once().max_attempts, 1);
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryConfig {
    /// Opening connections and creating schema. Fails after roughly three
    /// seconds so a wrong connection string is reported promptly.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Reads, counter updates, deletes and event appends.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
            factor: 2.0,
        }
    }

    #[must_use]
    pub fn once() -> Self {
        Self { max_attempts: 1, ..Self::query() }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Run `operation` until it succeeds or `config.max_attempts` is reached.
pub async fn retry<F, Fut, T, E>(operation_name: &str, config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_when(operation_name, config, |_| true, operation).await
}

/// Like [`retry`], but errors for which `transient` is false are returned
/// immediately.
pub async fn retry_when<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    transient: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Backend call recovered");
                }
                return Ok(value);
            }
            Err(err) if attempt >= max_attempts || !transient(&err) => return Err(err),
            Err(err) => {
                let delay = config.delay_for(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Backend call failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}
