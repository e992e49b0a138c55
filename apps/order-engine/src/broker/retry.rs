//! Bounded retry with exponential backoff for broker and market data calls.
//!
//! # Retryable Errors
//!
//! | Retryable | Non-Retryable |
//! |-----------|---------------|
//! | HTTP 429 (Rate Limited) | HTTP 400 (Bad Request) |
//! | HTTP 408 / 5xx | HTTP 401/403 (Auth Errors) |
//! | Network timeouts | HTTP 422 (Validation Error) |
//! | Connection reset | Order rejected by exchange |
//!
//! Order submission is never retried here: a lost acknowledgement would
//! otherwise become a duplicate order.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::application::ports::{BrokerError, MarketDataError};

/// Retry policy for reads and cancels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 3).
    pub max_attempts: u32,
    /// First backoff in milliseconds (default: 100).
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds (default: 2000).
    pub max_backoff_ms: u64,
    /// Growth per attempt (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the backoff (default: 0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// First backoff.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Backoff ceiling.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Calculator for exponential backoff with jitter.
#[derive(Debug)]
pub struct ExponentialBackoffCalculator {
    current_attempt: u32,
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoffCalculator {
    /// Create a calculator from a retry policy.
    #[must_use]
    pub const fn new(policy: &RetryPolicy) -> Self {
        Self {
            current_attempt: 0,
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff_ms,
            max_backoff_ms: policy.max_backoff_ms,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Next backoff with jitter, `None` once attempts are exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let base_backoff_ms = self.calculate_base_backoff_ms();
        let jittered_ms = self.apply_jitter(base_backoff_ms);
        let capped_ms = jittered_ms.min(self.max_backoff_ms);

        self.current_attempt += 1;

        Some(Duration::from_millis(capped_ms))
    }

    fn calculate_base_backoff_ms(&self) -> u64 {
        let multiplier = self.backoff_multiplier.powi(self.current_attempt as i32);
        let backoff = (self.initial_backoff_ms as f64 * multiplier) as u64;
        backoff.min(self.max_backoff_ms)
    }

    /// Uniform in `[backoff × (1 - jitter), backoff × (1 + jitter)]`.
    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 {
            return backoff_ms;
        }
        let mut rng = rand::rng();
        let jitter_range = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - jitter_range).max(0.0);
        let max = backoff_ms as f64 + jitter_range;
        rng.random_range(min..=max) as u64
    }

    /// Attempts consumed so far.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Skip one attempt without computing a delay (used when the server
    /// dictated the delay).
    pub const fn consume_attempt(&mut self) -> bool {
        if self.current_attempt >= self.max_attempts {
            return false;
        }
        self.current_attempt += 1;
        true
    }
}

/// HTTP status codes that are retryable besides 5xx.
const RETRYABLE_STATUS_CODES: &[u16] = &[
    408, // Request Timeout
    429, // Too Many Requests
];

/// Check if an HTTP status code is retryable.
#[must_use]
pub fn is_retryable_status(status_code: u16) -> bool {
    (500..600).contains(&status_code) || RETRYABLE_STATUS_CODES.contains(&status_code)
}

/// Extract Retry-After duration from HTTP headers.
pub struct RetryAfterExtractor;

impl RetryAfterExtractor {
    /// Parse a Retry-After value in seconds.
    #[must_use]
    pub fn parse(value: &str) -> Option<Duration> {
        value.trim().parse::<u64>().ok().map(Duration::from_secs)
    }

    /// Retry delay, preferring Retry-After when present and parseable.
    #[must_use]
    pub fn get_delay(
        retry_after: Option<&str>,
        backoff: &mut ExponentialBackoffCalculator,
    ) -> Option<Duration> {
        if let Some(duration) = retry_after.and_then(Self::parse) {
            return backoff.consume_attempt().then_some(duration);
        }
        backoff.next_backoff()
    }
}

/// Errors that can say whether a retry might succeed.
pub trait TransientError {
    /// True when the same call may succeed later.
    fn is_transient(&self) -> bool;
}

impl TransientError for BrokerError {
    fn is_transient(&self) -> bool {
        Self::is_transient(self)
    }
}

impl TransientError for MarketDataError {
    fn is_transient(&self) -> bool {
        Self::is_transient(self)
    }
}

/// Run `call`, retrying transient errors with backoff.
///
/// Permanent errors and the last transient error are returned as-is.
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, E>
where
    E: TransientError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = ExponentialBackoffCalculator::new(policy);
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() => match backoff.next_backoff() {
                Some(delay) => {
                    tracing::debug!(
                        operation,
                        attempt = backoff.current_attempt(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::warn!(operation, error = %error, "Retries exhausted");
                    return Err(error);
                }
            },
            Err(error) => return Err(error),
        }
    }
}
