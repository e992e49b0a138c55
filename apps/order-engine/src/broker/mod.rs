//! Broker call resilience.
//!
//! Retry policies and backoff used around broker and market data calls.

mod retry;

pub use retry::{
    ExponentialBackoffCalculator, RetryAfterExtractor, RetryPolicy, TransientError,
    is_retryable_status, retry_transient,
};
