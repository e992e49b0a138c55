//! Alpaca-specific error types.

use thiserror::Error;

use crate::application::ports::{BrokerError, MarketDataError};

/// Errors from the Alpaca adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlpacaError {
    /// Adapter misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// API returned an error.
    #[error("API error: {status} {code} - {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Error code from the API.
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Order was rejected.
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Not enough buying power.
    #[error("Insufficient buying power: {0}")]
    InsufficientFunds(String),

    /// Authentication failed.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Rate limited.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: u64,
    },

    /// Resource not found.
    #[error("Not found: {path}")]
    NotFound {
        /// Request path.
        path: String,
    },

    /// Response body did not match the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Max retries exceeded.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Last failure seen.
        last_error: String,
    },
}

impl From<AlpacaError> for BrokerError {
    fn from(err: AlpacaError) -> Self {
        match err {
            AlpacaError::Network(message)
            | AlpacaError::MaxRetriesExceeded {
                last_error: message,
                ..
            } => Self::ConnectionError { message },
            AlpacaError::Timeout(message) => Self::Timeout { message },
            AlpacaError::OrderRejected(reason) => Self::OrderRejected { reason },
            AlpacaError::InsufficientFunds(_) => Self::InsufficientFunds,
            AlpacaError::RateLimited { .. } => Self::RateLimited,
            AlpacaError::NotFound { path } => Self::OrderNotFound {
                order_id: path.rsplit('/').next().unwrap_or_default().to_string(),
            },
            other @ (AlpacaError::Configuration(_)
            | AlpacaError::Api { .. }
            | AlpacaError::AuthenticationFailed
            | AlpacaError::Decode(_)) => Self::Unknown {
                message: other.to_string(),
            },
        }
    }
}

impl From<AlpacaError> for MarketDataError {
    fn from(err: AlpacaError) -> Self {
        match err {
            AlpacaError::Network(message)
            | AlpacaError::Timeout(message)
            | AlpacaError::MaxRetriesExceeded {
                last_error: message,
                ..
            } => Self::ConnectionError { message },
            AlpacaError::RateLimited { retry_after_secs } => {
                Self::RateLimited { retry_after_secs }
            }
            AlpacaError::NotFound { path } => Self::SymbolNotFound { symbol: path },
            other => Self::Api {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(AlpacaError::Network("reset".into()), true; "network")]
    #[test_case(AlpacaError::Timeout("slow".into()), true; "timeout")]
    #[test_case(AlpacaError::RateLimited { retry_after_secs: 1 }, true; "rate limited")]
    #[test_case(AlpacaError::OrderRejected("halted".into()), false; "rejected")]
    #[test_case(AlpacaError::AuthenticationFailed, false; "auth")]
    fn broker_mapping_preserves_transience(error: AlpacaError, transient: bool) {
        assert_eq!(BrokerError::from(error).is_transient(), transient);
    }

    #[test]
    fn not_found_keeps_order_id() {
        let error = AlpacaError::NotFound {
            path: "/v2/orders/abc123".into(),
        };
        assert_eq!(
            BrokerError::from(error),
            BrokerError::OrderNotFound {
                order_id: "abc123".into()
            }
        );
    }

    #[test]
    fn insufficient_funds_maps_to_port_variant() {
        let error = AlpacaError::InsufficientFunds("buying power".into());
        assert_eq!(BrokerError::from(error), BrokerError::InsufficientFunds);
    }

    #[test]
    fn market_data_mapping() {
        let error = AlpacaError::RateLimited {
            retry_after_secs: 7,
        };
        assert_eq!(
            MarketDataError::from(error),
            MarketDataError::RateLimited {
                retry_after_secs: 7
            }
        );
        assert!(matches!(
            MarketDataError::from(AlpacaError::Decode("x".into())),
            MarketDataError::Api { .. }
        ));
    }
}
