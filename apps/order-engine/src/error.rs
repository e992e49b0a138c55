//! Errors returned by engine operations.
//!
//! # Error Codes
//!
//! | Code | Cause | Caller action |
//! |------|-------|---------------|
//! | `INVALID_ORDER_PARAMS` | Malformed request | Fix the request |
//! | `ORDER_REJECTED` | Broker declined the order | Inspect the reason |
//! | `INSUFFICIENT_MARGIN` | Not enough buying power | Reduce size |
//! | `RATE_LIMITED` | Broker throttling | Retry later |
//! | `ORDER_NOT_FOUND` | Unknown broker order | None |
//! | `NO_QUOTE` | No market data for the symbol | Retry later |
//! | `BROKER_API_ERROR` | Transport or unexpected broker failure | Retry later |
//! | `MARKET_DATA_ERROR` | Market data failure | Retry later |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::{BrokerError, MarketDataError};
use crate::domain::advanced_orders::OrderError;
use crate::domain::shared::Symbol;

/// Stable error codes for engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Invalid order parameters.
    InvalidOrderParams,
    /// Order rejected by broker.
    OrderRejected,
    /// Insufficient buying power.
    InsufficientMargin,
    /// Rate limit exceeded.
    RateLimited,
    /// Broker order not found.
    OrderNotFound,
    /// No quote for the symbol.
    NoQuote,
    /// Broker API error.
    BrokerApiError,
    /// Market data error.
    MarketDataError,
}

impl ErrorCode {
    /// Reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidOrderParams => "INVALID_ORDER_PARAMS",
            Self::OrderRejected => "ORDER_REJECTED",
            Self::InsufficientMargin => "INSUFFICIENT_MARGIN",
            Self::RateLimited => "RATE_LIMITED",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::NoQuote => "NO_QUOTE",
            Self::BrokerApiError => "BROKER_API_ERROR",
            Self::MarketDataError => "MARKET_DATA_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// Error from an engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The request was malformed; nothing reached the broker.
    #[error("Invalid order: {0}")]
    Validation(#[from] OrderError),

    /// The broker declined the order; nothing was registered.
    #[error("Order rejected by broker: {0}")]
    Rejected(BrokerError),

    /// Any other broker failure.
    #[error(transparent)]
    Broker(BrokerError),

    /// Market data failure.
    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    /// No current quote for the symbol.
    #[error("No quote available for {0}")]
    NoQuote(Symbol),
}

impl EngineError {
    /// Classify a broker error raised while placing an order.
    #[must_use]
    pub fn placement(error: BrokerError) -> Self {
        match error {
            BrokerError::OrderRejected { .. } | BrokerError::InsufficientFunds => {
                Self::Rejected(error)
            }
            other => Self::Broker(other),
        }
    }

    /// Stable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::InvalidOrderParams,
            Self::Rejected(BrokerError::InsufficientFunds)
            | Self::Broker(BrokerError::InsufficientFunds) => ErrorCode::InsufficientMargin,
            Self::Rejected(_) => ErrorCode::OrderRejected,
            Self::Broker(BrokerError::RateLimited) => ErrorCode::RateLimited,
            Self::Broker(BrokerError::OrderNotFound { .. }) => ErrorCode::OrderNotFound,
            Self::Broker(_) => ErrorCode::BrokerApiError,
            Self::MarketData(MarketDataError::RateLimited { .. }) => ErrorCode::RateLimited,
            Self::MarketData(_) => ErrorCode::MarketDataError,
            Self::NoQuote(_) => ErrorCode::NoQuote,
        }
    }
}

impl From<BrokerError> for EngineError {
    fn from(error: BrokerError) -> Self {
        Self::Broker(error)
    }
}
