//! Market Data Port (Driven Port)
//!
//! Quotes and historical bars from an external provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::shared::{Bar, Symbol, Timeframe};

/// Market quote for a single symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketQuote {
    /// Symbol.
    pub symbol: Symbol,
    /// Last trade price.
    pub price: Decimal,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Session volume.
    pub volume: u64,
    /// Quote time.
    pub timestamp: DateTime<Utc>,
}

impl MarketQuote {
    /// Mid price.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }
}

/// Market data error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketDataError {
    /// Connection error.
    #[error("Market data connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// Symbol not found.
    #[error("Symbol not found: {symbol}")]
    SymbolNotFound {
        /// The unknown symbol.
        symbol: String,
    },

    /// Data unavailable.
    #[error("Market data unavailable: {message}")]
    DataUnavailable {
        /// Error details.
        message: String,
    },

    /// Rate limited.
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// API error.
    #[error("Market data API error: {message}")]
    Api {
        /// Error details.
        message: String,
    },
}

impl MarketDataError {
    /// Worth retrying: connection and rate-limit failures.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. } | Self::RateLimited { .. }
        )
    }
}

/// Port for market data.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Latest quotes; symbols without data are absent from the map.
    async fn get_quotes(
        &self,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, MarketQuote>, MarketDataError>;

    /// Latest quote for one symbol.
    async fn get_quote(&self, symbol: &Symbol) -> Result<Option<MarketQuote>, MarketDataError> {
        let mut quotes = self.get_quotes(std::slice::from_ref(symbol)).await?;
        Ok(quotes.remove(symbol))
    }

    /// Up to `limit` most recent bars, oldest first.
    async fn get_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, MarketDataError>;
}
