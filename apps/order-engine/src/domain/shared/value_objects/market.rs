//! Market data value objects shared by execution and risk.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bar aggregation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    /// One-minute bars.
    OneMinute,
    /// Five-minute bars.
    FiveMinutes,
    /// Hourly bars.
    OneHour,
    /// Daily bars.
    OneDay,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneMinute => write!(f, "1m"),
            Self::FiveMinutes => write!(f, "5m"),
            Self::OneHour => write!(f, "1h"),
            Self::OneDay => write!(f, "1d"),
        }
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time.
    pub timestamp: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: u64,
}

impl Bar {
    /// `(high + low + close) / 3`.
    #[must_use]
    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }

    /// True range against the previous bar's close.
    #[must_use]
    pub fn true_range(&self, previous_close: Option<Decimal>) -> Decimal {
        let range = self.high - self.low;
        match previous_close {
            Some(prev) => range
                .max((self.high - prev).abs())
                .max((self.low - prev).abs()),
            None => range,
        }
    }
}
