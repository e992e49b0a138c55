//! Execution reports for sliced runs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::advanced_orders::OrderSide;
use crate::domain::shared::{BrokerOrderId, ClientOrderId, Symbol};

/// Slicing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    /// Time-weighted.
    Twap,
    /// Volume-weighted.
    Vwap,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Twap => write!(f, "TWAP"),
            Self::Vwap => write!(f, "VWAP"),
        }
    }
}

/// One submitted slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSlice {
    /// 1-based interval number.
    pub interval: u32,
    /// Shares submitted.
    pub quantity: u64,
    /// Reference price at submission.
    pub price: Decimal,
    /// Broker id.
    pub broker_order_id: BrokerOrderId,
    /// Client id.
    pub client_order_id: ClientOrderId,
    /// Volume weight of the source bar (VWAP only).
    pub volume_weight: Option<Decimal>,
    /// Submission time.
    pub timestamp: DateTime<Utc>,
}

/// Summary of a TWAP or VWAP run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Algorithm that produced the slices.
    pub algorithm: Algorithm,
    /// Instrument.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Shares requested.
    pub total_quantity: u64,
    /// Requested window, in minutes.
    pub duration_minutes: u32,
    /// Shares submitted across all slices.
    pub total_filled: u64,
    /// `Σ(price × quantity) / total_filled`, zero when nothing was sent.
    pub average_price: Decimal,
    /// Planned intervals (TWAP) or bars (VWAP).
    pub intervals: u32,
    /// Planned slices that were not sent.
    pub skipped: u32,
    /// Submitted slices in order.
    pub executions: Vec<ExecutionSlice>,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub completed_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Build the report from the submitted slices.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_slices(
        algorithm: Algorithm,
        symbol: Symbol,
        side: OrderSide,
        total_quantity: u64,
        duration_minutes: u32,
        intervals: u32,
        executions: Vec<ExecutionSlice>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let total_filled: u64 = executions.iter().map(|slice| slice.quantity).sum();
        let notional: Decimal = executions
            .iter()
            .map(|slice| slice.price * Decimal::from(slice.quantity))
            .sum();
        let average_price = if total_filled == 0 {
            Decimal::ZERO
        } else {
            notional / Decimal::from(total_filled)
        };
        let skipped = intervals.saturating_sub(executions.len() as u32);
        Self {
            algorithm,
            symbol,
            side,
            total_quantity,
            duration_minutes,
            total_filled,
            average_price,
            intervals,
            skipped,
            executions,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Shares requested but not sent.
    #[must_use]
    pub const fn unexecuted_quantity(&self) -> u64 {
        self.total_quantity.saturating_sub(self.total_filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn slice(interval: u32, quantity: u64, price: Decimal) -> ExecutionSlice {
        ExecutionSlice {
            interval,
            quantity,
            price,
            broker_order_id: BrokerOrderId::new(format!("b{interval}")),
            client_order_id: ClientOrderId::new(format!("c{interval}")),
            volume_weight: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn average_is_quantity_weighted() {
        let report = ExecutionReport::from_slices(
            Algorithm::Twap,
            Symbol::new("AAPL"),
            OrderSide::Buy,
            300,
            10,
            3,
            vec![slice(1, 100, dec!(10)), slice(2, 200, dec!(13))],
            Utc::now(),
        );
        assert_eq!(report.total_filled, 300);
        assert_eq!(report.average_price, dec!(12));
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn empty_run_averages_zero() {
        let report = ExecutionReport::from_slices(
            Algorithm::Vwap,
            Symbol::new("AAPL"),
            OrderSide::Sell,
            300,
            12,
            12,
            Vec::new(),
            Utc::now(),
        );
        assert_eq!(report.average_price, Decimal::ZERO);
        assert_eq!(report.unexecuted_quantity(), 300);
    }
}
