//! Account and position snapshots reported by the broker.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::Symbol;

/// Direction of a held position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    /// Long.
    Long,
    /// Short.
    Short,
}

/// One broker position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument.
    pub symbol: Symbol,
    /// Shares held (absolute).
    pub quantity: u64,
    /// Direction.
    pub side: PositionSide,
    /// Average entry price.
    pub average_entry_price: Decimal,
    /// Last price known to the broker.
    pub current_price: Decimal,
    /// Market value (absolute).
    pub market_value: Decimal,
    /// Unrealized P&L.
    pub unrealized_pnl: Decimal,
}

impl Position {
    /// `quantity × average_entry_price`.
    #[must_use]
    pub fn cost_basis(&self) -> Decimal {
        Decimal::from(self.quantity) * self.average_entry_price
    }

    /// Unrealized P&L at `price`, signed by side.
    #[must_use]
    pub fn unrealized_pnl_at(&self, price: Decimal) -> Decimal {
        let gross = (price - self.average_entry_price) * Decimal::from(self.quantity);
        match self.side {
            PositionSide::Long => gross,
            PositionSide::Short => -gross,
        }
    }
}

/// Account balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Settled cash.
    pub cash: Decimal,
    /// Buying power.
    pub buying_power: Decimal,
    /// Total portfolio value.
    pub portfolio_value: Decimal,
    /// Current equity.
    pub equity: Decimal,
    /// Equity at the previous close, when the broker reports it.
    pub last_equity: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: PositionSide) -> Position {
        Position {
            symbol: Symbol::new("AAPL"),
            quantity: 10,
            side,
            average_entry_price: dec!(100),
            current_price: dec!(110),
            market_value: dec!(1100),
            unrealized_pnl: dec!(100),
        }
    }

    #[test]
    fn pnl_sign_follows_side() {
        assert_eq!(position(PositionSide::Long).unrealized_pnl_at(dec!(110)), dec!(100));
        assert_eq!(position(PositionSide::Short).unrealized_pnl_at(dec!(110)), dec!(-100));
        assert_eq!(position(PositionSide::Long).cost_basis(), dec!(1000));
    }
}
