//! Broker-side snapshot of a single leg.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// What the broker reports about one leg of an advanced order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegState {
    /// Broker status of the leg.
    pub status: OrderStatus,
    /// Shares filled so far.
    pub filled_quantity: u64,
    /// Average fill price, if anything filled.
    pub average_fill_price: Option<Decimal>,
}

impl LegState {
    /// Leg with the given status and nothing filled.
    #[must_use]
    pub const fn with_status(status: OrderStatus) -> Self {
        Self {
            status,
            filled_quantity: 0,
            average_fill_price: None,
        }
    }

    /// Completely filled leg.
    #[must_use]
    pub const fn filled(quantity: u64, price: Decimal) -> Self {
        Self {
            status: OrderStatus::Filled,
            filled_quantity: quantity,
            average_fill_price: Some(price),
        }
    }

    /// Terminal without a fill.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}
