//! One-cancels-other: two resting orders on the same side, the first to
//! fill cancels the other.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::{OrderError, require_price, require_quantity};
use super::value_objects::{LegState, OrderSide, OrderStatus, OrderType};
use crate::domain::shared::{BrokerOrderId, OrderId, Symbol};

/// Type and price of one OCO leg. LIMIT legs rest at `price` as a limit,
/// STOP legs trigger at `price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcoLeg {
    /// LIMIT or STOP.
    pub order_type: OrderType,
    /// Limit or stop price.
    pub price: Decimal,
}

impl OcoLeg {
    /// Limit leg.
    #[must_use]
    pub const fn limit(price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            price,
        }
    }

    /// Stop leg.
    #[must_use]
    pub const fn stop(price: Decimal) -> Self {
        Self {
            order_type: OrderType::Stop,
            price,
        }
    }

    fn validate(&self, field: &'static str) -> Result<(), OrderError> {
        if !matches!(self.order_type, OrderType::Limit | OrderType::Stop) {
            return Err(OrderError::UnsupportedLegType(self.order_type));
        }
        require_price(field, self.price)
    }
}

/// Parameters for a new OCO pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcoRequest {
    /// Instrument.
    pub symbol: Symbol,
    /// Side shared by both legs.
    pub side: OrderSide,
    /// Shares per leg.
    pub quantity: u64,
    /// First leg.
    pub leg_1: OcoLeg,
    /// Second leg.
    pub leg_2: OcoLeg,
}

impl OcoRequest {
    /// New OCO request.
    #[must_use]
    pub fn new(
        symbol: impl Into<Symbol>,
        side: OrderSide,
        quantity: u64,
        leg_1: OcoLeg,
        leg_2: OcoLeg,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            leg_1,
            leg_2,
        }
    }

    /// Check quantity, leg types and prices.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.symbol.is_empty() {
            return Err(OrderError::EmptySymbol);
        }
        require_quantity("quantity", self.quantity)?;
        self.leg_1.validate("leg 1 price")?;
        self.leg_2.validate("leg 2 price")
    }
}

/// Outcome of a poll of both legs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcoProgress {
    /// Nothing new.
    Unchanged,
    /// A leg filled in part.
    PartiallyFilled,
    /// A leg filled; the other must be cancelled once.
    Resolved {
        /// Winning leg.
        winner: BrokerOrderId,
        /// Leg to cancel.
        loser: BrokerOrderId,
    },
    /// Both legs died without a fill.
    Ended(OrderStatus),
}

/// A pair of same-side orders where one fill cancels the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcoOrder {
    id: OrderId,
    symbol: Symbol,
    side: OrderSide,
    quantity: u64,
    leg_1: OcoLeg,
    leg_2: OcoLeg,
    order_1_id: Option<BrokerOrderId>,
    order_2_id: Option<BrokerOrderId>,
    active_order_id: Option<BrokerOrderId>,
    status: OrderStatus,
    filled_quantity: u64,
    average_fill_price: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OcoOrder {
    /// New pair in `Pending`.
    #[must_use]
    pub fn new(id: OrderId, request: &OcoRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            leg_1: request.leg_1,
            leg_2: request.leg_2,
            order_1_id: None,
            order_2_id: None,
            active_order_id: None,
            status: OrderStatus::Pending,
            filled_quantity: 0,
            average_fill_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record both accepted legs.
    pub fn mark_submitted(
        &mut self,
        order_1_id: BrokerOrderId,
        order_2_id: BrokerOrderId,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.advance(OrderStatus::Submitted) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Submitted,
            });
        }
        self.order_1_id = Some(order_1_id);
        self.order_2_id = Some(order_2_id);
        self.updated_at = now;
        Ok(())
    }

    /// Apply the broker's view of both legs. Leg 1 wins a tie.
    pub fn apply_leg_updates(
        &mut self,
        leg_1: &LegState,
        leg_2: &LegState,
        now: DateTime<Utc>,
    ) -> OcoProgress {
        if self.status.is_terminal() {
            return OcoProgress::Unchanged;
        }
        let (Some(order_1), Some(order_2)) = (self.order_1_id.clone(), self.order_2_id.clone())
        else {
            return OcoProgress::Unchanged;
        };

        let progress = if leg_1.status == OrderStatus::Filled {
            self.resolve(leg_1, order_1, order_2)
        } else if leg_2.status == OrderStatus::Filled {
            self.resolve(leg_2, order_2, order_1)
        } else if leg_1.is_dead() && leg_2.is_dead() {
            let ended = [leg_1.status, leg_2.status]
                .into_iter()
                .find(|s| *s == OrderStatus::Cancelled)
                .or_else(|| {
                    [leg_1.status, leg_2.status]
                        .into_iter()
                        .find(|s| *s == OrderStatus::Expired)
                })
                .unwrap_or(OrderStatus::Rejected);
            if !self.status.advance(ended) {
                self.status.advance(OrderStatus::Cancelled);
            }
            OcoProgress::Ended(self.status)
        } else {
            let filled = leg_1.filled_quantity.max(leg_2.filled_quantity);
            if filled == 0 || filled == self.filled_quantity {
                return OcoProgress::Unchanged;
            }
            self.status.advance(OrderStatus::PartiallyFilled);
            self.filled_quantity = filled;
            self.average_fill_price = if leg_1.filled_quantity >= leg_2.filled_quantity {
                leg_1.average_fill_price
            } else {
                leg_2.average_fill_price
            };
            OcoProgress::PartiallyFilled
        };
        self.updated_at = now;
        progress
    }

    fn resolve(
        &mut self,
        winning_leg: &LegState,
        winner: BrokerOrderId,
        loser: BrokerOrderId,
    ) -> OcoProgress {
        self.status.advance(OrderStatus::Filled);
        self.filled_quantity = if winning_leg.filled_quantity == 0 {
            self.quantity
        } else {
            winning_leg.filled_quantity
        };
        self.average_fill_price = winning_leg.average_fill_price;
        self.active_order_id = Some(winner.clone());
        OcoProgress::Resolved { winner, loser }
    }

    /// Both legs while unresolved.
    #[must_use]
    pub fn live_broker_order_ids(&self) -> Vec<BrokerOrderId> {
        if self.status.is_terminal() {
            return Vec::new();
        }
        self.order_1_id
            .iter()
            .chain(self.order_2_id.iter())
            .cloned()
            .collect()
    }

    /// Cancel on request.
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status.advance(OrderStatus::Cancelled);
        self.updated_at = now;
    }

    /// Nothing left to supervise.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }

    /// Engine id.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// Instrument.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Side of both legs.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Shares per leg.
    #[must_use]
    pub const fn quantity(&self) -> u64 {
        self.quantity
    }

    /// First leg definition.
    #[must_use]
    pub const fn leg_1(&self) -> &OcoLeg {
        &self.leg_1
    }

    /// Second leg definition.
    #[must_use]
    pub const fn leg_2(&self) -> &OcoLeg {
        &self.leg_2
    }

    /// First leg broker id.
    #[must_use]
    pub const fn order_1_id(&self) -> Option<&BrokerOrderId> {
        self.order_1_id.as_ref()
    }

    /// Second leg broker id.
    #[must_use]
    pub const fn order_2_id(&self) -> Option<&BrokerOrderId> {
        self.order_2_id.as_ref()
    }

    /// Leg that filled.
    #[must_use]
    pub const fn active_order_id(&self) -> Option<&BrokerOrderId> {
        self.active_order_id.as_ref()
    }

    /// Lifecycle status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Shares filled.
    #[must_use]
    pub const fn filled_quantity(&self) -> u64 {
        self.filled_quantity
    }

    /// Average fill.
    #[must_use]
    pub const fn average_fill_price(&self) -> Option<Decimal> {
        self.average_fill_price
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last change.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
