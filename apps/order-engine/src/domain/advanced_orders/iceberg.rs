//! Iceberg orders: a large limit order shown to the market one visible
//! slice at a time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::{OrderError, require_price, require_quantity};
use super::value_objects::{LegState, OrderSide, OrderStatus};
use crate::domain::shared::{BrokerOrderId, OrderId, Symbol};

/// Parameters for a new iceberg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebergRequest {
    /// Instrument.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Parent quantity.
    pub total_quantity: u64,
    /// Slice size.
    pub visible_quantity: u64,
    /// Limit price for every slice.
    pub price: Decimal,
}

impl IcebergRequest {
    /// New iceberg request.
    #[must_use]
    pub fn new(
        symbol: impl Into<Symbol>,
        side: OrderSide,
        total_quantity: u64,
        visible_quantity: u64,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            total_quantity,
            visible_quantity,
            price,
        }
    }

    /// `0 < visible <= total`, positive price.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.symbol.is_empty() {
            return Err(OrderError::EmptySymbol);
        }
        require_quantity("total quantity", self.total_quantity)?;
        require_quantity("visible quantity", self.visible_quantity)?;
        if self.visible_quantity > self.total_quantity {
            return Err(OrderError::VisibleExceedsTotal {
                visible: self.visible_quantity,
                total: self.total_quantity,
            });
        }
        require_price("price", self.price)
    }
}

/// Outcome of a poll of the working slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceProgress {
    /// Nothing new.
    Unchanged,
    /// The slice filled in part.
    SlicePartiallyFilled,
    /// The slice filled; place the next one if `remaining > 0`.
    SliceFilled {
        /// Shares left to work.
        remaining: u64,
    },
    /// The slice died; partial fills were credited.
    Ended(OrderStatus),
}

/// Hidden-size order worked in visible slices.
///
/// `filled_quantity + remaining_quantity == total_quantity` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebergOrder {
    id: OrderId,
    symbol: Symbol,
    side: OrderSide,
    total_quantity: u64,
    visible_quantity: u64,
    price: Decimal,
    filled_quantity: u64,
    remaining_quantity: u64,
    current_slice_id: Option<BrokerOrderId>,
    current_slice_quantity: u64,
    slices_placed: u32,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IcebergOrder {
    /// New iceberg in `Pending` with nothing worked.
    #[must_use]
    pub fn new(id: OrderId, request: &IcebergRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: request.symbol.clone(),
            side: request.side,
            total_quantity: request.total_quantity,
            visible_quantity: request.visible_quantity,
            price: request.price,
            filled_quantity: 0,
            remaining_quantity: request.total_quantity,
            current_slice_id: None,
            current_slice_quantity: 0,
            slices_placed: 0,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// `min(visible, remaining)`.
    #[must_use]
    pub fn next_slice_quantity(&self) -> u64 {
        self.visible_quantity.min(self.remaining_quantity)
    }

    /// True when no slice is working and shares remain.
    #[must_use]
    pub const fn needs_slice(&self) -> bool {
        !self.status.is_terminal()
            && self.current_slice_id.is_none()
            && self.remaining_quantity > 0
    }

    /// Record a placed slice; the first one moves the order to `Submitted`.
    pub fn record_slice(&mut self, slice_id: BrokerOrderId, quantity: u64, now: DateTime<Utc>) {
        if self.status == OrderStatus::Pending {
            self.status.advance(OrderStatus::Submitted);
        }
        self.current_slice_id = Some(slice_id);
        self.current_slice_quantity = quantity;
        self.slices_placed += 1;
        self.updated_at = now;
    }

    /// Apply the broker's view of the working slice.
    pub fn apply_slice_update(&mut self, leg: &LegState, now: DateTime<Utc>) -> SliceProgress {
        if self.status.is_terminal() || self.current_slice_id.is_none() {
            return SliceProgress::Unchanged;
        }

        let progress = match leg.status {
            OrderStatus::Filled => {
                self.credit(self.current_slice_quantity);
                self.current_slice_id = None;
                self.current_slice_quantity = 0;
                if self.remaining_quantity == 0 {
                    self.status.advance(OrderStatus::Filled);
                } else {
                    self.status.advance(OrderStatus::PartiallyFilled);
                }
                SliceProgress::SliceFilled {
                    remaining: self.remaining_quantity,
                }
            }
            OrderStatus::PartiallyFilled => {
                if self.status == OrderStatus::PartiallyFilled {
                    return SliceProgress::Unchanged;
                }
                self.status.advance(OrderStatus::PartiallyFilled);
                SliceProgress::SlicePartiallyFilled
            }
            OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired => {
                self.credit(leg.filled_quantity.min(self.current_slice_quantity));
                self.current_slice_id = None;
                self.current_slice_quantity = 0;
                if !self.status.advance(leg.status) {
                    self.status.advance(OrderStatus::Cancelled);
                }
                SliceProgress::Ended(self.status)
            }
            OrderStatus::Pending | OrderStatus::Submitted => return SliceProgress::Unchanged,
        };
        self.updated_at = now;
        progress
    }

    fn credit(&mut self, shares: u64) {
        let shares = shares.min(self.remaining_quantity);
        self.filled_quantity += shares;
        self.remaining_quantity -= shares;
    }

    /// Working slice, if any.
    #[must_use]
    pub fn live_broker_order_ids(&self) -> Vec<BrokerOrderId> {
        if self.status.is_terminal() {
            return Vec::new();
        }
        self.current_slice_id.iter().cloned().collect()
    }

    /// Credit the final fill of a slice the caller has just cancelled.
    pub fn absorb_cancelled_slice(&mut self, leg: &LegState, now: DateTime<Utc>) {
        if self.status.is_terminal() || self.current_slice_id.is_none() {
            return;
        }
        let filled = if leg.status == OrderStatus::Filled && leg.filled_quantity == 0 {
            self.current_slice_quantity
        } else {
            leg.filled_quantity
        };
        self.credit(filled.min(self.current_slice_quantity));
        self.current_slice_id = None;
        self.current_slice_quantity = 0;
        self.updated_at = now;
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

    /// Side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Parent quantity.
    #[must_use]
    pub const fn total_quantity(&self) -> u64 {
        self.total_quantity
    }

    /// Slice size.
    #[must_use]
    pub const fn visible_quantity(&self) -> u64 {
        self.visible_quantity
    }

    /// Limit price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Shares filled across completed slices.
    #[must_use]
    pub const fn filled_quantity(&self) -> u64 {
        self.filled_quantity
    }

    /// Shares still to work.
    #[must_use]
    pub const fn remaining_quantity(&self) -> u64 {
        self.remaining_quantity
    }

    /// Broker id of the working slice.
    #[must_use]
    pub const fn current_slice_id(&self) -> Option<&BrokerOrderId> {
        self.current_slice_id.as_ref()
    }

    /// Slices placed so far.
    #[must_use]
    pub const fn slices_placed(&self) -> u32 {
        self.slices_placed
    }

    /// Lifecycle status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
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
