//! Events emitted as advanced orders move through their lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::advanced_order::OrderKind;
use super::value_objects::OrderStatus;
use crate::domain::shared::{BrokerOrderId, OrderId, Symbol};

/// Engine event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    /// Advanced order accepted and registered.
    OrderPlaced {
        /// Engine id.
        order_id: OrderId,
        /// Variant.
        kind: OrderKind,
        /// Instrument.
        symbol: Symbol,
        /// When.
        occurred_at: DateTime<Utc>,
    },
    /// Status moved forward.
    OrderStatusChanged {
        /// Engine id.
        order_id: OrderId,
        /// Variant.
        kind: OrderKind,
        /// New status.
        status: OrderStatus,
        /// When.
        occurred_at: DateTime<Utc>,
    },
    /// Bracket exit legs working.
    ExitLegsPlaced {
        /// Engine id.
        order_id: OrderId,
        /// Exit leg broker ids.
        legs: Vec<BrokerOrderId>,
        /// When.
        occurred_at: DateTime<Utc>,
    },
    /// A filled position has no working stop.
    UnprotectedPosition {
        /// Engine id.
        order_id: OrderId,
        /// Instrument.
        symbol: Symbol,
        /// Shares at risk.
        quantity: u64,
        /// Last placement error.
        reason: String,
        /// When.
        occurred_at: DateTime<Utc>,
    },
    /// OCO leg filled and its sibling was cancelled.
    OcoResolved {
        /// Engine id.
        order_id: OrderId,
        /// Filled leg.
        filled_leg: BrokerOrderId,
        /// Cancelled leg.
        cancelled_leg: BrokerOrderId,
        /// When.
        occurred_at: DateTime<Utc>,
    },
    /// Next iceberg slice working.
    IcebergSlicePlaced {
        /// Engine id.
        order_id: OrderId,
        /// Slice broker id.
        slice_order_id: BrokerOrderId,
        /// Slice size.
        quantity: u64,
        /// Shares left after this slice.
        remaining: u64,
        /// When.
        occurred_at: DateTime<Utc>,
    },
    /// Trailing stop moved.
    TrailingStopRatcheted {
        /// Engine id.
        order_id: OrderId,
        /// Instrument.
        symbol: Symbol,
        /// New stop.
        stop_price: Decimal,
        /// When.
        occurred_at: DateTime<Utc>,
    },
    /// Cancelled on request.
    OrderCancelled {
        /// Engine id.
        order_id: OrderId,
        /// Variant.
        kind: OrderKind,
        /// When.
        occurred_at: DateTime<Utc>,
    },
    /// Monitor loop restarted after a crash.
    MonitorRestarted {
        /// Restarts so far.
        restarts: u32,
        /// When.
        occurred_at: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "ORDER_PLACED",
            Self::OrderStatusChanged { .. } => "ORDER_STATUS_CHANGED",
            Self::ExitLegsPlaced { .. } => "EXIT_LEGS_PLACED",
            Self::UnprotectedPosition { .. } => "UNPROTECTED_POSITION",
            Self::OcoResolved { .. } => "OCO_RESOLVED",
            Self::IcebergSlicePlaced { .. } => "ICEBERG_SLICE_PLACED",
            Self::TrailingStopRatcheted { .. } => "TRAILING_STOP_RATCHETED",
            Self::OrderCancelled { .. } => "ORDER_CANCELLED",
            Self::MonitorRestarted { .. } => "MONITOR_RESTARTED",
        }
    }

    /// Order the event is about, if any.
    #[must_use]
    pub const fn order_id(&self) -> Option<&OrderId> {
        match self {
            Self::OrderPlaced { order_id, .. }
            | Self::OrderStatusChanged { order_id, .. }
            | Self::ExitLegsPlaced { order_id, .. }
            | Self::UnprotectedPosition { order_id, .. }
            | Self::OcoResolved { order_id, .. }
            | Self::IcebergSlicePlaced { order_id, .. }
            | Self::TrailingStopRatcheted { order_id, .. }
            | Self::OrderCancelled { order_id, .. } => Some(order_id),
            Self::MonitorRestarted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tag_matches_event_type() {
        let event = EngineEvent::OrderCancelled {
            order_id: OrderId::new("OCO_1"),
            kind: OrderKind::Oco,
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(event.order_id(), Some(&OrderId::new("OCO_1")));
    }
}
