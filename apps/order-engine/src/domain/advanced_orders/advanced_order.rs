//! The closed set of advanced order variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::bracket::BracketOrder;
use super::iceberg::IcebergOrder;
use super::oco::OcoOrder;
use super::trailing_stop::TrailingStopOrder;
use super::value_objects::{OrderSide, OrderStatus};
use crate::domain::shared::{BrokerOrderId, OrderId, Symbol};

/// Variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Entry plus stop loss and targets.
    Bracket,
    /// One-cancels-other pair.
    Oco,
    /// Sliced hidden-size order.
    Iceberg,
    /// Ratcheting protective stop.
    TrailingStop,
}

impl OrderKind {
    /// Prefix of engine ids for this variant.
    #[must_use]
    pub const fn id_prefix(&self) -> &'static str {
        match self {
            Self::Bracket => "BRACKET",
            Self::Oco => "OCO",
            Self::Iceberg => "ICEBERG",
            Self::TrailingStop => "TRAILING",
        }
    }

    /// Metric label.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Bracket => "bracket",
            Self::Oco => "oco",
            Self::Iceberg => "iceberg",
            Self::TrailingStop => "trailing_stop",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id_prefix())
    }
}

/// An advanced order of any variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvancedOrder {
    /// Bracket order.
    Bracket(BracketOrder),
    /// OCO pair.
    Oco(OcoOrder),
    /// Iceberg order.
    Iceberg(IcebergOrder),
    /// Trailing stop.
    TrailingStop(TrailingStopOrder),
}

impl AdvancedOrder {
    /// Variant tag.
    #[must_use]
    pub const fn kind(&self) -> OrderKind {
        match self {
            Self::Bracket(_) => OrderKind::Bracket,
            Self::Oco(_) => OrderKind::Oco,
            Self::Iceberg(_) => OrderKind::Iceberg,
            Self::TrailingStop(_) => OrderKind::TrailingStop,
        }
    }

    /// Engine id.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        match self {
            Self::Bracket(o) => o.id(),
            Self::Oco(o) => o.id(),
            Self::Iceberg(o) => o.id(),
            Self::TrailingStop(o) => o.id(),
        }
    }

    /// Instrument.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        match self {
            Self::Bracket(o) => o.symbol(),
            Self::Oco(o) => o.symbol(),
            Self::Iceberg(o) => o.symbol(),
            Self::TrailingStop(o) => o.symbol(),
        }
    }

    /// Side as requested.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        match self {
            Self::Bracket(o) => o.side(),
            Self::Oco(o) => o.side(),
            Self::Iceberg(o) => o.side(),
            Self::TrailingStop(o) => o.side(),
        }
    }

    /// Lifecycle status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        match self {
            Self::Bracket(o) => o.status(),
            Self::Oco(o) => o.status(),
            Self::Iceberg(o) => o.status(),
            Self::TrailingStop(o) => o.status(),
        }
    }

    /// Nothing left for the monitor to do.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        match self {
            Self::Bracket(o) => o.is_settled(),
            Self::Oco(o) => o.is_settled(),
            Self::Iceberg(o) => o.is_settled(),
            Self::TrailingStop(o) => o.is_settled(),
        }
    }

    /// Broker legs that may still be working.
    #[must_use]
    pub fn live_broker_order_ids(&self) -> Vec<BrokerOrderId> {
        match self {
            Self::Bracket(o) => o.live_broker_order_ids(),
            Self::Oco(o) => o.live_broker_order_ids(),
            Self::Iceberg(o) => o.live_broker_order_ids(),
            Self::TrailingStop(o) => o.live_broker_order_ids(),
        }
    }

    /// Cancel on request.
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        match self {
            Self::Bracket(o) => o.mark_cancelled(now),
            Self::Oco(o) => o.mark_cancelled(now),
            Self::Iceberg(o) => o.mark_cancelled(now),
            Self::TrailingStop(o) => o.mark_cancelled(now),
        }
    }

    /// Last change.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::Bracket(o) => o.updated_at(),
            Self::Oco(o) => o.updated_at(),
            Self::Iceberg(o) => o.updated_at(),
            Self::TrailingStop(o) => o.updated_at(),
        }
    }

    /// Bracket view.
    #[must_use]
    pub const fn as_bracket(&self) -> Option<&BracketOrder> {
        match self {
            Self::Bracket(o) => Some(o),
            _ => None,
        }
    }

    /// OCO view.
    #[must_use]
    pub const fn as_oco(&self) -> Option<&OcoOrder> {
        match self {
            Self::Oco(o) => Some(o),
            _ => None,
        }
    }

    /// Iceberg view.
    #[must_use]
    pub const fn as_iceberg(&self) -> Option<&IcebergOrder> {
        match self {
            Self::Iceberg(o) => Some(o),
            _ => None,
        }
    }

    /// Trailing stop view.
    #[must_use]
    pub const fn as_trailing_stop(&self) -> Option<&TrailingStopOrder> {
        match self {
            Self::TrailingStop(o) => Some(o),
            _ => None,
        }
    }
}

impl From<BracketOrder> for AdvancedOrder {
    fn from(order: BracketOrder) -> Self {
        Self::Bracket(order)
    }
}

impl From<OcoOrder> for AdvancedOrder {
    fn from(order: OcoOrder) -> Self {
        Self::Oco(order)
    }
}

impl From<IcebergOrder> for AdvancedOrder {
    fn from(order: IcebergOrder) -> Self {
        Self::Iceberg(order)
    }
}

impl From<TrailingStopOrder> for AdvancedOrder {
    fn from(order: TrailingStopOrder) -> Self {
        Self::TrailingStop(order)
    }
}
