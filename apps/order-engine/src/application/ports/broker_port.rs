//! Broker Port (Driven Port)
//!
//! Interface for placing, amending and inspecting orders at a brokerage.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::advanced_orders::{LegState, OrderSide, OrderStatus, OrderType, TimeInForce};
use crate::domain::risk_management::{Account, Position};
use crate::domain::shared::{BrokerOrderId, ClientOrderId, Symbol};

/// Request to submit an order to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
    /// Idempotency id echoed back by the broker.
    pub client_order_id: ClientOrderId,
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Whole shares.
    pub quantity: u64,
    /// Limit price (limit and stop-limit orders).
    pub limit_price: Option<Decimal>,
    /// Stop price (stop and stop-limit orders).
    pub stop_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
}

impl SubmitOrderRequest {
    /// Market order, DAY.
    #[must_use]
    pub const fn market(
        client_order_id: ClientOrderId,
        symbol: Symbol,
        side: OrderSide,
        quantity: u64,
    ) -> Self {
        Self {
            client_order_id,
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    /// Limit order, DAY.
    #[must_use]
    pub const fn limit(
        client_order_id: ClientOrderId,
        symbol: Symbol,
        side: OrderSide,
        quantity: u64,
        limit_price: Decimal,
    ) -> Self {
        Self {
            client_order_id,
            symbol,
            side,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(limit_price),
            stop_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    /// Stop order, DAY.
    #[must_use]
    pub const fn stop(
        client_order_id: ClientOrderId,
        symbol: Symbol,
        side: OrderSide,
        quantity: u64,
        stop_price: Decimal,
    ) -> Self {
        Self {
            client_order_id,
            symbol,
            side,
            order_type: OrderType::Stop,
            quantity,
            limit_price: None,
            stop_price: Some(stop_price),
            time_in_force: TimeInForce::Day,
        }
    }

    /// Set time in force.
    #[must_use]
    pub const fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }
}

/// Broker's view of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Broker-assigned order ID.
    pub broker_order_id: BrokerOrderId,
    /// Client order ID echoed back.
    pub client_order_id: Option<ClientOrderId>,
    /// Symbol.
    pub symbol: Symbol,
    /// Current status.
    pub status: OrderStatus,
    /// Shares filled.
    pub filled_quantity: u64,
    /// Average fill price, if anything filled.
    pub average_fill_price: Option<Decimal>,
}

impl OrderAck {
    /// The leg snapshot the order state machines consume.
    #[must_use]
    pub fn leg_state(&self) -> LegState {
        LegState {
            status: self.status,
            filled_quantity: self.filled_quantity,
            average_fill_price: self.average_fill_price,
        }
    }
}

/// Result of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    /// Cancelled order.
    pub broker_order_id: BrokerOrderId,
    /// Broker status after the request, e.g. `pending_cancel`.
    pub status: String,
    /// Free-form detail.
    pub message: Option<String>,
}

/// Status filter for order listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderQueryStatus {
    /// Working orders.
    #[default]
    Open,
    /// Terminal orders.
    Closed,
    /// Everything.
    All,
}

impl OrderQueryStatus {
    /// Query-string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

/// Broker port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Connection error.
    #[error("Broker connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// Request timed out.
    #[error("Broker request timed out: {message}")]
    Timeout {
        /// Error details.
        message: String,
    },

    /// Order rejected by broker.
    #[error("Order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason.
        reason: String,
    },

    /// Order not found.
    #[error("Order not found: {order_id}")]
    OrderNotFound {
        /// The missing order ID.
        order_id: String,
    },

    /// Insufficient funds.
    #[error("Insufficient buying power")]
    InsufficientFunds,

    /// Rate limited.
    #[error("Rate limited by broker")]
    RateLimited,

    /// Unknown error.
    #[error("Broker error: {message}")]
    Unknown {
        /// Error details.
        message: String,
    },
}

impl BrokerError {
    /// Worth retrying: connection, timeout and rate-limit failures.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. } | Self::Timeout { .. } | Self::RateLimited
        )
    }
}

/// Port for broker interactions.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Submit an order.
    async fn submit_order(&self, request: SubmitOrderRequest) -> Result<OrderAck, BrokerError>;

    /// Cancel an order.
    async fn cancel_order(&self, broker_order_id: &BrokerOrderId)
    -> Result<CancelAck, BrokerError>;

    /// Replace a working order with `replacement`'s price and quantity.
    ///
    /// Defaults to cancel then submit; brokers with native replace should
    /// override.
    async fn replace_order(
        &self,
        broker_order_id: &BrokerOrderId,
        replacement: SubmitOrderRequest,
    ) -> Result<OrderAck, BrokerError> {
        self.cancel_order(broker_order_id).await?;
        self.submit_order(replacement).await
    }

    /// Get one order.
    async fn get_order(&self, broker_order_id: &BrokerOrderId) -> Result<OrderAck, BrokerError>;

    /// List orders by status.
    async fn get_orders(&self, status: OrderQueryStatus) -> Result<Vec<OrderAck>, BrokerError>;

    /// All open positions.
    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError>;

    /// Position in `symbol`, if any.
    async fn get_position(&self, symbol: &Symbol) -> Result<Option<Position>, BrokerError> {
        Ok(self
            .get_positions()
            .await?
            .into_iter()
            .find(|position| &position.symbol == symbol))
    }

    /// Account balances.
    async fn get_account(&self) -> Result<Account, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn stop_request_carries_stop_price_only() {
        let request = SubmitOrderRequest::stop(
            ClientOrderId::new("BRACKET_SL_1"),
            Symbol::new("AAPL"),
            OrderSide::Sell,
            100,
            dec!(145),
        )
        .with_time_in_force(TimeInForce::Gtc);

        assert_eq!(request.order_type, OrderType::Stop);
        assert_eq!(request.stop_price, Some(dec!(145)));
        assert!(request.limit_price.is_none());
        assert_eq!(request.time_in_force, TimeInForce::Gtc);
    }

    #[test]
    fn limit_request_defaults_to_day() {
        let request = SubmitOrderRequest::limit(
            ClientOrderId::new("x"),
            Symbol::new("AAPL"),
            OrderSide::Buy,
            10,
            dec!(150),
        );
        assert_eq!(request.limit_price, Some(dec!(150)));
        assert_eq!(request.time_in_force, TimeInForce::Day);
    }

    #[test]
    fn transient_errors_are_classified() {
        assert!(BrokerError::RateLimited.is_transient());
        assert!(
            BrokerError::Timeout {
                message: "t".into()
            }
            .is_transient()
        );
        assert!(!BrokerError::InsufficientFunds.is_transient());
        assert!(
            !BrokerError::OrderRejected {
                reason: "r".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn ack_projects_leg_state() {
        let ack = OrderAck {
            broker_order_id: BrokerOrderId::new("b1"),
            client_order_id: None,
            symbol: Symbol::new("AAPL"),
            status: OrderStatus::PartiallyFilled,
            filled_quantity: 40,
            average_fill_price: Some(dec!(10)),
        };
        assert_eq!(ack.leg_state().filled_quantity, 40);
        assert_eq!(ack.leg_state().status, OrderStatus::PartiallyFilled);
    }
}
