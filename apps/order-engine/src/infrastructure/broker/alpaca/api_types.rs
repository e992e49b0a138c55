//! Alpaca API request and response types.
//!
//! These types map directly to Alpaca's REST API format. Prices and
//! quantities arrive as decimal strings on the trading API and as JSON
//! numbers on the data API; `Decimal` accepts both.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::application::ports::{MarketQuote, OrderAck, SubmitOrderRequest};
use crate::domain::advanced_orders::{OrderSide, OrderStatus, OrderType, TimeInForce};
use crate::domain::risk_management::{Account, Position, PositionSide};
use crate::domain::shared::{Bar, BrokerOrderId, ClientOrderId, Symbol, Timeframe};

// ============================================================================
// Order Request Types
// ============================================================================

/// Order request for Alpaca API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlpacaOrderRequest {
    /// Stock symbol.
    pub symbol: String,
    /// Quantity (shares).
    pub qty: String,
    /// Order side.
    pub side: &'static str,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: &'static str,
    /// Time in force.
    pub time_in_force: &'static str,
    /// Limit price (for limit orders).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    /// Stop price (for stop orders).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    /// Client order ID.
    pub client_order_id: String,
}

impl From<&SubmitOrderRequest> for AlpacaOrderRequest {
    fn from(request: &SubmitOrderRequest) -> Self {
        Self {
            symbol: request.symbol.as_str().to_string(),
            qty: request.quantity.to_string(),
            side: side_str(request.side),
            order_type: order_type_str(request.order_type),
            time_in_force: time_in_force_str(request.time_in_force),
            limit_price: request.limit_price.map(|p| p.to_string()),
            stop_price: request.stop_price.map(|p| p.to_string()),
            client_order_id: request.client_order_id.as_str().to_string(),
        }
    }
}

/// Body of `PATCH /v2/orders/{id}`. Alpaca cancels the original and returns
/// the replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlpacaReplaceRequest {
    /// New quantity.
    pub qty: String,
    /// New time in force.
    pub time_in_force: &'static str,
    /// New limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    /// New stop price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    /// Client order ID of the replacement.
    pub client_order_id: String,
}

impl From<&SubmitOrderRequest> for AlpacaReplaceRequest {
    fn from(request: &SubmitOrderRequest) -> Self {
        Self {
            qty: request.quantity.to_string(),
            time_in_force: time_in_force_str(request.time_in_force),
            limit_price: request.limit_price.map(|p| p.to_string()),
            stop_price: request.stop_price.map(|p| p.to_string()),
            client_order_id: request.client_order_id.as_str().to_string(),
        }
    }
}

const fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

const fn order_type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
        OrderType::Stop => "stop",
        OrderType::StopLimit => "stop_limit",
    }
}

const fn time_in_force_str(tif: TimeInForce) -> &'static str {
    match tif {
        TimeInForce::Day => "day",
        TimeInForce::Gtc => "gtc",
        TimeInForce::Ioc => "ioc",
        TimeInForce::Fok => "fok",
    }
}

// ============================================================================
// Order Response Types
// ============================================================================

/// Order response from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaOrderResponse {
    /// Broker order ID.
    pub id: String,
    /// Client order ID.
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Symbol.
    pub symbol: String,
    /// Filled quantity.
    #[serde(default)]
    pub filled_qty: Option<Decimal>,
    /// Average fill price.
    #[serde(default)]
    pub filled_avg_price: Option<Decimal>,
    /// Order status.
    pub status: String,
}

impl AlpacaOrderResponse {
    /// Convert to `OrderAck`.
    #[must_use]
    pub fn to_order_ack(&self) -> OrderAck {
        OrderAck {
            broker_order_id: BrokerOrderId::new(&self.id),
            client_order_id: self
                .client_order_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .map(ClientOrderId::new),
            symbol: Symbol::new(&self.symbol),
            status: parse_order_status(&self.status),
            filled_quantity: whole_shares(self.filled_qty.unwrap_or_default()),
            average_fill_price: self.filled_avg_price,
        }
    }
}

// ============================================================================
// Account Types
// ============================================================================

/// Account response from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaAccountResponse {
    /// Cash balance.
    pub cash: Decimal,
    /// Buying power.
    pub buying_power: Decimal,
    /// Total portfolio value.
    #[serde(default)]
    pub portfolio_value: Option<Decimal>,
    /// Account equity.
    pub equity: Decimal,
    /// Equity at the previous close.
    #[serde(default)]
    pub last_equity: Option<Decimal>,
}

impl From<AlpacaAccountResponse> for Account {
    fn from(account: AlpacaAccountResponse) -> Self {
        Self {
            cash: account.cash,
            buying_power: account.buying_power,
            portfolio_value: account.portfolio_value.unwrap_or(account.equity),
            equity: account.equity,
            last_equity: account.last_equity,
        }
    }
}

// ============================================================================
// Position Types
// ============================================================================

/// Position response from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaPositionResponse {
    /// Symbol.
    pub symbol: String,
    /// Quantity, negative for shorts.
    pub qty: Decimal,
    /// Side (long/short).
    #[serde(default)]
    pub side: Option<String>,
    /// Average entry price.
    pub avg_entry_price: Decimal,
    /// Market value.
    pub market_value: Decimal,
    /// Current price.
    pub current_price: Decimal,
    /// Unrealized P&L.
    pub unrealized_pl: Decimal,
}

impl From<AlpacaPositionResponse> for Position {
    fn from(position: AlpacaPositionResponse) -> Self {
        let short = position
            .side
            .as_deref()
            .map_or(position.qty.is_sign_negative(), |side| {
                side.eq_ignore_ascii_case("short")
            });
        Self {
            symbol: Symbol::new(position.symbol),
            quantity: whole_shares(position.qty.abs()),
            side: if short {
                PositionSide::Short
            } else {
                PositionSide::Long
            },
            average_entry_price: position.avg_entry_price,
            current_price: position.current_price,
            market_value: position.market_value.abs(),
            unrealized_pnl: position.unrealized_pl,
        }
    }
}

// ============================================================================
// Market Data Types
// ============================================================================

/// Response of `GET /v2/stocks/snapshots`, keyed by symbol.
pub type AlpacaSnapshotsResponse = HashMap<String, Option<AlpacaSnapshot>>;

/// Latest trade, quote and session bar for one symbol.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaSnapshot {
    /// Latest trade.
    #[serde(rename = "latestTrade", default)]
    pub latest_trade: Option<AlpacaTrade>,
    /// Latest quote.
    #[serde(rename = "latestQuote", default)]
    pub latest_quote: Option<AlpacaQuote>,
    /// Today's bar so far.
    #[serde(rename = "dailyBar", default)]
    pub daily_bar: Option<AlpacaBar>,
}

/// One trade print.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaTrade {
    /// Trade time.
    pub t: DateTime<Utc>,
    /// Trade price.
    pub p: Decimal,
}

/// Top of book.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaQuote {
    /// Quote time.
    pub t: DateTime<Utc>,
    /// Bid price.
    pub bp: Decimal,
    /// Ask price.
    pub ap: Decimal,
}

/// One OHLCV bar.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaBar {
    /// Bar start.
    pub t: DateTime<Utc>,
    /// Open.
    pub o: Decimal,
    /// High.
    pub h: Decimal,
    /// Low.
    pub l: Decimal,
    /// Close.
    pub c: Decimal,
    /// Volume.
    pub v: u64,
}

impl From<AlpacaBar> for Bar {
    fn from(bar: AlpacaBar) -> Self {
        Self {
            timestamp: bar.t,
            open: bar.o,
            high: bar.h,
            low: bar.l,
            close: bar.c,
            volume: bar.v,
        }
    }
}

/// Response of `GET /v2/stocks/{symbol}/bars`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaBarsResponse {
    /// Bars; `null` when the window is empty.
    #[serde(default)]
    pub bars: Option<Vec<AlpacaBar>>,
}

impl AlpacaSnapshot {
    /// Collapse into a quote. Without a trade print the mid is used as price.
    #[must_use]
    pub fn into_quote(self, symbol: Symbol) -> Option<MarketQuote> {
        let volume = self.daily_bar.as_ref().map_or(0, |bar| bar.v);
        let (bid, ask, quote_time) = self
            .latest_quote
            .map(|q| (q.bp, q.ap, Some(q.t)))
            .unwrap_or_default();
        let (price, timestamp) = match self.latest_trade {
            Some(trade) => (trade.p, trade.t),
            None if bid > Decimal::ZERO && ask > Decimal::ZERO => {
                ((bid + ask) / Decimal::TWO, quote_time.unwrap_or_else(Utc::now))
            }
            None => return None,
        };
        if price <= Decimal::ZERO {
            return None;
        }
        Some(MarketQuote {
            symbol,
            price,
            bid: if bid > Decimal::ZERO { bid } else { price },
            ask: if ask > Decimal::ZERO { ask } else { price },
            volume,
            timestamp,
        })
    }
}

/// Query-string value for a bar timeframe.
#[must_use]
pub const fn timeframe_param(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneMinute => "1Min",
        Timeframe::FiveMinutes => "5Min",
        Timeframe::OneHour => "1Hour",
        Timeframe::OneDay => "1Day",
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error response from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaErrorResponse {
    /// Error code.
    #[serde(default)]
    pub code: Option<u64>,
    /// Error message.
    pub message: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse Alpaca order status string to domain `OrderStatus`.
fn parse_order_status(status: &str) -> OrderStatus {
    match status.to_ascii_lowercase().as_str() {
        "partially_filled" => OrderStatus::PartiallyFilled,
        "filled" => OrderStatus::Filled,
        "done_for_day" | "expired" => OrderStatus::Expired,
        "canceled" | "replaced" => OrderStatus::Cancelled,
        "rejected" | "suspended" => OrderStatus::Rejected,
        // new, accepted, pending_*, held, stopped, calculated and anything unknown
        _ => OrderStatus::Submitted,
    }
}

fn whole_shares(quantity: Decimal) -> u64 {
    quantity.trunc().to_u64().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case("new", OrderStatus::Submitted)]
    #[test_case("accepted", OrderStatus::Submitted)]
    #[test_case("pending_new", OrderStatus::Submitted)]
    #[test_case("pending_cancel", OrderStatus::Submitted)]
    #[test_case("partially_filled", OrderStatus::PartiallyFilled)]
    #[test_case("filled", OrderStatus::Filled)]
    #[test_case("canceled", OrderStatus::Cancelled)]
    #[test_case("replaced", OrderStatus::Cancelled)]
    #[test_case("expired", OrderStatus::Expired)]
    #[test_case("done_for_day", OrderStatus::Expired)]
    #[test_case("rejected", OrderStatus::Rejected)]
    fn status_mapping(raw: &str, expected: OrderStatus) {
        assert_eq!(parse_order_status(raw), expected);
    }

    #[test]
    fn stop_request_serializes_without_limit() {
        let request = SubmitOrderRequest::stop(
            ClientOrderId::new("BRACKET_SL_1"),
            Symbol::new("AAPL"),
            OrderSide::Sell,
            100,
            dec!(145.50),
        )
        .with_time_in_force(TimeInForce::Gtc);

        let json = serde_json::to_value(AlpacaOrderRequest::from(&request)).unwrap();
        assert_eq!(json["type"], "stop");
        assert_eq!(json["side"], "sell");
        assert_eq!(json["time_in_force"], "gtc");
        assert_eq!(json["qty"], "100");
        assert_eq!(json["stop_price"], "145.50");
        assert!(json.get("limit_price").is_none());
    }

    #[test]
    fn order_response_to_ack() {
        let response: AlpacaOrderResponse = serde_json::from_str(
            r#"{"id":"broker-123","client_order_id":"ICEBERG_1","symbol":"aapl",
                "qty":"100","filled_qty":"50","filled_avg_price":"150.25",
                "status":"partially_filled","side":"buy","type":"limit"}"#,
        )
        .unwrap();

        let ack = response.to_order_ack();
        assert_eq!(ack.broker_order_id.as_str(), "broker-123");
        assert_eq!(ack.client_order_id, Some(ClientOrderId::new("ICEBERG_1")));
        assert_eq!(ack.symbol, Symbol::new("AAPL"));
        assert_eq!(ack.status, OrderStatus::PartiallyFilled);
        assert_eq!(ack.filled_quantity, 50);
        assert_eq!(ack.average_fill_price, Some(dec!(150.25)));
    }

    #[test]
    fn short_position_is_absolute() {
        let position: AlpacaPositionResponse = serde_json::from_str(
            r#"{"symbol":"TSLA","qty":"-20","side":"short","avg_entry_price":"250",
                "market_value":"-4800","current_price":"240","unrealized_pl":"200"}"#,
        )
        .unwrap();

        let position = Position::from(position);
        assert_eq!(position.quantity, 20);
        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.market_value, dec!(4800));
    }

    #[test]
    fn account_without_portfolio_value_uses_equity() {
        let account: AlpacaAccountResponse = serde_json::from_str(
            r#"{"cash":"1000","buying_power":"2000","equity":"5000","last_equity":"4900"}"#,
        )
        .unwrap();

        let account = Account::from(account);
        assert_eq!(account.portfolio_value, dec!(5000));
        assert_eq!(account.last_equity, Some(dec!(4900)));
    }

    #[test]
    fn snapshot_prefers_trade_price() {
        let snapshot: AlpacaSnapshot = serde_json::from_str(
            r#"{"latestTrade":{"t":"2024-01-15T15:00:00Z","p":101.5},
                "latestQuote":{"t":"2024-01-15T15:00:00Z","bp":101.4,"ap":101.6},
                "dailyBar":{"t":"2024-01-15T05:00:00Z","o":100,"h":102,"l":99,"c":101.5,"v":12000}}"#,
        )
        .unwrap();

        let quote = snapshot.into_quote(Symbol::new("AAPL")).unwrap();
        assert_eq!(quote.price, dec!(101.5));
        assert_eq!(quote.bid, dec!(101.4));
        assert_eq!(quote.volume, 12000);
    }

    #[test]
    fn snapshot_without_trade_uses_mid() {
        let snapshot: AlpacaSnapshot = serde_json::from_str(
            r#"{"latestQuote":{"t":"2024-01-15T15:00:00Z","bp":10,"ap":10.2}}"#,
        )
        .unwrap();
        assert_eq!(
            snapshot.into_quote(Symbol::new("X")).unwrap().price,
            dec!(10.1)
        );
    }

    #[test]
    fn empty_snapshot_has_no_quote() {
        let snapshot: AlpacaSnapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.into_quote(Symbol::new("X")).is_none());
    }
}
