//! Trailing stops: a protective stop that ratchets behind favourable
//! price moves and never loosens.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::{OrderError, require_price, require_quantity};
use super::value_objects::{LegState, OrderSide, OrderStatus};
use crate::domain::shared::{BrokerOrderId, OrderId, Symbol};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Parameters for a new trailing stop.
///
/// `side` is the side of the protected position; the stop order itself is
/// placed on the opposite side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingStopRequest {
    /// Instrument.
    pub symbol: Symbol,
    /// Position side (`Buy` = long).
    pub side: OrderSide,
    /// Shares protected.
    pub quantity: u64,
    /// Fixed trail distance.
    pub trail_amount: Decimal,
    /// Trail as a percent of price (`2.5` = 2.5%). Overrides `trail_amount`.
    pub trail_percent: Option<Decimal>,
}

impl TrailingStopRequest {
    /// Trailing stop with a fixed distance.
    #[must_use]
    pub fn new(
        symbol: impl Into<Symbol>,
        side: OrderSide,
        quantity: u64,
        trail_amount: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            trail_amount,
            trail_percent: None,
        }
    }

    /// Trail by a percent of the current price instead.
    #[must_use]
    pub const fn with_trail_percent(mut self, percent: Decimal) -> Self {
        self.trail_percent = Some(percent);
        self
    }

    /// Positive quantity and a usable trail.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.symbol.is_empty() {
            return Err(OrderError::EmptySymbol);
        }
        require_quantity("quantity", self.quantity)?;
        let usable = match self.trail_percent {
            Some(percent) => percent > Decimal::ZERO && percent < HUNDRED,
            None => self.trail_amount > Decimal::ZERO,
        };
        if !usable {
            return Err(OrderError::InvalidTrail);
        }
        Ok(())
    }

    /// Distance between `price` and the stop.
    #[must_use]
    pub fn trail_distance(&self, price: Decimal) -> Decimal {
        trail_distance(self.trail_amount, self.trail_percent, price)
    }

    /// Stop one trail away from `price`, below for a long.
    #[must_use]
    pub fn initial_stop(&self, price: Decimal) -> Decimal {
        match self.side {
            OrderSide::Buy => price - self.trail_distance(price),
            OrderSide::Sell => price + self.trail_distance(price),
        }
    }
}

fn trail_distance(amount: Decimal, percent: Option<Decimal>, price: Decimal) -> Decimal {
    match percent {
        Some(percent) => price * percent / HUNDRED,
        None => amount,
    }
}

/// A stop that follows the best price seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingStopOrder {
    id: OrderId,
    symbol: Symbol,
    side: OrderSide,
    quantity: u64,
    trail_amount: Decimal,
    trail_percent: Option<Decimal>,
    current_stop_price: Decimal,
    broker_stop_price: Decimal,
    highest_price_seen: Option<Decimal>,
    lowest_price_seen: Option<Decimal>,
    stop_order_id: Option<BrokerOrderId>,
    replacing: bool,
    ratchet_count: u32,
    status: OrderStatus,
    filled_quantity: u64,
    average_fill_price: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TrailingStopOrder {
    /// New trailing stop anchored at `reference_price`.
    pub fn new(
        id: OrderId,
        request: &TrailingStopRequest,
        reference_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        require_price("reference price", reference_price)?;
        let stop = request.initial_stop(reference_price);
        require_price("initial stop", stop)?;
        let (highest, lowest) = match request.side {
            OrderSide::Buy => (Some(reference_price), None),
            OrderSide::Sell => (None, Some(reference_price)),
        };
        Ok(Self {
            id,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            trail_amount: request.trail_amount,
            trail_percent: request.trail_percent,
            current_stop_price: stop,
            broker_stop_price: stop,
            highest_price_seen: highest,
            lowest_price_seen: lowest,
            stop_order_id: None,
            replacing: false,
            ratchet_count: 0,
            status: OrderStatus::Pending,
            filled_quantity: 0,
            average_fill_price: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Record the accepted stop order.
    pub fn mark_submitted(
        &mut self,
        stop_order_id: BrokerOrderId,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.advance(OrderStatus::Submitted) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Submitted,
            });
        }
        self.stop_order_id = Some(stop_order_id);
        self.updated_at = now;
        Ok(())
    }

    /// Feed a market price. Returns the new stop when it ratchets.
    ///
    /// Only a new high (long) or new low (short) can move the stop, and
    /// only in the protective direction.
    pub fn observe_price(&mut self, price: Decimal, now: DateTime<Utc>) -> Option<Decimal> {
        if self.status.is_terminal() || price <= Decimal::ZERO {
            return None;
        }
        let distance = trail_distance(self.trail_amount, self.trail_percent, price);
        let candidate = match self.side {
            OrderSide::Buy => {
                if self.highest_price_seen.is_some_and(|high| price <= high) {
                    return None;
                }
                self.highest_price_seen = Some(price);
                let candidate = price - distance;
                (candidate > self.current_stop_price).then_some(candidate)
            }
            OrderSide::Sell => {
                if self.lowest_price_seen.is_some_and(|low| price >= low) {
                    return None;
                }
                self.lowest_price_seen = Some(price);
                let candidate = price + distance;
                (candidate < self.current_stop_price).then_some(candidate)
            }
        };
        self.updated_at = now;
        let stop = candidate?;
        self.current_stop_price = stop;
        self.ratchet_count += 1;
        Some(stop)
    }

    /// Broker stop lags the local stop.
    #[must_use]
    pub fn needs_amend(&self) -> bool {
        self.status.is_working()
            && self.stop_order_id.is_some()
            && self.current_stop_price != self.broker_stop_price
    }

    /// Working order with no stop at the broker. The stop must be placed
    /// again before anything else.
    #[must_use]
    pub const fn needs_stop(&self) -> bool {
        self.status.is_working() && self.stop_order_id.is_none()
    }

    /// Shares the stop still has to cover.
    #[must_use]
    pub const fn open_quantity(&self) -> u64 {
        self.quantity.saturating_sub(self.filled_quantity)
    }

    /// Mark the broker stop as being replaced by the engine.
    ///
    /// Until the replacement is recorded, a cancelled stop leg means the
    /// engine withdrew it, not that the order ended.
    pub const fn begin_replace(&mut self) {
        self.replacing = true;
    }

    /// Stop was withdrawn by a replace that did not complete.
    #[must_use]
    pub const fn is_replacing(&self) -> bool {
        self.replacing
    }

    /// Record a successful amend or re-placement of the broker stop.
    pub fn record_amended(
        &mut self,
        stop_order_id: BrokerOrderId,
        stop_price: Decimal,
        now: DateTime<Utc>,
    ) {
        self.stop_order_id = Some(stop_order_id);
        self.broker_stop_price = stop_price;
        self.replacing = false;
        self.updated_at = now;
    }

    /// Apply the broker's view of the stop. Returns the new status when it
    /// changed.
    ///
    /// A stop the engine cancelled during a failed replace does not end the
    /// order: any partial fill is kept, the stop id is dropped and
    /// `needs_stop` turns true.
    pub fn apply_stop_update(&mut self, leg: &LegState, now: DateTime<Utc>) -> Option<OrderStatus> {
        if self.status.is_terminal() {
            return None;
        }
        if self.replacing {
            match leg.status {
                OrderStatus::Cancelled => {
                    self.filled_quantity = self.filled_quantity.max(leg.filled_quantity);
                    if leg.average_fill_price.is_some() {
                        self.average_fill_price = leg.average_fill_price;
                    }
                    self.stop_order_id = None;
                    self.replacing = false;
                    self.updated_at = now;
                    if self.filled_quantity >= self.quantity {
                        self.status.advance(OrderStatus::Filled);
                        return Some(self.status);
                    }
                    if self.filled_quantity > 0 && self.status != OrderStatus::PartiallyFilled {
                        self.status.advance(OrderStatus::PartiallyFilled);
                        return Some(self.status);
                    }
                    return None;
                }
                OrderStatus::Pending | OrderStatus::Submitted | OrderStatus::PartiallyFilled => {
                    self.replacing = false;
                }
                OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Expired => {}
            }
        }
        let changed = match leg.status {
            OrderStatus::Filled => {
                self.filled_quantity = if leg.filled_quantity == 0 {
                    self.quantity
                } else {
                    leg.filled_quantity
                };
                self.average_fill_price = leg.average_fill_price;
                self.status.advance(OrderStatus::Filled)
            }
            OrderStatus::PartiallyFilled => {
                self.filled_quantity = leg.filled_quantity;
                self.average_fill_price = leg.average_fill_price;
                self.status != OrderStatus::PartiallyFilled
                    && self.status.advance(OrderStatus::PartiallyFilled)
            }
            OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired => {
                self.status.advance(leg.status) || self.status.advance(OrderStatus::Cancelled)
            }
            OrderStatus::Pending | OrderStatus::Submitted => false,
        };
        if changed {
            self.updated_at = now;
            Some(self.status)
        } else {
            None
        }
    }

    /// Working stop, if any.
    #[must_use]
    pub fn live_broker_order_ids(&self) -> Vec<BrokerOrderId> {
        if self.status.is_terminal() {
            return Vec::new();
        }
        self.stop_order_id.iter().cloned().collect()
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

    /// Position side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Shares protected.
    #[must_use]
    pub const fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Fixed trail distance.
    #[must_use]
    pub const fn trail_amount(&self) -> Decimal {
        self.trail_amount
    }

    /// Percent trail, when used.
    #[must_use]
    pub const fn trail_percent(&self) -> Option<Decimal> {
        self.trail_percent
    }

    /// Local stop.
    #[must_use]
    pub const fn current_stop_price(&self) -> Decimal {
        self.current_stop_price
    }

    /// Stop last confirmed at the broker.
    #[must_use]
    pub const fn broker_stop_price(&self) -> Decimal {
        self.broker_stop_price
    }

    /// Highest price seen (long).
    #[must_use]
    pub const fn highest_price_seen(&self) -> Option<Decimal> {
        self.highest_price_seen
    }

    /// Lowest price seen (short).
    #[must_use]
    pub const fn lowest_price_seen(&self) -> Option<Decimal> {
        self.lowest_price_seen
    }

    /// Broker id of the working stop.
    #[must_use]
    pub const fn stop_order_id(&self) -> Option<&BrokerOrderId> {
        self.stop_order_id.as_ref()
    }

    /// Times the stop moved.
    #[must_use]
    pub const fn ratchet_count(&self) -> u32 {
        self.ratchet_count
    }

    /// Lifecycle status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Shares filled by the stop.
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long(trail: Decimal, price: Decimal) -> TrailingStopOrder {
        let request = TrailingStopRequest::new("TSLA", OrderSide::Buy, 100, trail);
        let mut order =
            TrailingStopOrder::new(OrderId::new("TRAILING_1"), &request, price, Utc::now())
                .unwrap();
        order
            .mark_submitted(BrokerOrderId::new("stop"), Utc::now())
            .unwrap();
        order
    }

    #[test]
    fn long_stop_ratchets_on_new_highs_only() {
        let mut order = long(dec!(5), dec!(100));
        assert_eq!(order.current_stop_price(), dec!(95));

        assert_eq!(order.observe_price(dec!(110), Utc::now()), Some(dec!(105)));
        assert_eq!(order.observe_price(dec!(108), Utc::now()), None);
        assert_eq!(order.current_stop_price(), dec!(105));
        assert_eq!(order.observe_price(dec!(112), Utc::now()), Some(dec!(107)));
        assert_eq!(order.ratchet_count(), 2);
        assert!(order.needs_amend());
    }

    #[test]
    fn short_stop_ratchets_down() {
        let request = TrailingStopRequest::new("TSLA", OrderSide::Sell, 10, dec!(2));
        let mut order =
            TrailingStopOrder::new(OrderId::new("TRAILING_2"), &request, dec!(50), Utc::now())
                .unwrap();
        assert_eq!(order.current_stop_price(), dec!(52));
        assert_eq!(order.observe_price(dec!(45), Utc::now()), Some(dec!(47)));
        assert_eq!(order.observe_price(dec!(49), Utc::now()), None);
        assert_eq!(order.lowest_price_seen(), Some(dec!(45)));
    }

    #[test]
    fn percent_trail_overrides_amount() {
        let request =
            TrailingStopRequest::new("TSLA", OrderSide::Buy, 1, dec!(50)).with_trail_percent(dec!(2));
        assert_eq!(request.initial_stop(dec!(200)), dec!(196));
    }

    #[test]
    fn stop_at_or_below_zero_is_rejected() {
        let request = TrailingStopRequest::new("PENNY", OrderSide::Buy, 1, dec!(5));
        let result =
            TrailingStopOrder::new(OrderId::new("TRAILING_3"), &request, dec!(4), Utc::now());
        assert!(matches!(result, Err(OrderError::NonPositivePrice { .. })));
    }

    #[test]
    fn validate_rejects_bad_trail() {
        let request = TrailingStopRequest::new("TSLA", OrderSide::Buy, 1, dec!(0));
        assert_eq!(request.validate(), Err(OrderError::InvalidTrail));
        let request = request.with_trail_percent(dec!(100));
        assert_eq!(request.validate(), Err(OrderError::InvalidTrail));
    }

    #[test]
    fn amend_clears_lag() {
        let mut order = long(dec!(5), dec!(100));
        order.observe_price(dec!(110), Utc::now());
        order.record_amended(BrokerOrderId::new("stop-2"), dec!(105), Utc::now());
        assert!(!order.needs_amend());
        assert_eq!(order.stop_order_id(), Some(&BrokerOrderId::new("stop-2")));
    }

    #[test]
    fn fill_settles_order() {
        let mut order = long(dec!(5), dec!(100));
        let status = order.apply_stop_update(&LegState::filled(100, dec!(95)), Utc::now());
        assert_eq!(status, Some(OrderStatus::Filled));
        assert!(order.is_settled());
        assert_eq!(order.observe_price(dec!(200), Utc::now()), None);
    }

    #[test]
    fn stop_withdrawn_by_replace_is_placed_again() {
        let mut order = long(dec!(5), dec!(100));
        order.observe_price(dec!(110), Utc::now());
        order.begin_replace();

        let status = order.apply_stop_update(
            &LegState::with_status(OrderStatus::Cancelled),
            Utc::now(),
        );
        assert_eq!(status, None);
        assert_eq!(order.status(), OrderStatus::Submitted);
        assert!(order.needs_stop());
        assert!(!order.needs_amend());

        order.record_amended(BrokerOrderId::new("stop-2"), dec!(105), Utc::now());
        assert!(!order.needs_stop());
        assert!(!order.is_replacing());
    }

    #[test]
    fn outside_cancel_still_ends_the_order() {
        let mut order = long(dec!(5), dec!(100));
        let status = order.apply_stop_update(
            &LegState::with_status(OrderStatus::Cancelled),
            Utc::now(),
        );
        assert_eq!(status, Some(OrderStatus::Cancelled));
        assert!(order.is_settled());
    }

    #[test]
    fn live_stop_after_failed_replace_keeps_working() {
        let mut order = long(dec!(5), dec!(100));
        order.observe_price(dec!(110), Utc::now());
        order.begin_replace();

        order.apply_stop_update(&LegState::with_status(OrderStatus::Submitted), Utc::now());
        assert!(!order.is_replacing());
        assert!(order.needs_amend());
        assert_eq!(order.stop_order_id(), Some(&BrokerOrderId::new("stop")));
    }
}
