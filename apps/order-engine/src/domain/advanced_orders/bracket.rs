//! Bracket orders: a limit entry protected by a stop loss and one or two
//! take-profit targets once the entry fills.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::{OrderError, require_price, require_quantity};
use super::value_objects::{LegState, OrderSide, OrderStatus, OrderType};
use crate::domain::shared::{BrokerOrderId, OrderId, Symbol};

/// Parameters for a new bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketRequest {
    /// Instrument.
    pub symbol: Symbol,
    /// Entry side; `Buy` opens a long.
    pub side: OrderSide,
    /// Shares to enter.
    pub quantity: u64,
    /// Limit price of the entry.
    pub entry_price: Decimal,
    /// Protective stop.
    pub stop_loss: Decimal,
    /// First target.
    pub take_profit_1: Decimal,
    /// Optional second target.
    pub take_profit_2: Option<Decimal>,
}

impl BracketRequest {
    /// Bracket with a single target.
    #[must_use]
    pub fn new(
        symbol: impl Into<Symbol>,
        side: OrderSide,
        quantity: u64,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit_1: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            entry_price,
            stop_loss,
            take_profit_1,
            take_profit_2: None,
        }
    }

    /// Add a second target.
    #[must_use]
    pub const fn with_second_target(mut self, take_profit_2: Decimal) -> Self {
        self.take_profit_2 = Some(take_profit_2);
        self
    }

    /// Check quantities and the stop/entry/target ordering for the side.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.symbol.is_empty() {
            return Err(OrderError::EmptySymbol);
        }
        require_quantity("quantity", self.quantity)?;
        require_price("entry price", self.entry_price)?;
        require_price("stop loss", self.stop_loss)?;
        require_price("take profit 1", self.take_profit_1)?;
        if let Some(tp2) = self.take_profit_2 {
            require_price("take profit 2", tp2)?;
        }

        let targets = std::iter::once(self.take_profit_1).chain(self.take_profit_2);
        match self.side {
            OrderSide::Buy => {
                if self.stop_loss >= self.entry_price {
                    return Err(ordering("stop loss must be below entry for a long"));
                }
                if targets.into_iter().any(|tp| tp <= self.entry_price) {
                    return Err(ordering("take profit must be above entry for a long"));
                }
            }
            OrderSide::Sell => {
                if self.stop_loss <= self.entry_price {
                    return Err(ordering("stop loss must be above entry for a short"));
                }
                if targets.into_iter().any(|tp| tp >= self.entry_price) {
                    return Err(ordering("take profit must be below entry for a short"));
                }
            }
        }
        Ok(())
    }
}

fn ordering(reason: &str) -> OrderError {
    OrderError::InvalidPriceOrdering {
        reason: reason.to_string(),
    }
}

/// Which protective leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitLegKind {
    /// Stop loss (STOP order).
    StopLoss,
    /// First target (LIMIT order).
    TakeProfit1,
    /// Second target (LIMIT order).
    TakeProfit2,
}

impl ExitLegKind {
    /// Client order id prefix for this leg.
    #[must_use]
    pub const fn client_prefix(&self) -> &'static str {
        match self {
            Self::StopLoss => "BRACKET_SL",
            Self::TakeProfit1 => "BRACKET_TP1",
            Self::TakeProfit2 => "BRACKET_TP2",
        }
    }

    /// Broker order type for this leg.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        match self {
            Self::StopLoss => OrderType::Stop,
            Self::TakeProfit1 | Self::TakeProfit2 => OrderType::Limit,
        }
    }
}

/// One protective leg and its broker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitLeg {
    /// Leg kind.
    pub kind: ExitLegKind,
    /// Most recent broker id for this leg.
    pub order_id: Option<BrokerOrderId>,
    /// Stop or limit price.
    pub price: Decimal,
    /// Shares covered by the leg.
    pub quantity: u64,
    /// Working at the broker.
    pub live: bool,
    /// Completely filled.
    pub filled: bool,
}

impl ExitLeg {
    const fn new(kind: ExitLegKind, price: Decimal, quantity: u64) -> Self {
        Self {
            kind,
            order_id: None,
            price,
            quantity,
            live: false,
            filled: false,
        }
    }
}

/// Where the bracket is after its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitPhase {
    /// Entry still working.
    AwaitingEntry,
    /// Entry filled, at least one exit leg missing.
    Unprotected,
    /// All exit legs working.
    Protected,
    /// Stop loss filled.
    StoppedOut,
    /// Every target filled.
    TargetReached,
    /// Exits cancelled on request with the position still open.
    Withdrawn,
}

/// Result of applying a broker update to the entry leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryProgress {
    /// Nothing new.
    Unchanged,
    /// More shares filled, entry still working.
    PartiallyFilled,
    /// Entry done; exit legs must now be placed.
    Filled,
    /// Entry died without any fill.
    Ended(OrderStatus),
}

/// Result of applying a broker update to an exit leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Nothing to do.
    Holding,
    /// One target filled, another still working.
    TargetPartiallyHit,
    /// Position closed; these sibling legs must be cancelled.
    Closed {
        /// Legs still live at the broker.
        cancel: Vec<BrokerOrderId>,
    },
    /// The leg died at the broker and must be placed again.
    Lost(ExitLegKind),
}

/// A limit entry with a stop loss and one or two targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketOrder {
    id: OrderId,
    symbol: Symbol,
    side: OrderSide,
    quantity: u64,
    entry_price: Decimal,
    stop_loss: Decimal,
    take_profit_1: Decimal,
    take_profit_2: Option<Decimal>,
    entry_order_id: Option<BrokerOrderId>,
    exits: Vec<ExitLeg>,
    status: OrderStatus,
    exit_phase: ExitPhase,
    filled_quantity: u64,
    average_fill_price: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BracketOrder {
    /// New bracket in `Pending`.
    #[must_use]
    pub fn new(id: OrderId, request: &BracketRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            entry_price: request.entry_price,
            stop_loss: request.stop_loss,
            take_profit_1: request.take_profit_1,
            take_profit_2: request.take_profit_2,
            entry_order_id: None,
            exits: Vec::new(),
            status: OrderStatus::Pending,
            exit_phase: ExitPhase::AwaitingEntry,
            filled_quantity: 0,
            average_fill_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the accepted entry.
    pub fn mark_submitted(
        &mut self,
        entry_order_id: BrokerOrderId,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.advance(OrderStatus::Submitted) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Submitted,
            });
        }
        self.entry_order_id = Some(entry_order_id);
        self.updated_at = now;
        Ok(())
    }

    /// Apply the broker's view of the entry leg.
    ///
    /// An entry that dies after a partial fill counts as filled for the
    /// shares it got, so those shares still receive exits.
    pub fn apply_entry_update(&mut self, leg: &LegState, now: DateTime<Utc>) -> EntryProgress {
        if self.exit_phase != ExitPhase::AwaitingEntry || self.status.is_terminal() {
            return EntryProgress::Unchanged;
        }

        let progress = match leg.status {
            OrderStatus::Filled => {
                let filled = if leg.filled_quantity == 0 {
                    self.quantity
                } else {
                    leg.filled_quantity.min(self.quantity)
                };
                self.fill_entry(filled, leg.average_fill_price)
            }
            OrderStatus::PartiallyFilled => {
                if leg.filled_quantity == self.filled_quantity
                    && self.status == OrderStatus::PartiallyFilled
                {
                    return EntryProgress::Unchanged;
                }
                self.status.advance(OrderStatus::PartiallyFilled);
                self.filled_quantity = leg.filled_quantity.min(self.quantity);
                self.average_fill_price = leg.average_fill_price.or(self.average_fill_price);
                EntryProgress::PartiallyFilled
            }
            OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired => {
                if leg.filled_quantity > 0 {
                    self.fill_entry(
                        leg.filled_quantity.min(self.quantity),
                        leg.average_fill_price.or(self.average_fill_price),
                    )
                } else if self.status.advance(leg.status) {
                    EntryProgress::Ended(leg.status)
                } else if self.status.advance(OrderStatus::Cancelled) {
                    EntryProgress::Ended(OrderStatus::Cancelled)
                } else {
                    return EntryProgress::Unchanged;
                }
            }
            OrderStatus::Pending | OrderStatus::Submitted => return EntryProgress::Unchanged,
        };
        self.updated_at = now;
        progress
    }

    fn fill_entry(&mut self, filled: u64, price: Option<Decimal>) -> EntryProgress {
        self.status.advance(OrderStatus::Filled);
        self.filled_quantity = filled;
        self.average_fill_price = price.or(Some(self.entry_price));
        self.exit_phase = ExitPhase::Unprotected;
        self.exits = self.plan_exits(filled);
        EntryProgress::Filled
    }

    /// Stop for the full position plus targets; two targets split the
    /// position `ceil(q/2)` / remainder.
    fn plan_exits(&self, position: u64) -> Vec<ExitLeg> {
        let mut exits = vec![ExitLeg::new(ExitLegKind::StopLoss, self.stop_loss, position)];
        match self.take_profit_2 {
            Some(tp2) if position >= 2 => {
                let first = position.div_ceil(2);
                exits.push(ExitLeg::new(ExitLegKind::TakeProfit1, self.take_profit_1, first));
                exits.push(ExitLeg::new(ExitLegKind::TakeProfit2, tp2, position - first));
            }
            _ => exits.push(ExitLeg::new(
                ExitLegKind::TakeProfit1,
                self.take_profit_1,
                position,
            )),
        }
        exits
    }

    /// Exit legs that must be (re)placed, with the quantity to place.
    #[must_use]
    pub fn pending_exits(&self) -> Vec<ExitLeg> {
        if self.exit_phase != ExitPhase::Unprotected {
            return Vec::new();
        }
        let open = self.open_quantity();
        self.exits
            .iter()
            .filter(|leg| !leg.live && !leg.filled)
            .map(|leg| {
                let mut leg = leg.clone();
                if leg.kind == ExitLegKind::StopLoss {
                    leg.quantity = open;
                }
                leg
            })
            .collect()
    }

    /// Record a placed exit leg. Moves to `Protected` once every
    /// unfilled leg is working.
    pub fn record_exit_placed(
        &mut self,
        kind: ExitLegKind,
        order_id: BrokerOrderId,
        quantity: u64,
        now: DateTime<Utc>,
    ) {
        if let Some(leg) = self.exits.iter_mut().find(|leg| leg.kind == kind) {
            leg.order_id = Some(order_id);
            leg.quantity = quantity;
            leg.live = true;
        }
        if self.exit_phase == ExitPhase::Unprotected
            && self.exits.iter().all(|leg| leg.live || leg.filled)
        {
            self.exit_phase = ExitPhase::Protected;
        }
        self.updated_at = now;
    }

    /// Live exit legs to poll.
    #[must_use]
    pub fn live_exits(&self) -> Vec<(ExitLegKind, BrokerOrderId)> {
        self.exits
            .iter()
            .filter(|leg| leg.live)
            .filter_map(|leg| leg.order_id.clone().map(|id| (leg.kind, id)))
            .collect()
    }

    /// Apply the broker's view of one exit leg.
    pub fn apply_exit_update(
        &mut self,
        kind: ExitLegKind,
        leg_state: &LegState,
        now: DateTime<Utc>,
    ) -> ExitOutcome {
        let Some(index) = self
            .exits
            .iter()
            .position(|leg| leg.kind == kind && leg.live)
        else {
            return ExitOutcome::Holding;
        };

        let outcome = match leg_state.status {
            OrderStatus::Filled => {
                self.exits[index].live = false;
                self.exits[index].filled = true;
                if kind == ExitLegKind::StopLoss {
                    self.exit_phase = ExitPhase::StoppedOut;
                    ExitOutcome::Closed {
                        cancel: self.retire_live_exits(),
                    }
                } else if self
                    .exits
                    .iter()
                    .any(|leg| leg.kind != ExitLegKind::StopLoss && !leg.filled)
                {
                    ExitOutcome::TargetPartiallyHit
                } else {
                    self.exit_phase = ExitPhase::TargetReached;
                    ExitOutcome::Closed {
                        cancel: self.retire_live_exits(),
                    }
                }
            }
            OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired => {
                self.exits[index].live = false;
                self.exit_phase = ExitPhase::Unprotected;
                ExitOutcome::Lost(kind)
            }
            OrderStatus::Pending | OrderStatus::Submitted | OrderStatus::PartiallyFilled => {
                return ExitOutcome::Holding;
            }
        };
        self.updated_at = now;
        outcome
    }

    fn retire_live_exits(&mut self) -> Vec<BrokerOrderId> {
        self.exits
            .iter_mut()
            .filter(|leg| leg.live)
            .filter_map(|leg| {
                leg.live = false;
                leg.order_id.clone()
            })
            .collect()
    }

    /// Shares still held: fill minus filled targets.
    #[must_use]
    pub fn open_quantity(&self) -> u64 {
        let exited: u64 = self
            .exits
            .iter()
            .filter(|leg| leg.filled && leg.kind != ExitLegKind::StopLoss)
            .map(|leg| leg.quantity)
            .sum();
        self.filled_quantity.saturating_sub(exited)
    }

    /// Working stop whose size no longer matches the open position.
    #[must_use]
    pub fn stop_resize(&self) -> Option<(BrokerOrderId, u64)> {
        if self.exit_phase != ExitPhase::Protected {
            return None;
        }
        let open = self.open_quantity();
        self.exits
            .iter()
            .find(|leg| leg.kind == ExitLegKind::StopLoss && leg.live && leg.quantity != open)
            .and_then(|leg| leg.order_id.clone().map(|id| (id, open)))
    }

    /// Every broker leg that may still be working.
    #[must_use]
    pub fn live_broker_order_ids(&self) -> Vec<BrokerOrderId> {
        let mut ids = Vec::new();
        if !self.status.is_terminal() {
            ids.extend(self.entry_order_id.clone());
        }
        ids.extend(self.live_exits().into_iter().map(|(_, id)| id));
        ids
    }

    /// Cancel on request. A filled bracket keeps `Filled` and withdraws
    /// its exits.
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        if self.status == OrderStatus::Filled {
            self.retire_live_exits();
            self.exit_phase = ExitPhase::Withdrawn;
        } else {
            self.status.advance(OrderStatus::Cancelled);
        }
        self.updated_at = now;
    }

    /// Nothing left to supervise.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        match self.status {
            OrderStatus::Filled => matches!(
                self.exit_phase,
                ExitPhase::StoppedOut | ExitPhase::TargetReached | ExitPhase::Withdrawn
            ),
            status => status.is_terminal(),
        }
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

    /// Entry side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Requested shares.
    #[must_use]
    pub const fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Entry limit price.
    #[must_use]
    pub const fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    /// Stop loss price.
    #[must_use]
    pub const fn stop_loss(&self) -> Decimal {
        self.stop_loss
    }

    /// First target.
    #[must_use]
    pub const fn take_profit_1(&self) -> Decimal {
        self.take_profit_1
    }

    /// Second target.
    #[must_use]
    pub const fn take_profit_2(&self) -> Option<Decimal> {
        self.take_profit_2
    }

    /// Entry leg broker id.
    #[must_use]
    pub const fn entry_order_id(&self) -> Option<&BrokerOrderId> {
        self.entry_order_id.as_ref()
    }

    fn exit_order_id(&self, kind: ExitLegKind) -> Option<&BrokerOrderId> {
        self.exits
            .iter()
            .find(|leg| leg.kind == kind)
            .and_then(|leg| leg.order_id.as_ref())
    }

    /// Stop loss leg broker id.
    #[must_use]
    pub fn stop_loss_order_id(&self) -> Option<&BrokerOrderId> {
        self.exit_order_id(ExitLegKind::StopLoss)
    }

    /// First target broker id.
    #[must_use]
    pub fn take_profit_1_order_id(&self) -> Option<&BrokerOrderId> {
        self.exit_order_id(ExitLegKind::TakeProfit1)
    }

    /// Second target broker id.
    #[must_use]
    pub fn take_profit_2_order_id(&self) -> Option<&BrokerOrderId> {
        self.exit_order_id(ExitLegKind::TakeProfit2)
    }

    /// All exit legs.
    #[must_use]
    pub fn exits(&self) -> &[ExitLeg] {
        &self.exits
    }

    /// Lifecycle status of the entry.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Exit phase.
    #[must_use]
    pub const fn exit_phase(&self) -> ExitPhase {
        self.exit_phase
    }

    /// Entry shares filled.
    #[must_use]
    pub const fn filled_quantity(&self) -> u64 {
        self.filled_quantity
    }

    /// Average entry fill.
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
