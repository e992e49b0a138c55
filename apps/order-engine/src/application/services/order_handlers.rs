//! Per-variant update handlers run by the order monitor.
//!
//! Each handler polls the broker legs of one order, feeds the snapshots to
//! the order's state machine and carries out the broker actions it asks
//! for. Handlers hold the order's lock for the whole update, so a
//! concurrent `cancel` waits for them.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::order_engine::{
    AdvancedOrderEngine, ICEBERG_NEXT_SLICE, slice_request, trailing_stop_request,
};
use super::order_registry::OrderHandle;
use crate::application::ports::{
    BrokerError, BrokerPort, MarketDataError, MarketDataPort, MarketQuote, SubmitOrderRequest,
};
use crate::broker::retry_transient;
use crate::domain::advanced_orders::{
    AdvancedOrder, BracketOrder, EngineEvent, EntryProgress, ExitLeg, ExitLegKind, ExitOutcome,
    ExitPhase, IcebergOrder, LegState, OcoOrder, OcoProgress, OrderType, SliceProgress,
    TimeInForce, TrailingStopOrder,
};
use crate::domain::shared::{BrokerOrderId, ClientOrderId, Symbol};
use crate::error::EngineError;
use crate::observability::{record_broker_latency, record_trailing_stop_ratchet};

/// Trailing-stop quotes fetched once per tick.
pub(super) type TickQuotes = Result<HashMap<Symbol, MarketQuote>, MarketDataError>;

impl<B, M> AdvancedOrderEngine<B, M>
where
    B: BrokerPort + 'static,
    M: MarketDataPort + 'static,
{
    /// Advance one active order and retire it once it has settled.
    ///
    /// `quotes` holds this tick's prices for trailing-stop symbols, or the
    /// error that kept them from being fetched.
    pub(super) async fn update_order(
        &self,
        handle: &OrderHandle,
        quotes: &TickQuotes,
    ) -> Result<(), EngineError> {
        let mut order = handle.lock().await;
        let before = order.status();

        let result = if order.is_settled() {
            Ok(())
        } else {
            match &mut *order {
                AdvancedOrder::Bracket(bracket) => self.update_bracket(bracket).await,
                AdvancedOrder::Oco(oco) => self.update_oco(oco).await,
                AdvancedOrder::Iceberg(iceberg) => self.update_iceberg(iceberg).await,
                AdvancedOrder::TrailingStop(trailing) => {
                    self.update_trailing_stop(trailing, quotes).await
                }
            }
        };

        if order.status() != before {
            self.publish(EngineEvent::OrderStatusChanged {
                order_id: order.id().clone(),
                kind: order.kind(),
                status: order.status(),
                occurred_at: Utc::now(),
            })
            .await;
        }
        if order.is_settled() && self.registry.retire(&order) {
            info!(
                order_id = %order.id(),
                kind = %order.kind(),
                status = %order.status(),
                "Order settled"
            );
        }
        result
    }

    /// Broker's view of one leg, retrying transient failures.
    pub(super) async fn leg_state(&self, id: &BrokerOrderId) -> Result<LegState, BrokerError> {
        let started = Instant::now();
        let result = retry_transient(&self.retry, "get_order", || self.broker.get_order(id)).await;
        record_broker_latency("get_order", started.elapsed().as_secs_f64());
        result.map(|ack| ack.leg_state())
    }

    // =========================================================================
    // Bracket
    // =========================================================================

    async fn update_bracket(&self, order: &mut BracketOrder) -> Result<(), EngineError> {
        if order.exit_phase() == ExitPhase::AwaitingEntry {
            let Some(entry_id) = order.entry_order_id().cloned() else {
                return Ok(());
            };
            let leg = self.leg_state(&entry_id).await?;
            match order.apply_entry_update(&leg, Utc::now()) {
                EntryProgress::Filled => info!(
                    order_id = %order.id(),
                    filled_quantity = order.filled_quantity(),
                    average_fill_price = ?order.average_fill_price(),
                    "Bracket entry filled, placing exit legs"
                ),
                EntryProgress::PartiallyFilled => {
                    debug!(
                        order_id = %order.id(),
                        filled_quantity = order.filled_quantity(),
                        "Bracket entry partially filled"
                    );
                    return Ok(());
                }
                EntryProgress::Ended(status) => {
                    info!(order_id = %order.id(), status = %status, "Bracket entry ended unfilled");
                    return Ok(());
                }
                EntryProgress::Unchanged => return Ok(()),
            }
        }

        let mut poll_error = None;
        for (kind, leg_id) in order.live_exits() {
            let leg = match self.leg_state(&leg_id).await {
                Ok(leg) => leg,
                Err(error) => {
                    poll_error = Some(error);
                    continue;
                }
            };
            match order.apply_exit_update(kind, &leg, Utc::now()) {
                ExitOutcome::Holding => {}
                ExitOutcome::TargetPartiallyHit => info!(
                    order_id = %order.id(),
                    leg = ?kind,
                    open_quantity = order.open_quantity(),
                    "Bracket target filled, position partly closed"
                ),
                ExitOutcome::Closed { cancel } => {
                    info!(
                        order_id = %order.id(),
                        leg = ?kind,
                        exit_phase = ?order.exit_phase(),
                        "Bracket position closed"
                    );
                    self.cancel_siblings(order, &cancel).await;
                    return Ok(());
                }
                ExitOutcome::Lost(kind) => warn!(
                    order_id = %order.id(),
                    leg = ?kind,
                    broker_order_id = %leg_id,
                    "Bracket exit leg died at the broker, replacing"
                ),
            }
        }

        if order.exit_phase() == ExitPhase::Unprotected {
            self.place_exit_legs(order).await;
        }
        self.resize_stop(order).await;

        poll_error.map_or(Ok(()), |error| Err(error.into()))
    }

    /// Place every missing exit leg. Legs that fail stay pending for the
    /// next tick and the position is reported as unprotected.
    async fn place_exit_legs(&self, order: &mut BracketOrder) {
        let mut placed = Vec::new();
        let mut last_failure = None;

        for leg in order.pending_exits() {
            match self.submit(exit_leg_request(order, &leg)).await {
                Ok(ack) => {
                    order.record_exit_placed(
                        leg.kind,
                        ack.broker_order_id.clone(),
                        leg.quantity,
                        Utc::now(),
                    );
                    placed.push(ack.broker_order_id);
                }
                Err(failure) => {
                    warn!(
                        order_id = %order.id(),
                        leg = ?leg.kind,
                        quantity = leg.quantity,
                        error = %failure,
                        "Exit leg placement failed, will retry next tick"
                    );
                    last_failure = Some(failure.to_string());
                }
            }
        }

        if !placed.is_empty() {
            info!(order_id = %order.id(), legs = placed.len(), "Bracket exit legs placed");
            self.publish(EngineEvent::ExitLegsPlaced {
                order_id: order.id().clone(),
                legs: placed,
                occurred_at: Utc::now(),
            })
            .await;
        }

        if order.exit_phase() == ExitPhase::Unprotected {
            let reason = last_failure.unwrap_or_default();
            error!(
                order_id = %order.id(),
                symbol = %order.symbol(),
                quantity = order.open_quantity(),
                reason = %reason,
                "Filled position is unprotected"
            );
            self.publish(EngineEvent::UnprotectedPosition {
                order_id: order.id().clone(),
                symbol: order.symbol().clone(),
                quantity: order.open_quantity(),
                reason,
                occurred_at: Utc::now(),
            })
            .await;
        }
    }

    /// Shrink the stop to the shares still open after a target fill.
    async fn resize_stop(&self, order: &mut BracketOrder) {
        let Some((stop_id, quantity)) = order.stop_resize() else {
            return;
        };
        let replacement = SubmitOrderRequest::stop(
            ClientOrderId::tagged(ExitLegKind::StopLoss.client_prefix()),
            order.symbol().clone(),
            order.side().opposite(),
            quantity,
            order.stop_loss(),
        )
        .with_time_in_force(TimeInForce::Gtc);

        match self.broker.replace_order(&stop_id, replacement).await {
            Ok(ack) => {
                info!(
                    order_id = %order.id(),
                    quantity,
                    stop_order_id = %ack.broker_order_id,
                    "Bracket stop resized to open position"
                );
                order.record_exit_placed(
                    ExitLegKind::StopLoss,
                    ack.broker_order_id,
                    quantity,
                    Utc::now(),
                );
            }
            Err(failure) => warn!(
                order_id = %order.id(),
                stop_order_id = %stop_id,
                error = %failure,
                "Stop resize failed, will retry next tick"
            ),
        }
    }

    async fn cancel_siblings(&self, order: &BracketOrder, legs: &[BrokerOrderId]) {
        for leg in legs {
            if let Err(failure) = self.cancel_leg(leg).await {
                warn!(
                    order_id = %order.id(),
                    broker_order_id = %leg,
                    error = %failure,
                    "Failed to cancel remaining exit leg"
                );
            }
        }
    }

    // =========================================================================
    // OCO
    // =========================================================================

    async fn update_oco(&self, order: &mut OcoOrder) -> Result<(), EngineError> {
        let (Some(first_id), Some(second_id)) =
            (order.order_1_id().cloned(), order.order_2_id().cloned())
        else {
            return Ok(());
        };
        let first = self.leg_state(&first_id).await?;
        let second = self.leg_state(&second_id).await?;

        match order.apply_leg_updates(&first, &second, Utc::now()) {
            OcoProgress::Resolved { winner, loser } => {
                // The position exists either way; a failed cancel is only logged.
                if let Err(failure) = self.cancel_leg(&loser).await {
                    warn!(
                        order_id = %order.id(),
                        broker_order_id = %loser,
                        error = %failure,
                        "Failed to cancel losing OCO leg"
                    );
                }
                info!(
                    order_id = %order.id(),
                    filled_leg = %winner,
                    cancelled_leg = %loser,
                    "OCO resolved"
                );
                self.publish(EngineEvent::OcoResolved {
                    order_id: order.id().clone(),
                    filled_leg: winner,
                    cancelled_leg: loser,
                    occurred_at: Utc::now(),
                })
                .await;
            }
            OcoProgress::Ended(status) => {
                info!(order_id = %order.id(), status = %status, "OCO ended without a fill");
            }
            OcoProgress::PartiallyFilled => debug!(
                order_id = %order.id(),
                filled_quantity = order.filled_quantity(),
                "OCO leg partially filled"
            ),
            OcoProgress::Unchanged => {}
        }
        Ok(())
    }

    // =========================================================================
    // Iceberg
    // =========================================================================

    async fn update_iceberg(&self, order: &mut IcebergOrder) -> Result<(), EngineError> {
        if let Some(slice_id) = order.current_slice_id().cloned() {
            let leg = self.leg_state(&slice_id).await?;
            match order.apply_slice_update(&leg, Utc::now()) {
                SliceProgress::SliceFilled { remaining } => info!(
                    order_id = %order.id(),
                    filled_quantity = order.filled_quantity(),
                    remaining,
                    "Iceberg slice filled"
                ),
                SliceProgress::Ended(status) => {
                    info!(
                        order_id = %order.id(),
                        status = %status,
                        filled_quantity = order.filled_quantity(),
                        "Iceberg slice ended at the broker"
                    );
                    return Ok(());
                }
                SliceProgress::SlicePartiallyFilled | SliceProgress::Unchanged => return Ok(()),
            }
        }

        if order.needs_slice() {
            self.place_next_slice(order).await?;
        }
        Ok(())
    }

    async fn place_next_slice(&self, order: &mut IcebergOrder) -> Result<(), EngineError> {
        let quantity = order.next_slice_quantity();
        let ack = self
            .submit(slice_request(order, ICEBERG_NEXT_SLICE, quantity))
            .await?;
        order.record_slice(ack.broker_order_id.clone(), quantity, Utc::now());

        let remaining = order.remaining_quantity().saturating_sub(quantity);
        info!(
            order_id = %order.id(),
            slice_order_id = %ack.broker_order_id,
            quantity,
            remaining,
            "Iceberg slice placed"
        );
        self.publish(EngineEvent::IcebergSlicePlaced {
            order_id: order.id().clone(),
            slice_order_id: ack.broker_order_id,
            quantity,
            remaining,
            occurred_at: Utc::now(),
        })
        .await;
        Ok(())
    }

    // =========================================================================
    // Trailing stop
    // =========================================================================

    async fn update_trailing_stop(
        &self,
        order: &mut TrailingStopOrder,
        quotes: &TickQuotes,
    ) -> Result<(), EngineError> {
        if let Some(stop_id) = order.stop_order_id().cloned() {
            let leg = self.leg_state(&stop_id).await?;
            if let Some(status) = order.apply_stop_update(&leg, Utc::now()) {
                info!(order_id = %order.id(), status = %status, "Trailing stop leg changed");
                if status.is_terminal() {
                    return Ok(());
                }
            }
        }

        // Without a quote the stop holds still; the leg is still maintained.
        let quote_failure = match quotes {
            Ok(quotes) => {
                match quotes.get(order.symbol()) {
                    Some(quote) => self.observe_trailing_price(order, quote).await,
                    None => {
                        debug!(order_id = %order.id(), symbol = %order.symbol(), "No quote this tick");
                    }
                }
                None
            }
            Err(failure) => Some(failure.clone()),
        };

        if order.needs_stop() {
            self.restore_trailing_stop(order).await?;
        } else if order.needs_amend() {
            self.amend_trailing_stop(order).await?;
        }
        quote_failure.map_or(Ok(()), |failure| Err(failure.into()))
    }

    async fn observe_trailing_price(&self, order: &mut TrailingStopOrder, quote: &MarketQuote) {
        let Some(stop_price) = order.observe_price(quote.price, Utc::now()) else {
            return;
        };
        info!(
            order_id = %order.id(),
            symbol = %order.symbol(),
            price = %quote.price,
            stop_price = %stop_price,
            "Trailing stop ratcheted"
        );
        record_trailing_stop_ratchet(order.symbol().as_str());
        self.publish(EngineEvent::TrailingStopRatcheted {
            order_id: order.id().clone(),
            symbol: order.symbol().clone(),
            stop_price,
            occurred_at: Utc::now(),
        })
        .await;
    }

    /// Move the broker stop to the local stop.
    ///
    /// A failed replace may have cancelled the old stop already, so the leg
    /// is read back at once and a withdrawn stop is reported.
    async fn amend_trailing_stop(&self, order: &mut TrailingStopOrder) -> Result<(), EngineError> {
        let Some(stop_id) = order.stop_order_id().cloned() else {
            return Ok(());
        };
        let stop_price = order.current_stop_price();
        let request = trailing_stop_request(order, order.open_quantity(), stop_price);
        order.begin_replace();

        match self.broker.replace_order(&stop_id, request).await {
            Ok(ack) => {
                info!(
                    order_id = %order.id(),
                    stop_price = %stop_price,
                    stop_order_id = %ack.broker_order_id,
                    "Broker stop moved"
                );
                order.record_amended(ack.broker_order_id, stop_price, Utc::now());
                Ok(())
            }
            Err(failure) => {
                match self.leg_state(&stop_id).await {
                    Ok(leg) => {
                        order.apply_stop_update(&leg, Utc::now());
                    }
                    Err(read_failure) => warn!(
                        order_id = %order.id(),
                        stop_order_id = %stop_id,
                        error = %read_failure,
                        "Could not read stop after failed replace"
                    ),
                }
                if order.is_settled() {
                    return Ok(());
                }
                if order.needs_stop() {
                    self.report_unprotected_trailing(order, &failure).await;
                }
                Err(failure.into())
            }
        }
    }

    /// Place a fresh stop for a trailing order whose stop was withdrawn.
    async fn restore_trailing_stop(
        &self,
        order: &mut TrailingStopOrder,
    ) -> Result<(), EngineError> {
        let stop_price = order.current_stop_price();
        let quantity = order.open_quantity();
        match self
            .submit(trailing_stop_request(order, quantity, stop_price))
            .await
        {
            Ok(ack) => {
                info!(
                    order_id = %order.id(),
                    stop_price = %stop_price,
                    quantity,
                    stop_order_id = %ack.broker_order_id,
                    "Trailing stop placed again"
                );
                order.record_amended(ack.broker_order_id, stop_price, Utc::now());
                Ok(())
            }
            Err(failure) => {
                self.report_unprotected_trailing(order, &failure).await;
                Err(failure.into())
            }
        }
    }

    async fn report_unprotected_trailing(&self, order: &TrailingStopOrder, failure: &BrokerError) {
        error!(
            order_id = %order.id(),
            symbol = %order.symbol(),
            quantity = order.open_quantity(),
            reason = %failure,
            "Trailing stop has no broker stop"
        );
        self.publish(EngineEvent::UnprotectedPosition {
            order_id: order.id().clone(),
            symbol: order.symbol().clone(),
            quantity: order.open_quantity(),
            reason: failure.to_string(),
            occurred_at: Utc::now(),
        })
        .await;
    }
}

/// GTC exit on the side opposite the entry.
fn exit_leg_request(order: &BracketOrder, leg: &ExitLeg) -> SubmitOrderRequest {
    let client_order_id = ClientOrderId::tagged(leg.kind.client_prefix());
    let symbol = order.symbol().clone();
    let side = order.side().opposite();
    let request = match leg.kind.order_type() {
        OrderType::Stop => {
            SubmitOrderRequest::stop(client_order_id, symbol, side, leg.quantity, leg.price)
        }
        _ => SubmitOrderRequest::limit(client_order_id, symbol, side, leg.quantity, leg.price),
    };
    request.with_time_in_force(TimeInForce::Gtc)
}
