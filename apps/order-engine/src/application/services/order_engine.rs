//! Advanced Order Engine
//!
//! Places bracket, OCO, iceberg and trailing-stop orders, owns the registry
//! the monitor works through, and cancels on request.
//!
//! Every `place_*` validates first, calls the broker for the entry leg(s)
//! and registers the order only after the broker accepted it, so a
//! rejection never leaves a partial registry entry behind.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::order_registry::OrderRegistry;
use crate::application::ports::{
    BrokerError, BrokerPort, CancelAck, EventPublishError, EventPublisherPort, MarketDataPort,
    MarketQuote, NoOpEventPublisher, OrderAck, SubmitOrderRequest,
};
use crate::broker::{RetryPolicy, retry_transient};
use crate::domain::advanced_orders::{
    AdvancedOrder, BracketOrder, BracketRequest, EngineEvent, IcebergOrder, IcebergRequest,
    OcoLeg, OcoOrder, OcoRequest, OrderKind, OrderType, TimeInForce,
    TrailingStopOrder, TrailingStopRequest,
};
use crate::domain::execution_tactics::SlicingPolicy;
use crate::domain::shared::{BrokerOrderId, ClientOrderId, OrderId, Symbol};
use crate::error::EngineError;
use crate::observability::{
    record_broker_latency, record_order_cancelled, record_order_placed, record_placement_failure,
    update_active_orders,
};

/// Client id prefix of the first iceberg slice.
pub(super) const ICEBERG_FIRST_SLICE: &str = "ICEBERG";
/// Client id prefix of every later iceberg slice.
pub(super) const ICEBERG_NEXT_SLICE: &str = "ICEBERG_NEXT";
/// Client id prefix of trailing stop legs.
pub(super) const TRAILING_STOP_LEG: &str = "TRAILING";

/// Engine for advanced orders and sliced executions.
///
/// Cheap to clone; clones share the registry and adapters.
pub struct AdvancedOrderEngine<B, M> {
    pub(super) broker: Arc<B>,
    pub(super) market_data: Arc<M>,
    pub(super) events: Arc<dyn EventPublisherPort>,
    pub(super) registry: Arc<OrderRegistry>,
    pub(super) slicing: Arc<SlicingPolicy>,
    pub(super) retry: Arc<RetryPolicy>,
}

impl<B, M> Clone for AdvancedOrderEngine<B, M> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            market_data: Arc::clone(&self.market_data),
            events: Arc::clone(&self.events),
            registry: Arc::clone(&self.registry),
            slicing: Arc::clone(&self.slicing),
            retry: Arc::clone(&self.retry),
        }
    }
}

impl<B, M> std::fmt::Debug for AdvancedOrderEngine<B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvancedOrderEngine")
            .field("active_orders", &self.registry.active_count())
            .field("settled_orders", &self.registry.history_count())
            .field("slicing", &self.slicing)
            .finish_non_exhaustive()
    }
}

impl<B, M> AdvancedOrderEngine<B, M>
where
    B: BrokerPort + 'static,
    M: MarketDataPort + 'static,
{
    /// Engine with default slicing and retry policies and no event
    /// subscribers.
    #[must_use]
    pub fn new(broker: Arc<B>, market_data: Arc<M>) -> Self {
        Self {
            broker,
            market_data,
            events: Arc::new(NoOpEventPublisher),
            registry: Arc::new(OrderRegistry::new()),
            slicing: Arc::new(SlicingPolicy::default()),
            retry: Arc::new(RetryPolicy::default()),
        }
    }

    /// Publish engine events to `events`.
    #[must_use]
    pub fn with_event_publisher(mut self, events: Arc<dyn EventPublisherPort>) -> Self {
        self.events = events;
        self
    }

    /// Use `policy` for TWAP and VWAP runs.
    #[must_use]
    pub fn with_slicing_policy(mut self, policy: SlicingPolicy) -> Self {
        self.slicing = Arc::new(policy);
        self
    }

    /// Use `policy` for reads and cancels.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Arc::new(policy);
        self
    }

    /// The registry of active and settled orders.
    #[must_use]
    pub fn registry(&self) -> &OrderRegistry {
        &self.registry
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Place the LIMIT entry of a bracket. Exit legs follow once the entry
    /// fills.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed request, `Rejected` or `Broker` when the
    /// entry could not be placed.
    pub async fn place_bracket(&self, request: BracketRequest) -> Result<BracketOrder, EngineError> {
        request.validate()?;
        let kind = OrderKind::Bracket;
        let mut order = BracketOrder::new(OrderId::tagged(kind.id_prefix()), &request, Utc::now());

        let entry = SubmitOrderRequest::limit(
            ClientOrderId::tagged("BRACKET_ENTRY"),
            request.symbol.clone(),
            request.side,
            request.quantity,
            request.entry_price,
        );
        let ack = self.submit_for_placement(kind, entry).await?;
        order.mark_submitted(ack.broker_order_id.clone(), Utc::now())?;

        info!(
            order_id = %order.id(),
            symbol = %order.symbol(),
            side = %order.side(),
            quantity = order.quantity(),
            entry_price = %order.entry_price(),
            stop_loss = %order.stop_loss(),
            take_profit_1 = %order.take_profit_1(),
            entry_order_id = %ack.broker_order_id,
            "Bracket entry placed"
        );
        self.register(order.clone().into()).await;
        Ok(order)
    }

    /// Place both legs of an OCO pair.
    ///
    /// If the second leg fails the first is cancelled and nothing is
    /// registered.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed request, `Rejected` or `Broker` when a
    /// leg could not be placed.
    pub async fn place_oco(&self, request: OcoRequest) -> Result<OcoOrder, EngineError> {
        request.validate()?;
        let kind = OrderKind::Oco;
        let mut order = OcoOrder::new(OrderId::tagged(kind.id_prefix()), &request, Utc::now());

        let first = self
            .submit_for_placement(kind, oco_leg_request("OCO_1", &request, &request.leg_1))
            .await?;
        let second = match self
            .submit_for_placement(kind, oco_leg_request("OCO_2", &request, &request.leg_2))
            .await
        {
            Ok(ack) => ack,
            Err(error) => {
                if let Err(cancel_error) = self.cancel_leg(&first.broker_order_id).await {
                    warn!(
                        broker_order_id = %first.broker_order_id,
                        error = %cancel_error,
                        "Failed to withdraw first OCO leg after second leg failed"
                    );
                }
                return Err(error);
            }
        };
        order.mark_submitted(
            first.broker_order_id.clone(),
            second.broker_order_id.clone(),
            Utc::now(),
        )?;

        info!(
            order_id = %order.id(),
            symbol = %order.symbol(),
            quantity = order.quantity(),
            order_1_id = %first.broker_order_id,
            order_2_id = %second.broker_order_id,
            "OCO pair placed"
        );
        self.register(order.clone().into()).await;
        Ok(order)
    }

    /// Place the first visible slice of an iceberg.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed request, `Rejected` or `Broker` when the
    /// slice could not be placed.
    pub async fn place_iceberg(&self, request: IcebergRequest) -> Result<IcebergOrder, EngineError> {
        request.validate()?;
        let kind = OrderKind::Iceberg;
        let mut order = IcebergOrder::new(OrderId::tagged(kind.id_prefix()), &request, Utc::now());

        let quantity = order.next_slice_quantity();
        let ack = self
            .submit_for_placement(kind, slice_request(&order, ICEBERG_FIRST_SLICE, quantity))
            .await?;
        order.record_slice(ack.broker_order_id.clone(), quantity, Utc::now());

        info!(
            order_id = %order.id(),
            symbol = %order.symbol(),
            total_quantity = order.total_quantity(),
            visible_quantity = order.visible_quantity(),
            slice_order_id = %ack.broker_order_id,
            "Iceberg placed"
        );
        self.register(order.clone().into()).await;
        self.publish(EngineEvent::IcebergSlicePlaced {
            order_id: order.id().clone(),
            slice_order_id: ack.broker_order_id,
            quantity,
            remaining: order.remaining_quantity() - quantity,
            occurred_at: Utc::now(),
        })
        .await;
        Ok(order)
    }

    /// Place a GTC STOP one trail away from the current quote.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed request, `NoQuote` or `MarketData` when
    /// no reference price is available, `Rejected` or `Broker` when the stop
    /// could not be placed.
    pub async fn place_trailing_stop(
        &self,
        request: TrailingStopRequest,
    ) -> Result<TrailingStopOrder, EngineError> {
        request.validate()?;
        let kind = OrderKind::TrailingStop;
        let quote = self
            .quote(&request.symbol)
            .await?
            .ok_or_else(|| EngineError::NoQuote(request.symbol.clone()))?;

        let mut order = TrailingStopOrder::new(
            OrderId::tagged(kind.id_prefix()),
            &request,
            quote.price,
            Utc::now(),
        )?;
        let ack = self
            .submit_for_placement(
                kind,
                trailing_stop_request(&order, order.quantity(), order.current_stop_price()),
            )
            .await?;
        order.mark_submitted(ack.broker_order_id.clone(), Utc::now())?;

        info!(
            order_id = %order.id(),
            symbol = %order.symbol(),
            reference_price = %quote.price,
            stop_price = %order.current_stop_price(),
            stop_order_id = %ack.broker_order_id,
            "Trailing stop placed"
        );
        self.register(order.clone().into()).await;
        Ok(order)
    }

    // =========================================================================
    // Cancellation & queries
    // =========================================================================

    /// Cancel an active order and every broker leg it still has.
    ///
    /// Leg cancels are best-effort: each is attempted and failures are
    /// logged. Returns false when the order is not active or has already
    /// settled.
    pub async fn cancel(&self, order_id: &OrderId) -> bool {
        let Some(handle) = self.registry.get(order_id) else {
            return false;
        };
        let mut order = handle.lock().await;
        if order.is_settled() {
            return false;
        }

        for leg in order.live_broker_order_ids() {
            if let Err(error) = self.cancel_leg(&leg).await {
                warn!(
                    order_id = %order_id,
                    broker_order_id = %leg,
                    error = %error,
                    "Leg cancel failed"
                );
            }
        }

        if let AdvancedOrder::Iceberg(iceberg) = &mut *order
            && let Some(slice_id) = iceberg.current_slice_id().cloned()
        {
            match self.leg_state(&slice_id).await {
                Ok(leg) => iceberg.absorb_cancelled_slice(&leg, Utc::now()),
                Err(error) => warn!(
                    order_id = %order_id,
                    broker_order_id = %slice_id,
                    error = %error,
                    "Could not read final slice fill"
                ),
            }
        }

        let kind = order.kind();
        order.mark_cancelled(Utc::now());
        self.registry.retire(&order);
        drop(order);

        info!(order_id = %order_id, kind = %kind, "Order cancelled");
        record_order_cancelled(kind.as_label());
        update_active_orders(self.registry.active_count());
        self.publish(EngineEvent::OrderCancelled {
            order_id: order_id.clone(),
            kind,
            occurred_at: Utc::now(),
        })
        .await;
        true
    }

    /// Current state of every active order.
    pub async fn list_active(&self) -> Vec<AdvancedOrder> {
        self.registry.list_active().await
    }

    /// Settled orders, oldest first.
    #[must_use]
    pub fn list_history(&self) -> Vec<AdvancedOrder> {
        self.registry.list_history()
    }

    /// Look up an order, active or settled.
    pub async fn get(&self, order_id: &OrderId) -> Option<AdvancedOrder> {
        if let Some(handle) = self.registry.get(order_id) {
            return Some(handle.lock().await.clone());
        }
        self.registry
            .list_history()
            .into_iter()
            .rev()
            .find(|order| order.id() == order_id)
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    /// Submit a placement-time order. Never retried.
    async fn submit_for_placement(
        &self,
        kind: OrderKind,
        request: SubmitOrderRequest,
    ) -> Result<OrderAck, EngineError> {
        let symbol = request.symbol.clone();
        self.submit(request).await.map_err(|error| {
            let error = EngineError::placement(error);
            record_placement_failure(kind.as_label(), error.code().reason());
            warn!(kind = %kind, symbol = %symbol, error = %error, "Order placement failed");
            error
        })
    }

    /// Submit one order and record the broker latency.
    pub(super) async fn submit(&self, request: SubmitOrderRequest) -> Result<OrderAck, BrokerError> {
        let started = Instant::now();
        let result = self.broker.submit_order(request).await;
        record_broker_latency("submit_order", started.elapsed().as_secs_f64());
        result
    }

    /// Cancel one broker leg, retrying transient failures.
    pub(super) async fn cancel_leg(&self, id: &BrokerOrderId) -> Result<CancelAck, BrokerError> {
        let started = Instant::now();
        let result = retry_transient(&self.retry, "cancel_order", || {
            self.broker.cancel_order(id)
        })
        .await;
        record_broker_latency("cancel_order", started.elapsed().as_secs_f64());
        result
    }

    /// Latest quote for one symbol, retrying transient failures.
    pub(super) async fn quote(&self, symbol: &Symbol) -> Result<Option<MarketQuote>, EngineError> {
        retry_transient(&self.retry, "get_quote", || self.market_data.get_quote(symbol))
            .await
            .map_err(EngineError::from)
    }

    async fn register(&self, order: AdvancedOrder) {
        let kind = order.kind();
        let event = EngineEvent::OrderPlaced {
            order_id: order.id().clone(),
            kind,
            symbol: order.symbol().clone(),
            occurred_at: Utc::now(),
        };
        self.registry.insert(order);
        record_order_placed(kind.as_label());
        update_active_orders(self.registry.active_count());
        self.publish(event).await;
    }

    /// Publish an event; failures are only logged.
    pub(super) async fn publish(&self, event: EngineEvent) {
        let event_type = event.event_type();
        match self.events.publish(event).await {
            Ok(()) => {}
            Err(EventPublishError::NoSubscribers) => {
                debug!(event_type, "No subscribers for engine event");
            }
            Err(error) => warn!(event_type, error = %error, "Failed to publish engine event"),
        }
    }
}

fn oco_leg_request(prefix: &str, request: &OcoRequest, leg: &OcoLeg) -> SubmitOrderRequest {
    let client_order_id = ClientOrderId::tagged(prefix);
    let symbol = request.symbol.clone();
    match leg.order_type {
        OrderType::Stop => {
            SubmitOrderRequest::stop(client_order_id, symbol, request.side, request.quantity, leg.price)
        }
        _ => SubmitOrderRequest::limit(
            client_order_id,
            symbol,
            request.side,
            request.quantity,
            leg.price,
        ),
    }
}

/// LIMIT DAY slice at the iceberg's price.
pub(super) fn slice_request(order: &IcebergOrder, prefix: &str, quantity: u64) -> SubmitOrderRequest {
    SubmitOrderRequest::limit(
        ClientOrderId::tagged(prefix),
        order.symbol().clone(),
        order.side(),
        quantity,
        order.price(),
    )
}

/// GTC STOP on the side opposite the protected position.
pub(super) fn trailing_stop_request(
    order: &TrailingStopOrder,
    quantity: u64,
    stop_price: Decimal,
) -> SubmitOrderRequest {
    SubmitOrderRequest::stop(
        ClientOrderId::tagged(TRAILING_STOP_LEG),
        order.symbol().clone(),
        order.side().opposite(),
        quantity,
        stop_price,
    )
    .with_time_in_force(TimeInForce::Gtc)
}
