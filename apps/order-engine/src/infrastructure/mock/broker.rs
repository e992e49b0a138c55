//! In-memory broker for tests and dry runs.
//!
//! Orders rest until a test fills them with [`MockBroker::fill`]. Failures
//! are injected per call so individual broker round-trips can be scripted.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::application::ports::{
    BrokerError, BrokerPort, CancelAck, OrderAck, OrderQueryStatus, SubmitOrderRequest,
};
use crate::domain::advanced_orders::OrderStatus;
use crate::domain::risk_management::{Account, Position};
use crate::domain::shared::BrokerOrderId;

#[derive(Debug, Clone)]
struct MockOrder {
    request: SubmitOrderRequest,
    status: OrderStatus,
    filled_quantity: u64,
    average_fill_price: Option<Decimal>,
}

impl MockOrder {
    fn ack(&self, id: &BrokerOrderId) -> OrderAck {
        OrderAck {
            broker_order_id: id.clone(),
            client_order_id: Some(self.request.client_order_id.clone()),
            symbol: self.request.symbol.clone(),
            status: self.status,
            filled_quantity: self.filled_quantity,
            average_fill_price: self.average_fill_price,
        }
    }
}

#[derive(Debug)]
struct BrokerState {
    next_id: u64,
    orders: HashMap<BrokerOrderId, MockOrder>,
    submitted: Vec<SubmitOrderRequest>,
    submit_calls: usize,
    scheduled_submit_failures: HashMap<usize, BrokerError>,
    next_submit_failure: Option<BrokerError>,
    cancelled: Vec<BrokerOrderId>,
    cancel_attempts: usize,
    next_cancel_failure: Option<BrokerError>,
    replaced: Vec<(BrokerOrderId, SubmitOrderRequest)>,
    get_order_failures: HashMap<BrokerOrderId, BrokerError>,
    account: Account,
    account_failure: Option<BrokerError>,
    positions: Vec<Position>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            next_id: 1,
            orders: HashMap::new(),
            submitted: Vec::new(),
            submit_calls: 0,
            scheduled_submit_failures: HashMap::new(),
            next_submit_failure: None,
            cancelled: Vec::new(),
            cancel_attempts: 0,
            next_cancel_failure: None,
            replaced: Vec::new(),
            get_order_failures: HashMap::new(),
            account: Account {
                cash: dec!(100000),
                buying_power: dec!(100000),
                portfolio_value: dec!(100000),
                equity: dec!(100000),
                last_equity: Some(dec!(100000)),
            },
            account_failure: None,
            positions: Vec::new(),
        }
    }
}

impl BrokerState {
    fn accept(&mut self, request: SubmitOrderRequest) -> OrderAck {
        let id = BrokerOrderId::new(format!("mock-{}", self.next_id));
        self.next_id += 1;
        let order = MockOrder {
            request,
            status: OrderStatus::Submitted,
            filled_quantity: 0,
            average_fill_price: None,
        };
        let ack = order.ack(&id);
        self.orders.insert(id, order);
        ack
    }
}

/// Scriptable in-memory broker.
#[derive(Debug, Default)]
pub struct MockBroker {
    state: Mutex<BrokerState>,
}

impl MockBroker {
    /// Broker with a $100,000 cash account and no positions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `quantity` shares filled at `price`.
    ///
    /// The order is `Filled` once the fill covers its quantity, otherwise
    /// `PartiallyFilled`. Unknown ids are ignored.
    pub fn fill(&self, id: &BrokerOrderId, quantity: u64, price: Decimal) {
        let mut state = self.state.lock();
        if let Some(order) = state.orders.get_mut(id) {
            order.filled_quantity = quantity.min(order.request.quantity);
            order.average_fill_price = Some(price);
            order.status = if order.filled_quantity >= order.request.quantity {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
        }
    }

    /// Force a broker-side status, e.g. an expiry.
    pub fn set_status(&self, id: &BrokerOrderId, status: OrderStatus) {
        if let Some(order) = self.state.lock().orders.get_mut(id) {
            order.status = status;
        }
    }

    /// Fail the next `submit_order` call.
    pub fn fail_next_submit(&self, error: BrokerError) {
        self.state.lock().next_submit_failure = Some(error);
    }

    /// Fail the `call`-th `submit_order` call, counting from 1 across the
    /// broker's lifetime.
    pub fn fail_submit_at(&self, call: usize, error: BrokerError) {
        self.state.lock().scheduled_submit_failures.insert(call, error);
    }

    /// Fail the next `cancel_order` call.
    pub fn fail_next_cancel(&self, error: BrokerError) {
        self.state.lock().next_cancel_failure = Some(error);
    }

    /// Fail every `get_order` for `id`.
    pub fn fail_get_order(&self, id: &BrokerOrderId, error: BrokerError) {
        self.state.lock().get_order_failures.insert(id.clone(), error);
    }

    /// Replace the account snapshot.
    pub fn set_account(&self, account: Account) {
        let mut state = self.state.lock();
        state.account = account;
        state.account_failure = None;
    }

    /// Fail every account read.
    pub fn fail_account(&self, error: BrokerError) {
        self.state.lock().account_failure = Some(error);
    }

    /// Replace the open positions.
    pub fn set_positions(&self, positions: Vec<Position>) {
        self.state.lock().positions = positions;
    }

    /// Accepted submissions, in order.
    #[must_use]
    pub fn submitted(&self) -> Vec<SubmitOrderRequest> {
        self.state.lock().submitted.clone()
    }

    /// Successfully cancelled ids, in order.
    #[must_use]
    pub fn cancelled(&self) -> Vec<BrokerOrderId> {
        self.state.lock().cancelled.clone()
    }

    /// Every `cancel_order` call, failed ones included.
    #[must_use]
    pub fn cancel_attempts(&self) -> usize {
        self.state.lock().cancel_attempts
    }

    /// Replaced ids with their replacements.
    #[must_use]
    pub fn replaced(&self) -> Vec<(BrokerOrderId, SubmitOrderRequest)> {
        self.state.lock().replaced.clone()
    }
}

#[async_trait]
impl BrokerPort for MockBroker {
    async fn submit_order(&self, request: SubmitOrderRequest) -> Result<OrderAck, BrokerError> {
        let mut state = self.state.lock();
        state.submit_calls += 1;
        let call = state.submit_calls;
        if let Some(error) = state.scheduled_submit_failures.remove(&call) {
            return Err(error);
        }
        if let Some(error) = state.next_submit_failure.take() {
            return Err(error);
        }
        state.submitted.push(request.clone());
        Ok(state.accept(request))
    }

    async fn cancel_order(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<CancelAck, BrokerError> {
        let mut state = self.state.lock();
        state.cancel_attempts += 1;
        if let Some(error) = state.next_cancel_failure.take() {
            return Err(error);
        }
        let Some(order) = state.orders.get_mut(broker_order_id) else {
            return Err(BrokerError::OrderNotFound {
                order_id: broker_order_id.to_string(),
            });
        };
        if order.status == OrderStatus::Filled {
            return Err(BrokerError::OrderRejected {
                reason: "order already filled".to_string(),
            });
        }
        order.status = OrderStatus::Cancelled;
        state.cancelled.push(broker_order_id.clone());
        Ok(CancelAck {
            broker_order_id: broker_order_id.clone(),
            status: "cancelled".to_string(),
            message: None,
        })
    }

    async fn replace_order(
        &self,
        broker_order_id: &BrokerOrderId,
        replacement: SubmitOrderRequest,
    ) -> Result<OrderAck, BrokerError> {
        let mut state = self.state.lock();
        let Some(order) = state.orders.get_mut(broker_order_id) else {
            return Err(BrokerError::OrderNotFound {
                order_id: broker_order_id.to_string(),
            });
        };
        if order.status.is_terminal() {
            return Err(BrokerError::OrderRejected {
                reason: format!("order is {}", order.status),
            });
        }
        order.status = OrderStatus::Cancelled;
        state
            .replaced
            .push((broker_order_id.clone(), replacement.clone()));
        Ok(state.accept(replacement))
    }

    async fn get_order(&self, broker_order_id: &BrokerOrderId) -> Result<OrderAck, BrokerError> {
        let state = self.state.lock();
        if let Some(error) = state.get_order_failures.get(broker_order_id) {
            return Err(error.clone());
        }
        state
            .orders
            .get(broker_order_id)
            .map(|order| order.ack(broker_order_id))
            .ok_or_else(|| BrokerError::OrderNotFound {
                order_id: broker_order_id.to_string(),
            })
    }

    async fn get_orders(&self, status: OrderQueryStatus) -> Result<Vec<OrderAck>, BrokerError> {
        let state = self.state.lock();
        Ok(state
            .orders
            .iter()
            .filter(|(_, order)| match status {
                OrderQueryStatus::Open => !order.status.is_terminal(),
                OrderQueryStatus::Closed => order.status.is_terminal(),
                OrderQueryStatus::All => true,
            })
            .map(|(id, order)| order.ack(id))
            .collect())
    }

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        Ok(self.state.lock().positions.clone())
    }

    async fn get_account(&self) -> Result<Account, BrokerError> {
        let state = self.state.lock();
        match &state.account_failure {
            Some(error) => Err(error.clone()),
            None => Ok(state.account.clone()),
        }
    }
}
