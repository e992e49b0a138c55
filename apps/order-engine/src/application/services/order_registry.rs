//! Active and settled advanced orders owned by one engine instance.
//!
//! Each active order sits behind its own async mutex so a monitor handler
//! and a concurrent `cancel` never interleave on the same order. The
//! registry lock itself is only held for bookkeeping and never across an
//! `.await`.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as OrderLock;

use crate::domain::advanced_orders::AdvancedOrder;
use crate::domain::shared::OrderId;

/// Shared handle to one active order.
pub type OrderHandle = Arc<OrderLock<AdvancedOrder>>;

#[derive(Debug, Default)]
struct RegistryState {
    /// Insertion order is the monitor's processing order.
    active: Vec<(OrderId, OrderHandle)>,
    history: Vec<AdvancedOrder>,
}

/// Registry of active orders and the history of settled ones.
#[derive(Debug, Default)]
pub struct OrderRegistry {
    state: Mutex<RegistryState>,
}

impl OrderRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly placed order.
    pub fn insert(&self, order: AdvancedOrder) -> OrderHandle {
        let id = order.id().clone();
        let handle = Arc::new(OrderLock::new(order));
        self.state.lock().active.push((id, Arc::clone(&handle)));
        handle
    }

    /// Handle for an active order.
    #[must_use]
    pub fn get(&self, id: &OrderId) -> Option<OrderHandle> {
        self.state
            .lock()
            .active
            .iter()
            .find(|(active_id, _)| active_id == id)
            .map(|(_, handle)| Arc::clone(handle))
    }

    /// Handles of every active order, in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(OrderId, OrderHandle)> {
        self.state
            .lock()
            .active
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect()
    }

    /// Move an order from the active set to history.
    ///
    /// `order` is the final state, taken by the caller while it still holds
    /// the order's lock. Returns false if the order was no longer active.
    pub fn retire(&self, order: &AdvancedOrder) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state.active.iter().position(|(id, _)| id == order.id()) else {
            return false;
        };
        state.active.remove(index);
        state.history.push(order.clone());
        true
    }

    /// Current state of every active order.
    pub async fn list_active(&self) -> Vec<AdvancedOrder> {
        let handles = self.snapshot();
        let mut orders = Vec::with_capacity(handles.len());
        for (_, handle) in handles {
            orders.push(handle.lock().await.clone());
        }
        orders
    }

    /// Settled orders, oldest first.
    #[must_use]
    pub fn list_history(&self) -> Vec<AdvancedOrder> {
        self.state.lock().history.clone()
    }

    /// Number of active orders.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Number of settled orders.
    #[must_use]
    pub fn history_count(&self) -> usize {
        self.state.lock().history.len()
    }
}
