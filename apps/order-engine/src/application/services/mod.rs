//! Application Services
//!
//! The order engine and its background monitor, the TWAP/VWAP executors and
//! the risk manager. Each service is generic over the broker and market
//! data ports so tests run against the in-memory adapters.

mod execution_algorithms;
mod order_engine;
mod order_handlers;
mod order_monitor;
mod order_registry;
mod risk_manager;

pub use order_engine::AdvancedOrderEngine;
pub use order_monitor::{OrderMonitor, TickSummary};
pub use order_registry::{OrderHandle, OrderRegistry};
pub use risk_manager::{RiskError, RiskManager};
