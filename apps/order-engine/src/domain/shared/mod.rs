//! Shared Domain Types
//!
//! Value objects shared across the order, execution and risk contexts.

pub mod value_objects;

pub use value_objects::{Bar, BrokerOrderId, ClientOrderId, OrderId, Symbol, Timeframe};
