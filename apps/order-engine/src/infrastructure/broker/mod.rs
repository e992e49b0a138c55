//! Broker Adapters
//!
//! Implementations of `BrokerPort` for live brokers.

pub mod alpaca;

pub use alpaca::{AlpacaBrokerAdapter, AlpacaConfig, AlpacaEnvironment, AlpacaError};
