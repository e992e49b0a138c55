//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - `broker/`: Alpaca trading API
//! - `marketdata/`: Alpaca stock data API
//! - `events/`: in-process event fan-out
//! - `mock/`: scriptable in-memory broker and market data for tests and
//!   credential-less runs

pub mod broker;
pub mod events;
pub mod marketdata;
pub mod mock;
