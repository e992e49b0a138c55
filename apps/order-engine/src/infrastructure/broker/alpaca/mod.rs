//! Alpaca Markets Broker Adapter
//!
//! `BrokerPort` over Alpaca's REST trading API:
//! - Native order replacement through `PATCH /v2/orders/{id}`
//! - Retry with exponential backoff for idempotent requests
//! - PAPER vs LIVE environment selection

mod adapter;
pub(crate) mod api_types;
mod config;
mod error;
mod http_client;

pub use adapter::AlpacaBrokerAdapter;
pub use config::{AlpacaConfig, AlpacaEnvironment};
pub use error::AlpacaError;
pub use http_client::AlpacaHttpClient;
