//! Market Data Adapters
//!
//! REST implementations of `MarketDataPort`.

mod adapter;

pub use adapter::AlpacaMarketDataAdapter;
