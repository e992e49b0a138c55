//! In-memory adapters.
//!
//! Used by the test suites and by the binary when no broker credentials are
//! configured.

mod broker;
mod market_data;

pub use broker::MockBroker;
pub use market_data::MockMarketData;
