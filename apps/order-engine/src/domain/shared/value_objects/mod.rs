//! Shared Value Objects
//!
//! Immutable domain types used across bounded contexts.
//! Value objects are compared by value, not identity.

mod identifiers;
mod market;
mod symbol;

pub use identifiers::{BrokerOrderId, ClientOrderId, OrderId};
pub use market::{Bar, Timeframe};
pub use symbol::Symbol;
