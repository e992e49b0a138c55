//! Domain Layer
//!
//! Business logic with zero infrastructure dependencies. Everything here is
//! synchronous and deterministic given its inputs; time is passed in.
//!
//! # Bounded Contexts
//!
//! - [`advanced_orders`]: bracket, OCO, iceberg and trailing-stop state machines
//! - [`execution_tactics`]: TWAP and VWAP slice planning
//! - [`risk_management`]: sizing, stop placement and portfolio risk

pub mod advanced_orders;
pub mod execution_tactics;
pub mod risk_management;
pub mod shared;
