//! Application Layer
//!
//! Orchestrates the domain through the ports it defines:
//!
//! - **Ports**: broker, market data and event publisher interfaces
//! - **Services**: the order engine, order monitor, slicing executors and
//!   risk manager

pub mod ports;
pub mod services;

pub use ports::*;
pub use services::*;
