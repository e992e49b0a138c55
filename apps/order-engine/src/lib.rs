// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Order Engine - Rust Core Library
//!
//! Turns trading decisions into broker orders and keeps them honest:
//! composite orders with private lifecycles, time-sliced execution, and
//! the risk arithmetic that decides how much to trade.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: pure state machines and arithmetic
//!   - `advanced_orders`: bracket, OCO, iceberg and trailing-stop lifecycles
//!   - `execution_tactics`: TWAP and VWAP slice plans and reports
//!   - `risk_management`: sizing, ATR stops, position and portfolio risk
//!
//! - **Application**: ports and services
//!   - `ports`: `BrokerPort`, `MarketDataPort`, `EventPublisherPort`
//!   - `services`: `AdvancedOrderEngine`, `OrderMonitor`, `RiskManager`
//!
//! - **Infrastructure**: adapters
//!   - `broker`: Alpaca trading API
//!   - `marketdata`: Alpaca stock data API
//!   - `events`: broadcast event bus
//!   - `mock`: in-memory broker and market data
//!
//! Cross-cutting: `broker` (retry), `config`, `observability`, `error`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// Retry policies for broker and market data calls.
pub mod broker;

/// YAML configuration.
pub mod config;

/// Engine error type and stable codes.
pub mod error;

/// Logging and metrics.
pub mod observability;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::advanced_orders::{
    AdvancedOrder, BracketOrder, BracketRequest, EngineEvent, IcebergOrder, IcebergRequest,
    OcoOrder, OcoRequest, OrderKind, OrderSide, OrderStatus, OrderType, TimeInForce,
    TrailingStopOrder, TrailingStopRequest,
};
pub use domain::execution_tactics::{ExecutionReport, SliceRequest, SlicingPolicy};
pub use domain::risk_management::{PortfolioRisk, PositionRisk, RiskParameters, SizingMetrics};
pub use domain::shared::{Bar, BrokerOrderId, ClientOrderId, OrderId, Symbol, Timeframe};

// Application re-exports
pub use application::ports::{
    BrokerError, BrokerPort, EventPublisherPort, MarketDataError, MarketDataPort,
    NoOpEventPublisher,
};
pub use application::services::{AdvancedOrderEngine, OrderMonitor, RiskError, RiskManager};

// Infrastructure re-exports
pub use infrastructure::broker::alpaca::{
    AlpacaBrokerAdapter, AlpacaConfig, AlpacaEnvironment, AlpacaError,
};
pub use infrastructure::events::BroadcastEventPublisher;
pub use infrastructure::marketdata::AlpacaMarketDataAdapter;
pub use infrastructure::mock::{MockBroker, MockMarketData};

pub use error::{EngineError, ErrorCode};
