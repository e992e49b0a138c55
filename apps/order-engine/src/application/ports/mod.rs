//! Application Ports (Driven)
//!
//! Interfaces the engine uses to reach the outside world: the brokerage,
//! the market data provider and event subscribers.

mod broker_port;
mod event_publisher_port;
mod market_data_port;

pub use broker_port::{
    BrokerError, BrokerPort, CancelAck, OrderAck, OrderQueryStatus, SubmitOrderRequest,
};
pub use event_publisher_port::{EventPublishError, EventPublisherPort, NoOpEventPublisher};
pub use market_data_port::{MarketDataError, MarketDataPort, MarketQuote};
