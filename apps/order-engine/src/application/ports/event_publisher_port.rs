//! Event Publisher Port (Driven Port)
//!
//! Interface for publishing engine events to external systems.

use async_trait::async_trait;

use crate::domain::advanced_orders::EngineEvent;

/// Event publishing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventPublishError {
    /// No one is listening.
    #[error("No event subscribers")]
    NoSubscribers,

    /// Publishing failed.
    #[error("Event publish failed: {message}")]
    PublishFailed {
        /// Error details.
        message: String,
    },
}

/// Port for publishing engine events.
#[async_trait]
pub trait EventPublisherPort: Send + Sync {
    /// Publish one event.
    async fn publish(&self, event: EngineEvent) -> Result<(), EventPublishError>;

    /// Publish several events in order, stopping at the first failure.
    async fn publish_all(&self, events: Vec<EngineEvent>) -> Result<(), EventPublishError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// No-op event publisher.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisherPort for NoOpEventPublisher {
    async fn publish(&self, _event: EngineEvent) -> Result<(), EventPublishError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::{OrderId, Symbol};
    use chrono::Utc;

    #[tokio::test]
    async fn no_op_publisher_succeeds() {
        let publisher = NoOpEventPublisher;
        let event = EngineEvent::TrailingStopRatcheted {
            order_id: OrderId::new("TRAILING_1"),
            symbol: Symbol::new("AAPL"),
            stop_price: rust_decimal::Decimal::ONE,
            occurred_at: Utc::now(),
        };
        assert!(publisher.publish_all(vec![event.clone(), event]).await.is_ok());
    }
}
