//! In-process fan-out of engine events over a `tokio` broadcast channel.
//!
//! Slow subscribers lag and lose the oldest events; the engine never waits
//! on them.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::application::ports::{EventPublishError, EventPublisherPort};
use crate::domain::advanced_orders::EngineEvent;

/// Events buffered per subscriber before it starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Broadcast publisher.
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    tx: broadcast::Sender<EngineEvent>,
}

impl BroadcastEventPublisher {
    /// Publisher with room for `capacity` undelivered events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        debug!(capacity, "Event bus initialized");
        Self { tx }
    }

    /// New receiver seeing every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Current number of receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[async_trait]
impl EventPublisherPort for BroadcastEventPublisher {
    async fn publish(&self, event: EngineEvent) -> Result<(), EventPublishError> {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                trace!(event_type, receivers, "Event published");
                Ok(())
            }
            Err(_) => Err(EventPublishError::NoSubscribers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::{OrderId, Symbol};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn ratchet() -> EngineEvent {
        EngineEvent::TrailingStopRatcheted {
            order_id: OrderId::new("TRAILING_1"),
            symbol: Symbol::new("TSLA"),
            stop_price: dec!(105),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let publisher = BroadcastEventPublisher::new(8);
        let mut rx = publisher.subscribe();

        publisher.publish(ratchet()).await.unwrap();
        publisher.publish_all(vec![ratchet(), ratchet()]).await.unwrap();

        for _ in 0..3 {
            assert_eq!(rx.recv().await.unwrap().event_type(), "TRAILING_STOP_RATCHETED");
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_reports_it() {
        let publisher = BroadcastEventPublisher::default();
        assert_eq!(publisher.subscriber_count(), 0);
        assert!(matches!(
            publisher.publish(ratchet()).await,
            Err(EventPublishError::NoSubscribers)
        ));
    }
}
