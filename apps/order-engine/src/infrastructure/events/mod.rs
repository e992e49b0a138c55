//! Event publisher adapters.

mod broadcast;

pub use broadcast::{BroadcastEventPublisher, DEFAULT_EVENT_CAPACITY};
