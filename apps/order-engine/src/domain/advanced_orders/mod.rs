//! Advanced Orders Bounded Context
//!
//! Bracket, OCO, iceberg and trailing-stop orders. Each variant is a pure
//! state machine: it validates its request, consumes broker leg snapshots
//! and tells the caller which broker actions to take next.

pub mod advanced_order;
pub mod bracket;
pub mod errors;
pub mod events;
pub mod iceberg;
pub mod oco;
pub mod trailing_stop;
pub mod value_objects;

pub use advanced_order::{AdvancedOrder, OrderKind};
pub use bracket::{
    BracketOrder, BracketRequest, EntryProgress, ExitLeg, ExitLegKind, ExitOutcome, ExitPhase,
};
pub use errors::OrderError;
pub use events::EngineEvent;
pub use iceberg::{IcebergOrder, IcebergRequest, SliceProgress};
pub use oco::{OcoLeg, OcoOrder, OcoProgress, OcoRequest};
pub use trailing_stop::{TrailingStopOrder, TrailingStopRequest};
pub use value_objects::{LegState, OrderSide, OrderStatus, OrderType, TimeInForce};
