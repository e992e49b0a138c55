//! Execution Tactics Bounded Context
//!
//! Planning for TWAP and VWAP slicing plus the report produced by a run.
//! Planning is pure; pacing and submission live in the application layer.

pub mod report;
pub mod schedule;

pub use report::{Algorithm, ExecutionReport, ExecutionSlice};
pub use schedule::{
    RemainderAllocation, SliceRequest, SlicingPolicy, TwapPlan, VwapPlan, VwapSlice,
    violates_price_limit,
};
