//! Type definitions shared by the execution crates.

mod ids;

pub use ids::{PlanNodeId, SlotId, TupleId};
