//! # nexus-exec
//!
//! Pull-based operator execution for NexusDB.
//!
//! A plan fragment is turned into a tree of operators implementing
//! [`ExecNode`](node::ExecNode). The coordinator drives the root through
//! Prepare, Open, GetNext until end-of-stream, and Close; each operator drives
//! its children the same way. Rows travel in [`RowBatch`](batch::RowBatch)es
//! whose arenas move between operators only through explicit copy or transfer.
//!
//! This crate implements:
//! - Descriptors and runtime values
//! - Row batches with arena ownership transfer
//! - Expression binding and evaluation, conjunct sets
//! - The operator lifecycle and the select and values operators
//! - Plan fragments and the query coordinator

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Row batches
pub mod batch;

/// Conjunct sets
pub mod conjunct;

/// Query coordinator
pub mod coordinator;

/// Per-query execution context
pub mod context;

/// Tuple and slot descriptors
pub mod descriptors;

/// Expressions
pub mod expr;

/// Operator lifecycle and operators
pub mod node;

/// Serialized plan fragments
pub mod plan;

/// Runtime values
pub mod value;

pub use batch::{RowBatch, RowRef};
pub use context::{CancelHandle, ExecContext};
pub use coordinator::{QueryExecutor, QueryFailure, QueryResult};
pub use node::{ExecNode, NodeState};
pub use value::ScalarValue;
