//! Expressions.
//!
//! Plans carry expressions in their serialized form, [`ExprNode`]. During
//! Prepare an operator binds them against its row layout with [`bind_expr`],
//! which resolves slot ids to positions and type checks the tree. The result is
//! a [`BoundExpr`], evaluated per row through the [`ScalarExpr`] trait. Bound
//! expressions are owned by the query-wide [`ExprRegistry`]; operators only keep
//! `Arc` references.

mod bound;
mod plan;
mod registry;

pub use bound::{bind_expr, BoundExpr, ScalarExpr};
pub use plan::{BinaryOp, ExprNode};
pub use registry::ExprRegistry;
