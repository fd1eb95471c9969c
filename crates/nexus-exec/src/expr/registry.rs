//! Query-wide expression ownership.

use std::fmt;
use std::sync::Arc;

use nexus_common::ExecResult;
use parking_lot::Mutex;

use super::{bind_expr, ExprNode, ScalarExpr};
use crate::descriptors::RowDescriptor;

/// Owns every expression bound for one query.
///
/// Operators keep `Arc` handles to registered expressions; the registry keeps
/// them alive until the query's context is dropped.
#[derive(Default)]
pub struct ExprRegistry {
    exprs: Mutex<Vec<Arc<dyn ScalarExpr>>>,
}

impl ExprRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an expression and returns a handle to it.
    pub fn register(&self, expr: Arc<dyn ScalarExpr>) -> Arc<dyn ScalarExpr> {
        self.exprs.lock().push(Arc::clone(&expr));
        expr
    }

    /// Binds `expr` against `row_desc` and registers the result.
    pub fn bind(&self, expr: &ExprNode, row_desc: &RowDescriptor) -> ExecResult<Arc<dyn ScalarExpr>> {
        let bound = bind_expr(expr, row_desc)?;
        Ok(self.register(Arc::new(bound)))
    }

    /// Returns the number of registered expressions.
    pub fn len(&self) -> usize {
        self.exprs.lock().len()
    }

    /// Returns true if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.exprs.lock().is_empty()
    }
}

impl fmt::Debug for ExprRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprRegistry")
            .field("len", &self.len())
            .finish()
    }
}
