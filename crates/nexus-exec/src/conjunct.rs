//! Conjunct sets: the implicitly ANDed filter of an operator.

use std::sync::Arc;

use nexus_common::{ExecError, ExecResult};

use crate::batch::RowRef;
use crate::descriptors::{ColumnType, RowDescriptor};
use crate::expr::{ExprNode, ExprRegistry, ScalarExpr};

/// An ordered list of boolean predicates, bound once during Prepare.
///
/// Evaluation runs left to right and stops at the first predicate that is not
/// true for the row, so later predicates are never evaluated for rows an
/// earlier one already rejected. NULL counts as false.
#[derive(Debug, Clone, Default)]
pub struct ConjunctSet {
    conjuncts: Vec<Arc<dyn ScalarExpr>>,
}

impl ConjunctSet {
    /// Creates a set that passes every row.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Binds serialized predicates against `row_desc`, registering them with
    /// the query's expression registry.
    pub fn bind(
        exprs: &[ExprNode],
        row_desc: &RowDescriptor,
        registry: &ExprRegistry,
    ) -> ExecResult<Self> {
        let conjuncts = exprs
            .iter()
            .map(|expr| {
                registry.bind(expr, row_desc).map_err(|e| match e {
                    ExecError::Prepare { message } => {
                        ExecError::prepare(format!("conjunct {expr}: {message}"))
                    }
                    other => other,
                })
            })
            .collect::<ExecResult<Vec<_>>>()?;
        Self::from_exprs(conjuncts)
    }

    /// Builds a set from already bound expressions.
    pub fn from_exprs(conjuncts: Vec<Arc<dyn ScalarExpr>>) -> ExecResult<Self> {
        let mut set = Self::empty();
        for conjunct in conjuncts {
            set.push(conjunct)?;
        }
        Ok(set)
    }

    /// Appends a bound predicate, evaluated after the existing ones.
    pub fn push(&mut self, conjunct: Arc<dyn ScalarExpr>) -> ExecResult<()> {
        if let Some(ty) = conjunct.return_type() {
            if ty != ColumnType::Boolean {
                return Err(ExecError::prepare(format!(
                    "conjunct {} must be BOOLEAN, got {ty}",
                    self.conjuncts.len()
                )));
            }
        }
        self.conjuncts.push(conjunct);
        Ok(())
    }

    /// Returns the number of predicates.
    pub fn len(&self) -> usize {
        self.conjuncts.len()
    }

    /// Returns true if the set passes every row.
    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty()
    }

    /// Returns true if every predicate is true for `row`.
    ///
    /// A fault in any evaluated predicate is returned as an error; it is never
    /// treated as a rejected row.
    pub fn eval(&self, row: &RowRef<'_>) -> ExecResult<bool> {
        for conjunct in &self.conjuncts {
            if conjunct.evaluate(row)?.to_bool() != Some(true) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
