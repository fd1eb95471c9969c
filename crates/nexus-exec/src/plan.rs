//! Serialized plan fragments.
//!
//! A fragment is the unit a coordinator executes: the descriptor table plus the
//! root of a plan-node tree. Fragments arrive as JSON.
//!
//! ```json
//! {
//!   "desc_tbl": {"tuples": [{"id": 0, "slots": [{"id": 0, "name": "n", "type": "int"}]}]},
//!   "root": {
//!     "type": "select", "node_id": 1, "row_tuples": [0], "limit": 3,
//!     "conjuncts": [{"expr": "binary", "op": ">", "left": {"expr": "slot_ref", "slot": 0},
//!                    "right": {"expr": "literal", "value": {"int": 0}}}],
//!     "children": [{"type": "values", "node_id": 0, "row_tuples": [0],
//!                   "rows": [[{"int": 1}], [{"int": 2}]]}]
//!   }
//! }
//! ```

use nexus_common::{ExecError, ExecResult, PlanNodeId, TupleId, NO_LIMIT};
use serde::{Deserialize, Serialize};

use crate::descriptors::DescriptorTableDesc;
use crate::expr::ExprNode;
use crate::value::ScalarValue;

/// Operator-specific part of a plan node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanNodeKind {
    /// Filter and limit over a single child.
    Select,
    /// Constant rows.
    Values {
        /// Rows in output order.
        rows: Vec<Vec<ScalarValue>>,
        /// Rows scanned per `get_next` call; unlimited once exhausted.
        #[serde(default)]
        batch_sizes: Vec<usize>,
        /// Report end-of-stream together with the last rows.
        #[serde(default = "default_eos_with_last_batch")]
        eos_with_last_batch: bool,
    },
}

fn default_eos_with_last_batch() -> bool {
    true
}

fn default_limit() -> i64 {
    NO_LIMIT
}

/// One node of a serialized plan tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNodeDesc {
    /// Plan node id.
    pub node_id: PlanNodeId,
    /// Row limit, [`NO_LIMIT`] when unbounded.
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Predicates a row must satisfy.
    #[serde(default)]
    pub conjuncts: Vec<ExprNode>,
    /// Tuples making up the output row.
    pub row_tuples: Vec<TupleId>,
    /// Child nodes.
    #[serde(default)]
    pub children: Vec<PlanNodeDesc>,
    /// Operator kind and its configuration.
    #[serde(flatten)]
    pub kind: PlanNodeKind,
}

impl PlanNodeDesc {
    /// Describes a select over `child`.
    pub fn select(node_id: u32, row_tuples: Vec<TupleId>, child: PlanNodeDesc) -> Self {
        Self {
            node_id: PlanNodeId::new(node_id),
            limit: NO_LIMIT,
            conjuncts: Vec::new(),
            row_tuples,
            children: vec![child],
            kind: PlanNodeKind::Select,
        }
    }

    /// Describes a constant-row leaf.
    pub fn values(node_id: u32, row_tuples: Vec<TupleId>, rows: Vec<Vec<ScalarValue>>) -> Self {
        Self {
            node_id: PlanNodeId::new(node_id),
            limit: NO_LIMIT,
            conjuncts: Vec::new(),
            row_tuples,
            children: Vec::new(),
            kind: PlanNodeKind::Values {
                rows,
                batch_sizes: Vec::new(),
                eos_with_last_batch: true,
            },
        }
    }

    /// Sets the row limit.
    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Adds a conjunct.
    #[must_use]
    pub fn with_conjunct(mut self, expr: ExprNode) -> Self {
        self.conjuncts.push(expr);
        self
    }

    /// Checks limits across the tree.
    pub fn validate(&self) -> ExecResult<()> {
        if self.limit < NO_LIMIT {
            return Err(ExecError::prepare(format!(
                "plan node {}: invalid limit {}",
                self.node_id, self.limit
            )));
        }
        self.children.iter().try_for_each(PlanNodeDesc::validate)
    }
}

/// A descriptor table plus the plan tree to execute against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFragment {
    /// Tuple layouts referenced by the tree.
    pub desc_tbl: DescriptorTableDesc,
    /// Root plan node.
    pub root: PlanNodeDesc,
}

impl PlanFragment {
    /// Parses and validates a fragment from JSON.
    pub fn from_json(json: &str) -> ExecResult<Self> {
        let fragment: Self = serde_json::from_str(json)
            .map_err(|e| ExecError::prepare(format!("malformed plan fragment: {e}")))?;
        fragment.root.validate()?;
        Ok(fragment)
    }

    /// Serializes the fragment to JSON.
    pub fn to_json(&self) -> ExecResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ExecError::internal(e.to_string()))
    }
}
