//! The operator lifecycle contract.
//!
//! Every operator implements [`ExecNode`]. A driver calls `prepare` once,
//! `open` once, `get_next` until it reports end-of-stream, and `close` on every
//! exit path. An operator embedded in a repeatedly executed subplan may also be
//! driven through `reset` followed by `open` again:
//!
//! ```text
//! Constructed -> Prepared -> Opened <-> Reset
//!      |             |          |         |
//!      +-------------+----------+---------+--> Closed
//! ```
//!
//! Calls outside this state machine fail with [`ExecError::InvalidState`];
//! `close` is accepted in every state and is a no-op once closed.
//!
//! Operators drive their children through the same protocol. Shared bookkeeping
//! (state, limit, conjuncts, children) lives in [`ExecNodeBase`].

mod select;
mod values;

use std::fmt;
use std::sync::Arc;

use nexus_common::{ExecError, ExecResult, PlanNodeId, NO_LIMIT};
use tracing::debug;

use crate::batch::RowBatch;
use crate::conjunct::ConjunctSet;
use crate::context::ExecContext;
use crate::descriptors::{DescriptorTbl, RowDescriptor};
use crate::expr::{ExprNode, ScalarExpr};
use crate::plan::{PlanNodeDesc, PlanNodeKind};

pub use select::SelectNode;
pub use values::ValuesNode;

/// Lifecycle state of an operator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Built from a plan description; nothing bound yet.
    Constructed,
    /// Expressions bound.
    Prepared,
    /// Resources acquired; `get_next` may be called.
    Opened,
    /// Rewound by `reset`; must be opened again before `get_next`.
    Reset,
    /// Torn down. Terminal.
    Closed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// When an operator opens its children relative to its own setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChildOpenOrder {
    /// Children are opened before the operator allocates its own state.
    BeforeSelf,
}

/// An executable plan operator.
pub trait ExecNode: fmt::Debug + Send {
    /// Returns the shared operator bookkeeping.
    fn base(&self) -> &ExecNodeBase;

    /// Returns when this operator opens its children.
    fn child_open_order(&self) -> ChildOpenOrder;

    /// Prepares children, then binds this operator's expressions.
    fn prepare(&mut self, ctx: &ExecContext) -> ExecResult<()>;

    /// Opens children and acquires operator-local resources.
    fn open(&mut self, ctx: &ExecContext) -> ExecResult<()>;

    /// Appends up to `batch.remaining_capacity()` rows to `batch`.
    ///
    /// Returns `true` at end-of-stream. Rows appended by the same call are still
    /// valid output. Once `true` has been returned every further call returns
    /// `true` without appending rows, until the operator is reset.
    fn get_next(&mut self, ctx: &ExecContext, batch: &mut RowBatch) -> ExecResult<bool>;

    /// Rewinds the operator and its children so the output can be produced
    /// again after another `open`.
    fn reset(&mut self, ctx: &ExecContext) -> ExecResult<()>;

    /// Releases operator resources and closes children. Idempotent.
    fn close(&mut self, ctx: &ExecContext);

    /// Returns the plan node id.
    fn id(&self) -> PlanNodeId {
        self.base().id()
    }

    /// Returns the operator name.
    fn name(&self) -> &'static str {
        self.base().name()
    }

    /// Returns the layout of the rows this operator produces.
    fn row_desc(&self) -> &Arc<RowDescriptor> {
        self.base().row_desc()
    }

    /// Returns the lifecycle state.
    fn state(&self) -> NodeState {
        self.base().state()
    }

    /// Returns the number of rows produced since the last open.
    fn rows_returned(&self) -> u64 {
        self.base().rows_returned()
    }

    /// Returns the child operators.
    fn children(&self) -> &[Box<dyn ExecNode>] {
        self.base().children()
    }
}

/// State shared by every operator.
#[derive(Debug)]
pub struct ExecNodeBase {
    id: PlanNodeId,
    name: &'static str,
    row_desc: Arc<RowDescriptor>,
    limit: Option<u64>,
    rows_returned: u64,
    conjunct_exprs: Vec<ExprNode>,
    extra_conjuncts: Vec<Arc<dyn ScalarExpr>>,
    conjuncts: ConjunctSet,
    children: Vec<Box<dyn ExecNode>>,
    state: NodeState,
}

impl ExecNodeBase {
    /// Creates the bookkeeping for an operator.
    ///
    /// `limit` is [`NO_LIMIT`] for an unbounded operator; smaller values are
    /// rejected.
    pub fn new(
        name: &'static str,
        id: PlanNodeId,
        row_desc: Arc<RowDescriptor>,
        limit: i64,
        conjunct_exprs: Vec<ExprNode>,
        children: Vec<Box<dyn ExecNode>>,
    ) -> ExecResult<Self> {
        let limit = match limit {
            NO_LIMIT => None,
            n => Some(u64::try_from(n).map_err(|_| {
                ExecError::prepare(format!("{name} (id={id}): invalid limit {n}"))
            })?),
        };

        Ok(Self {
            id,
            name,
            row_desc,
            limit,
            rows_returned: 0,
            conjunct_exprs,
            extra_conjuncts: Vec::new(),
            conjuncts: ConjunctSet::empty(),
            children,
            state: NodeState::Constructed,
        })
    }

    /// Builds the childless bookkeeping for `desc`, resolving its row layout.
    pub fn from_desc(name: &'static str, desc: &PlanNodeDesc, tbl: &DescriptorTbl) -> ExecResult<Self> {
        let row_desc = RowDescriptor::new(tbl, &desc.row_tuples)?;
        Self::new(
            name,
            desc.node_id,
            Arc::new(row_desc),
            desc.limit,
            desc.conjuncts.clone(),
            Vec::new(),
        )
    }

    /// Attaches child operators.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Box<dyn ExecNode>>) -> Self {
        self.children = children;
        self
    }

    /// Adds an already bound predicate, evaluated after the plan's conjuncts.
    #[must_use]
    pub fn with_bound_conjunct(mut self, conjunct: Arc<dyn ScalarExpr>) -> Self {
        self.extra_conjuncts.push(conjunct);
        self
    }

    /// Returns the plan node id.
    pub fn id(&self) -> PlanNodeId {
        self.id
    }

    /// Returns the operator name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns a label for messages, e.g. `SELECT (id=1)`.
    pub fn label(&self) -> String {
        format!("{} (id={})", self.name, self.id)
    }

    /// Returns the output row layout.
    pub fn row_desc(&self) -> &Arc<RowDescriptor> {
        &self.row_desc
    }

    /// Returns the row limit, if any.
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Returns the rows produced since the last open.
    pub fn rows_returned(&self) -> u64 {
        self.rows_returned
    }

    /// Counts rows handed to the caller.
    pub fn add_rows_returned(&mut self, rows: u64) {
        self.rows_returned += rows;
    }

    /// Returns true once the limit has been reached.
    pub fn reached_limit(&self) -> bool {
        self.limit.is_some_and(|limit| self.rows_returned >= limit)
    }

    /// Returns the bound conjuncts. Empty before `prepare`.
    pub fn conjuncts(&self) -> &ConjunctSet {
        &self.conjuncts
    }

    /// Returns the children.
    pub fn children(&self) -> &[Box<dyn ExecNode>] {
        &self.children
    }

    /// Returns child `index`.
    pub fn child_mut(&mut self, index: usize) -> ExecResult<&mut Box<dyn ExecNode>> {
        let label = self.label();
        self.children
            .get_mut(index)
            .ok_or_else(|| ExecError::internal(format!("{label} has no child {index}")))
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Fails with [`ExecError::InvalidState`] unless the state is one of `allowed`.
    pub fn check_state(&self, operation: &'static str, allowed: &[NodeState]) -> ExecResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ExecError::InvalidState {
                node: self.label(),
                operation,
                state: self.state.to_string(),
            })
        }
    }

    /// Prepares every child, then binds the conjuncts.
    pub fn prepare(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.check_state("prepare", &[NodeState::Constructed])?;
        for child in &mut self.children {
            child.prepare(ctx)?;
        }

        let mut conjuncts = ConjunctSet::bind(&self.conjunct_exprs, &self.row_desc, ctx.registry())
            .map_err(|e| match e {
                ExecError::Prepare { message } => {
                    ExecError::prepare(format!("{}: {message}", self.label()))
                }
                other => other,
            })?;
        for conjunct in &self.extra_conjuncts {
            conjuncts.push(Arc::clone(conjunct))?;
        }
        self.conjuncts = conjuncts;
        self.state = NodeState::Prepared;

        debug!(node_id = %self.id, node = self.name, conjuncts = self.conjuncts.len(), "prepared");
        Ok(())
    }

    /// Checks that `open` is legal and cancellation has not been requested.
    pub fn begin_open(&self, ctx: &ExecContext) -> ExecResult<()> {
        self.check_state("open", &[NodeState::Prepared, NodeState::Reset])?;
        ctx.check_cancelled()
    }

    /// Opens every child in order.
    pub fn open_children(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        for child in &mut self.children {
            child.open(ctx)?;
        }
        Ok(())
    }

    /// Marks the operator opened and clears the per-open counters.
    pub fn finish_open(&mut self) {
        self.rows_returned = 0;
        self.state = NodeState::Opened;
        debug!(node_id = %self.id, node = self.name, "opened");
    }

    /// Checks that `get_next` is legal and cancellation has not been requested.
    pub fn begin_get_next(&self, ctx: &ExecContext) -> ExecResult<()> {
        self.check_state("get_next", &[NodeState::Opened])?;
        ctx.check_cancelled()
    }

    /// Clears the per-open counters and resets every child.
    pub fn reset(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.check_state("reset", &[NodeState::Opened, NodeState::Reset])?;
        self.rows_returned = 0;
        for child in &mut self.children {
            child.reset(ctx)?;
        }
        self.state = NodeState::Reset;
        debug!(node_id = %self.id, node = self.name, "reset");
        Ok(())
    }

    /// Returns true once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.state == NodeState::Closed
    }

    /// Closes every child and marks the operator closed.
    ///
    /// Operators release their own resources before calling this.
    pub fn close(&mut self, ctx: &ExecContext) {
        if self.is_closed() {
            return;
        }
        for child in &mut self.children {
            child.close(ctx);
        }
        self.state = NodeState::Closed;
        debug!(node_id = %self.id, node = self.name, rows_returned = self.rows_returned, "closed");
    }
}

/// Builds the operator tree described by `desc` against the context's
/// descriptor table.
///
/// Children are built first. Layout and limit errors are Prepare errors. When
/// an operator cannot be built, the children already built for it are closed.
pub fn build_tree(desc: &PlanNodeDesc, ctx: &ExecContext) -> ExecResult<Box<dyn ExecNode>> {
    let mut children = Vec::with_capacity(desc.children.len());
    for child in &desc.children {
        match build_tree(child, ctx) {
            Ok(node) => children.push(node),
            Err(e) => {
                close_all(&mut children, ctx);
                return Err(e);
            }
        }
    }
    build_node(desc, ctx, children)
}

/// Builds one operator over already built `children`.
fn build_node(
    desc: &PlanNodeDesc,
    ctx: &ExecContext,
    mut children: Vec<Box<dyn ExecNode>>,
) -> ExecResult<Box<dyn ExecNode>> {
    let name = match desc.kind {
        PlanNodeKind::Select => SelectNode::NAME,
        PlanNodeKind::Values { .. } => ValuesNode::NAME,
    };
    let mut base = match ExecNodeBase::from_desc(name, desc, ctx.desc_tbl()) {
        Ok(base) => base.with_children(children),
        Err(e) => {
            close_all(&mut children, ctx);
            return Err(e);
        }
    };

    let checked = match desc.kind {
        PlanNodeKind::Select => SelectNode::check(&base),
        PlanNodeKind::Values { .. } => ValuesNode::check(&base),
    };
    if let Err(e) = checked {
        base.close(ctx);
        return Err(e);
    }

    let node: Box<dyn ExecNode> = match &desc.kind {
        PlanNodeKind::Select => Box::new(SelectNode::new(base)?),
        PlanNodeKind::Values {
            rows,
            batch_sizes,
            eos_with_last_batch,
        } => Box::new(ValuesNode::new(
            base,
            rows.clone(),
            batch_sizes.clone(),
            *eos_with_last_batch,
        )?),
    };
    Ok(node)
}

fn close_all(nodes: &mut [Box<dyn ExecNode>], ctx: &ExecContext) {
    for node in nodes {
        node.close(ctx);
    }
}
