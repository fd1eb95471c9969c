//! Shared helpers for the operator integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nexus_common::config::ExecConfig;
use nexus_common::{EvalError, ExecResult, PlanNodeId, TupleId, NO_LIMIT};
use nexus_exec::batch::{RowBatch, RowRef};
use nexus_exec::context::{CancelHandle, ExecContext};
use nexus_exec::descriptors::{
    ColumnType, DescriptorTableDesc, DescriptorTbl, RowDescriptor, SlotDescriptor,
    TupleDescriptor,
};
use nexus_exec::expr::{ExprNode, ScalarExpr};
use nexus_exec::node::{build_tree, ChildOpenOrder, ExecNode, ExecNodeBase, SelectNode};
use nexus_exec::plan::{PlanNodeDesc, PlanNodeKind};
use nexus_exec::value::ScalarValue;
use parking_lot::Mutex;

/// Installs the test subscriber once per process.
pub fn init_logging() {
    nexus_common::logging::try_init("nexus_exec=debug");
}

/// One tuple: `n INT`, `s STRING`.
pub fn test_tbl() -> Arc<DescriptorTbl> {
    Arc::new(
        DescriptorTbl::from_desc(DescriptorTableDesc {
            tuples: vec![TupleDescriptor::new(
                0,
                vec![
                    SlotDescriptor::not_null(0, "n", ColumnType::Int),
                    SlotDescriptor::nullable(1, "s", ColumnType::String),
                ],
            )],
        })
        .unwrap(),
    )
}

pub fn row_desc(tbl: &DescriptorTbl) -> Arc<RowDescriptor> {
    Arc::new(RowDescriptor::new(tbl, &[TupleId::new(0)]).unwrap())
}

pub fn context(config: ExecConfig) -> ExecContext {
    ExecContext::new(config, test_tbl()).unwrap()
}

/// Rows `(i, "row-i")` for `i` in `0..n`.
pub fn rows(n: i32) -> Vec<Vec<ScalarValue>> {
    (0..n)
        .map(|i| vec![ScalarValue::int(i), ScalarValue::string(format!("row-{i:03}"))])
        .collect()
}

pub fn values_node(
    tbl: &Arc<DescriptorTbl>,
    rows: Vec<Vec<ScalarValue>>,
    batch_sizes: Vec<usize>,
    eos_with_last_batch: bool,
) -> Box<dyn ExecNode> {
    let desc = PlanNodeDesc {
        node_id: PlanNodeId::new(0),
        limit: NO_LIMIT,
        conjuncts: Vec::new(),
        row_tuples: vec![TupleId::new(0)],
        children: Vec::new(),
        kind: PlanNodeKind::Values {
            rows,
            batch_sizes,
            eos_with_last_batch,
        },
    };
    let ctx = ExecContext::new(ExecConfig::default(), Arc::clone(tbl)).unwrap();
    build_tree(&desc, &ctx).unwrap()
}

pub fn select_node(
    tbl: &DescriptorTbl,
    child: Box<dyn ExecNode>,
    limit: i64,
    conjuncts: Vec<ExprNode>,
    extra: Option<Arc<dyn ScalarExpr>>,
) -> SelectNode {
    let mut base = ExecNodeBase::new(
        SelectNode::NAME,
        PlanNodeId::new(1),
        row_desc(tbl),
        limit,
        conjuncts,
        vec![child],
    )
    .unwrap();
    if let Some(expr) = extra {
        base = base.with_bound_conjunct(expr);
    }
    SelectNode::new(base).unwrap()
}

/// Calls `get_next` with fresh batches of `capacity` rows until end-of-stream.
///
/// Returns all rows and the `(rows, eos)` shape of every call.
pub fn drain(
    node: &mut dyn ExecNode,
    ctx: &ExecContext,
    capacity: usize,
) -> (Vec<Vec<ScalarValue>>, Vec<(usize, bool)>) {
    let mut rows = Vec::new();
    let mut calls = Vec::new();
    loop {
        let mut batch = ctx
            .new_row_batch_with_capacity(Arc::clone(node.row_desc()), capacity)
            .unwrap();
        let eos = node.get_next(ctx, &mut batch).unwrap();
        batch.validate().unwrap();
        calls.push((batch.num_rows(), eos));
        rows.extend(batch.to_values().unwrap());
        if eos {
            break;
        }
        assert!(calls.len() < 1000, "operator never reached end-of-stream");
    }
    (rows, calls)
}

/// Counts evaluations and passes every row.
#[derive(Debug, Default)]
pub struct CountingProbe {
    calls: AtomicUsize,
}

impl CountingProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScalarExpr for CountingProbe {
    fn evaluate(&self, _row: &RowRef<'_>) -> Result<ScalarValue, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ScalarValue::boolean(true))
    }

    fn return_type(&self) -> Option<ColumnType> {
        Some(ColumnType::Boolean)
    }
}

/// Shared record of lifecycle calls.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Wraps an operator and records every lifecycle call made on it.
#[derive(Debug)]
pub struct Recording {
    inner: Box<dyn ExecNode>,
    log: EventLog,
    cancel_after: Option<(usize, CancelHandle)>,
    get_next_calls: usize,
}

impl Recording {
    pub fn new(inner: Box<dyn ExecNode>, log: EventLog) -> Self {
        Self {
            inner,
            log,
            cancel_after: None,
            get_next_calls: 0,
        }
    }

    /// Requests cancellation from inside the `calls`-th `get_next`.
    pub fn cancel_after(mut self, calls: usize, handle: CancelHandle) -> Self {
        self.cancel_after = Some((calls, handle));
        self
    }

    fn record(&self, event: &str) {
        self.log.lock().push(format!("{}:{event}", self.inner.name()));
    }
}

impl ExecNode for Recording {
    fn base(&self) -> &ExecNodeBase {
        self.inner.base()
    }

    fn child_open_order(&self) -> ChildOpenOrder {
        self.inner.child_open_order()
    }

    fn prepare(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.record("prepare");
        self.inner.prepare(ctx)
    }

    fn open(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.record("open");
        self.inner.open(ctx)
    }

    fn get_next(&mut self, ctx: &ExecContext, batch: &mut RowBatch) -> ExecResult<bool> {
        self.record("get_next");
        self.get_next_calls += 1;
        let eos = self.inner.get_next(ctx, batch)?;
        if let Some((calls, handle)) = &self.cancel_after {
            if self.get_next_calls >= *calls {
                handle.cancel();
            }
        }
        Ok(eos)
    }

    fn reset(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.record("reset");
        self.inner.reset(ctx)
    }

    fn close(&mut self, ctx: &ExecContext) {
        self.record("close");
        self.inner.close(ctx);
    }
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().clone()
}
