//! In-memory constant rows.

use nexus_common::{ExecError, ExecResult};
use tracing::debug;

use super::{ChildOpenOrder, ExecNode, ExecNodeBase};
use crate::batch::RowBatch;
use crate::context::ExecContext;
use crate::value::ScalarValue;

/// Leaf operator that emits a fixed list of rows.
///
/// `batch_sizes[i]` caps how many source rows call `i` scans; once the list is
/// used up every call scans as many rows as fit. A zero entry produces an empty,
/// non-final batch. End-of-stream is reported together with the last rows when
/// `eos_with_last_batch` is set, otherwise on the first call that finds nothing
/// left to scan. Conjuncts and the limit apply to the scanned rows.
#[derive(Debug)]
pub struct ValuesNode {
    base: ExecNodeBase,
    rows: Vec<Vec<ScalarValue>>,
    batch_sizes: Vec<usize>,
    eos_with_last_batch: bool,
    next_row: usize,
    calls: usize,
    eos: bool,
}

impl ValuesNode {
    /// Operator name.
    pub const NAME: &'static str = "VALUES";

    /// Creates a leaf over `rows`.
    pub fn new(
        base: ExecNodeBase,
        rows: Vec<Vec<ScalarValue>>,
        batch_sizes: Vec<usize>,
        eos_with_last_batch: bool,
    ) -> ExecResult<Self> {
        Self::check(&base)?;
        Ok(Self {
            base,
            rows,
            batch_sizes,
            eos_with_last_batch,
            next_row: 0,
            calls: 0,
            eos: false,
        })
    }

    /// Checks that `base` has no children.
    pub fn check(base: &ExecNodeBase) -> ExecResult<()> {
        if !base.children().is_empty() {
            return Err(ExecError::prepare(format!(
                "{} cannot have children",
                base.label()
            )));
        }
        Ok(())
    }

    /// Scans up to `budget` rows into `batch`, returning how many were scanned.
    fn scan(&mut self, batch: &mut RowBatch, budget: usize) -> ExecResult<usize> {
        let mut scanned = 0;
        while scanned < budget && self.next_row < self.rows.len() && !batch.at_capacity() {
            // A rejected row is popped right after its push, which also
            // releases its arena bytes.
            batch.push_values(&self.rows[self.next_row])?;
            self.next_row += 1;
            scanned += 1;

            let passed = self.base.conjuncts().eval(&batch.row(batch.num_rows() - 1));
            match passed {
                Ok(true) => {}
                Ok(false) => {
                    batch.pop_row();
                    continue;
                }
                Err(e) => {
                    batch.pop_row();
                    return Err(e);
                }
            }

            self.base.add_rows_returned(1);
            if self.base.reached_limit() {
                self.eos = true;
                break;
            }
        }
        Ok(scanned)
    }
}

impl ExecNode for ValuesNode {
    fn base(&self) -> &ExecNodeBase {
        &self.base
    }

    fn child_open_order(&self) -> ChildOpenOrder {
        ChildOpenOrder::BeforeSelf
    }

    fn prepare(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.base.prepare(ctx)?;

        // Reject rows that do not fit the layout before any batch is filled.
        for (i, row) in self.rows.iter().enumerate() {
            RowBatch::check_values(self.base.row_desc(), row).map_err(|e| {
                ExecError::prepare(format!("{} row {i}: {e}", self.base.label()))
            })?;
        }
        Ok(())
    }

    fn open(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.base.begin_open(ctx)?;
        self.base.open_children(ctx)?;
        self.next_row = 0;
        self.calls = 0;
        self.eos = false;
        self.base.finish_open();
        Ok(())
    }

    fn get_next(&mut self, ctx: &ExecContext, batch: &mut RowBatch) -> ExecResult<bool> {
        self.base.begin_get_next(ctx)?;
        if self.eos || self.base.reached_limit() {
            self.eos = true;
            return Ok(true);
        }

        let budget = self.batch_sizes.get(self.calls).copied().unwrap_or(usize::MAX);
        self.calls += 1;
        let scanned = self.scan(batch, budget)?;

        let exhausted = self.next_row >= self.rows.len();
        if exhausted && (self.eos_with_last_batch || scanned == 0) {
            self.eos = true;
        }
        if self.eos {
            debug!(node_id = %self.base.id(), rows_returned = self.base.rows_returned(), "end of stream");
        }
        Ok(self.eos)
    }

    fn reset(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.base.reset(ctx)?;
        self.next_row = 0;
        self.calls = 0;
        self.eos = false;
        Ok(())
    }

    fn close(&mut self, ctx: &ExecContext) {
        self.base.close(ctx);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::descriptors::{
        ColumnType, DescriptorTableDesc, DescriptorTbl, RowDescriptor, SlotDescriptor,
        TupleDescriptor,
    };
    use crate::expr::ExprNode;
    use nexus_common::config::ExecConfig;
    use nexus_common::{ErrorKind, PlanNodeId, TupleId, NO_LIMIT};

    fn setup(
        rows: Vec<Vec<ScalarValue>>,
        batch_sizes: Vec<usize>,
        eos_with_last_batch: bool,
        limit: i64,
        conjuncts: Vec<ExprNode>,
    ) -> (ExecContext, ValuesNode) {
        let tbl = DescriptorTbl::from_desc(DescriptorTableDesc {
            tuples: vec![TupleDescriptor::new(
                0,
                vec![SlotDescriptor::nullable(0, "n", ColumnType::Int)],
            )],
        })
        .unwrap();
        let row_desc = Arc::new(RowDescriptor::new(&tbl, &[TupleId::new(0)]).unwrap());
        let ctx = ExecContext::new(ExecConfig::with_batch_size(8), Arc::new(tbl)).unwrap();
        let base = ExecNodeBase::new(
            ValuesNode::NAME,
            PlanNodeId::new(0),
            row_desc,
            limit,
            conjuncts,
            vec![],
        )
        .unwrap();
        let node = ValuesNode::new(base, rows, batch_sizes, eos_with_last_batch).unwrap();
        (ctx, node)
    }

    fn ints(n: i32) -> Vec<Vec<ScalarValue>> {
        (0..n).map(|i| vec![ScalarValue::int(i)]).collect()
    }

    fn next(ctx: &ExecContext, node: &mut ValuesNode) -> (usize, bool) {
        let mut batch = ctx.new_row_batch(Arc::clone(node.row_desc())).unwrap();
        let eos = node.get_next(ctx, &mut batch).unwrap();
        (batch.num_rows(), eos)
    }

    #[test]
    fn test_scripted_batches_with_separate_eos() {
        let (ctx, mut node) = setup(ints(5), vec![2, 3, 0], false, NO_LIMIT, vec![]);
        node.prepare(&ctx).unwrap();
        node.open(&ctx).unwrap();
        assert_eq!(next(&ctx, &mut node), (2, false));
        assert_eq!(next(&ctx, &mut node), (3, false));
        assert_eq!(next(&ctx, &mut node), (0, true));
        assert_eq!(next(&ctx, &mut node), (0, true));
        node.close(&ctx);
    }

    #[test]
    fn test_eos_with_last_batch() {
        let (ctx, mut node) = setup(ints(5), vec![2], true, NO_LIMIT, vec![]);
        node.prepare(&ctx).unwrap();
        node.open(&ctx).unwrap();
        assert_eq!(next(&ctx, &mut node), (2, false));
        assert_eq!(next(&ctx, &mut node), (3, true));
        node.close(&ctx);
    }

    #[test]
    fn test_conjuncts_and_limit() {
        let (ctx, mut node) = setup(
            ints(10),
            vec![],
            true,
            2,
            vec![ExprNode::slot(0).gt(ExprNode::lit(5))],
        );
        node.prepare(&ctx).unwrap();
        node.open(&ctx).unwrap();
        let mut batch = ctx.new_row_batch(Arc::clone(node.row_desc())).unwrap();
        assert!(node.get_next(&ctx, &mut batch).unwrap());
        assert_eq!(
            batch.to_values().unwrap(),
            vec![vec![ScalarValue::int(6)], vec![ScalarValue::int(7)]]
        );
        node.close(&ctx);
    }

    #[test]
    fn test_reset_rewinds() {
        let (ctx, mut node) = setup(ints(3), vec![], true, NO_LIMIT, vec![]);
        node.prepare(&ctx).unwrap();
        node.open(&ctx).unwrap();
        assert_eq!(next(&ctx, &mut node), (3, true));
        node.reset(&ctx).unwrap();
        node.open(&ctx).unwrap();
        assert_eq!(next(&ctx, &mut node), (3, true));
        node.close(&ctx);
    }

    #[test]
    fn test_prepare_does_not_charge_memory() {
        let tbl = DescriptorTbl::from_desc(DescriptorTableDesc {
            tuples: vec![TupleDescriptor::new(
                0,
                vec![SlotDescriptor::nullable(0, "s", ColumnType::String)],
            )],
        })
        .unwrap();
        let row_desc = Arc::new(RowDescriptor::new(&tbl, &[TupleId::new(0)]).unwrap());
        let config = ExecConfig::with_batch_size(4).mem_limit(64);
        let ctx = ExecContext::new(config, Arc::new(tbl)).unwrap();
        let base =
            ExecNodeBase::new(ValuesNode::NAME, PlanNodeId::new(0), row_desc, NO_LIMIT, vec![], vec![])
                .unwrap();
        let rows = vec![vec![ScalarValue::string("a")], vec![ScalarValue::string("b")]];
        let mut node = ValuesNode::new(base, rows, vec![], true).unwrap();

        node.prepare(&ctx).unwrap();
        assert_eq!(ctx.mem_tracker().consumption(), 0);
        node.close(&ctx);
    }

    #[test]
    fn test_rejected_rows_leave_no_arena_bytes() {
        let tbl = DescriptorTbl::from_desc(DescriptorTableDesc {
            tuples: vec![TupleDescriptor::new(
                0,
                vec![
                    SlotDescriptor::not_null(0, "n", ColumnType::Int),
                    SlotDescriptor::nullable(1, "s", ColumnType::String),
                ],
            )],
        })
        .unwrap();
        let row_desc = Arc::new(RowDescriptor::new(&tbl, &[TupleId::new(0)]).unwrap());
        let ctx = ExecContext::new(ExecConfig::with_batch_size(4), Arc::new(tbl)).unwrap();
        let base = ExecNodeBase::new(
            ValuesNode::NAME,
            PlanNodeId::new(0),
            row_desc,
            NO_LIMIT,
            vec![ExprNode::slot(0).lt(ExprNode::lit(0))],
            vec![],
        )
        .unwrap();
        let rows = (0..20_000)
            .map(|i| vec![ScalarValue::int(i), ScalarValue::string(format!("rejected-{i}"))])
            .collect();
        let mut node = ValuesNode::new(base, rows, vec![], true).unwrap();
        node.prepare(&ctx).unwrap();
        node.open(&ctx).unwrap();

        let mut batch = ctx.new_row_batch(Arc::clone(node.row_desc())).unwrap();
        assert!(node.get_next(&ctx, &mut batch).unwrap());
        assert!(batch.is_empty());
        assert_eq!(batch.pool().allocated_bytes(), 0);
        assert_eq!(batch.pool().reserved_bytes(), 0);
        node.close(&ctx);
    }

    #[test]
    fn test_bad_rows_rejected_in_prepare() {
        let (ctx, mut node) = setup(
            vec![vec![ScalarValue::string("x")]],
            vec![],
            true,
            NO_LIMIT,
            vec![],
        );
        let err = node.prepare(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Prepare);
        node.close(&ctx);
    }
}
