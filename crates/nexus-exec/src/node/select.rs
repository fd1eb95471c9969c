//! Filter and limit operator.

use nexus_common::{ExecError, ExecResult};
use tracing::{debug, trace};

use super::{ChildOpenOrder, ExecNode, ExecNodeBase, NodeState};
use crate::batch::RowBatch;
use crate::context::ExecContext;

/// Passes through the rows of its single child that satisfy every conjunct,
/// stopping once the limit is reached.
///
/// The select keeps one child batch between calls together with a cursor into
/// it: a single child batch may feed several `get_next` calls, and a single
/// call may drain several child batches.
///
/// # Row transfer
///
/// When every remaining row of the child batch fits into the output batch, the
/// passing rows are shared and the child batch's arena is handed to the output
/// with [`RowBatch::transfer_arena_ownership`] as soon as the child batch is
/// drained, the limit is hit, or a conjunct fails. Otherwise each passing row
/// is deep-copied with [`RowBatch::copy_row_into`]. Either way the output never
/// references an arena the select still owns.
///
/// Children are opened before the child batch is allocated.
#[derive(Debug)]
pub struct SelectNode {
    base: ExecNodeBase,
    /// Buffered child output. Taken out for the duration of `get_next`.
    child_batch: Option<RowBatch>,
    /// Next unread row of `child_batch`.
    child_row_idx: usize,
    child_eos: bool,
    eos: bool,
}

impl SelectNode {
    /// Operator name.
    pub const NAME: &'static str = "SELECT";

    /// Creates a select over the single child held by `base`.
    pub fn new(base: ExecNodeBase) -> ExecResult<Self> {
        Self::check(&base)?;
        Ok(Self {
            base,
            child_batch: None,
            child_row_idx: 0,
            child_eos: false,
            eos: false,
        })
    }

    /// Checks that `base` holds exactly one child with the same row layout.
    pub fn check(base: &ExecNodeBase) -> ExecResult<()> {
        let child = match base.children() {
            [child] => child,
            children => {
                return Err(ExecError::prepare(format!(
                    "{} needs exactly one child, got {}",
                    base.label(),
                    children.len()
                )))
            }
        };
        if !base.row_desc().is_compatible(child.row_desc()) {
            return Err(ExecError::prepare(format!(
                "{}: output layout {:?} differs from child layout {:?}",
                base.label(),
                base.row_desc().tuple_ids(),
                child.row_desc().tuple_ids()
            )));
        }
        Ok(())
    }

    /// Fills `output` from the buffered child batch, pulling new child batches
    /// as needed. Returns true at end-of-stream.
    fn fill(
        &mut self,
        ctx: &ExecContext,
        child_batch: &mut RowBatch,
        output: &mut RowBatch,
    ) -> ExecResult<bool> {
        loop {
            ctx.check_cancelled()?;

            if self.child_row_idx >= child_batch.num_rows() {
                child_batch.reset();
                self.child_row_idx = 0;
                if self.child_eos {
                    return Ok(true);
                }
                if output.at_capacity() {
                    return Ok(false);
                }

                self.child_eos = self.base.child_mut(0)?.get_next(ctx, child_batch)?;
                trace!(
                    node_id = %self.base.id(),
                    rows = child_batch.num_rows(),
                    child_eos = self.child_eos,
                    "pulled child batch"
                );
                continue;
            }

            if output.at_capacity() {
                return Ok(false);
            }

            let share = child_batch.num_rows() - self.child_row_idx <= output.remaining_capacity();
            let output_rows = output.num_rows();
            let copied = self.copy_rows(child_batch, output, share);
            if share {
                // The arena goes with the shared rows even on a fault, so the
                // rest of the child batch is unreadable and is dropped.
                if output.num_rows() > output_rows {
                    child_batch.transfer_arena_ownership(output);
                }
                child_batch.reset();
                self.child_row_idx = 0;
            }
            copied?;

            if self.base.reached_limit() {
                child_batch.reset();
                self.child_row_idx = 0;
                return Ok(true);
            }
            if self.child_row_idx < child_batch.num_rows() {
                return Ok(false);
            }
        }
    }

    /// Moves passing rows from the cursor onwards into `output` until the child
    /// batch is drained, the output is full or the limit is reached.
    ///
    /// On a conjunct fault the cursor stays on the faulting row. In share mode
    /// the caller then discards the child batch, faulting row included.
    fn copy_rows(
        &mut self,
        child_batch: &RowBatch,
        output: &mut RowBatch,
        share: bool,
    ) -> ExecResult<()> {
        while self.child_row_idx < child_batch.num_rows() && !output.at_capacity() {
            let index = self.child_row_idx;
            if !self.base.conjuncts().eval(&child_batch.row(index))? {
                self.child_row_idx += 1;
                continue;
            }

            if share {
                child_batch.share_row_into(index, output)?;
            } else {
                child_batch.copy_row_into(index, output)?;
            }
            self.child_row_idx += 1;
            self.base.add_rows_returned(1);

            if self.base.reached_limit() {
                break;
            }
        }
        Ok(())
    }
}

impl ExecNode for SelectNode {
    fn base(&self) -> &ExecNodeBase {
        &self.base
    }

    fn child_open_order(&self) -> ChildOpenOrder {
        ChildOpenOrder::BeforeSelf
    }

    fn prepare(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.base.prepare(ctx)
    }

    fn open(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.base.begin_open(ctx)?;
        self.base.open_children(ctx)?;

        if self.child_batch.is_none() {
            let child_desc = self.base.child_mut(0)?.row_desc().clone();
            let batch = ctx.new_row_batch(child_desc).map_err(ExecError::into_open)?;
            self.child_batch = Some(batch);
        }
        self.child_row_idx = 0;
        self.child_eos = false;
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

        let mut child_batch = self
            .child_batch
            .take()
            .ok_or_else(|| ExecError::internal(format!("{} has no child batch", self.base.label())))?;
        let result = self.fill(ctx, &mut child_batch, batch);
        self.child_batch = Some(child_batch);

        if result? {
            self.eos = true;
            debug!(
                node_id = %self.base.id(),
                rows_returned = self.base.rows_returned(),
                "end of stream"
            );
        }
        Ok(self.eos)
    }

    fn reset(&mut self, ctx: &ExecContext) -> ExecResult<()> {
        self.base.reset(ctx)?;
        if let Some(batch) = self.child_batch.as_mut() {
            batch.reset();
        }
        self.child_row_idx = 0;
        self.child_eos = false;
        self.eos = false;
        Ok(())
    }

    fn close(&mut self, ctx: &ExecContext) {
        if self.base.state() == NodeState::Closed {
            return;
        }
        self.child_batch = None;
        self.base.close(ctx);
    }
}
