//! Integration tests for the select operator: filtering, limits, batch
//! boundaries, faults and row ownership.

mod common;

use std::sync::Arc;

use common::*;
use nexus_common::config::ExecConfig;
use nexus_common::{ErrorKind, EvalError, ExecError, NO_LIMIT};
use nexus_exec::expr::{BinaryOp, ExprNode, ScalarExpr};
use nexus_exec::node::{ExecNode, NodeState};

fn opened(node: &mut dyn ExecNode, ctx: &nexus_exec::ExecContext) {
    node.prepare(ctx).unwrap();
    node.open(ctx).unwrap();
}

#[test]
fn test_limit_three_of_five() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let mut node = select_node(&tbl, values_node(&tbl, rows(5), vec![], true), 3, vec![], None);
    opened(&mut node, &ctx);

    let (out, calls) = drain(&mut node, &ctx, 16);
    assert_eq!(out, rows(3));
    assert_eq!(calls, vec![(3, true)]);
    node.close(&ctx);
}

#[test]
fn test_limit_reports_eos_with_last_row() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let mut node = select_node(&tbl, values_node(&tbl, rows(5), vec![], true), 3, vec![], None);
    opened(&mut node, &ctx);

    let (out, calls) = drain(&mut node, &ctx, 1);
    assert_eq!(out, rows(3));
    assert_eq!(calls, vec![(1, false), (1, false), (1, true)]);
    node.close(&ctx);
}

#[test]
fn test_limit_zero_never_pulls_child() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let log = EventLog::default();
    let child = Recording::new(values_node(&tbl, rows(5), vec![], true), Arc::clone(&log));
    let mut node = select_node(&tbl, Box::new(child), 0, vec![], None);
    opened(&mut node, &ctx);

    let (out, calls) = drain(&mut node, &ctx, 16);
    assert!(out.is_empty());
    assert_eq!(calls, vec![(0, true)]);
    assert!(!events(&log).iter().any(|e| e.ends_with("get_next")));
    node.close(&ctx);
}

#[test]
fn test_batch_boundaries_with_separate_eos() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let child = values_node(&tbl, rows(5), vec![2, 3, 0], false);
    let mut node = select_node(&tbl, child, NO_LIMIT, vec![], None);
    opened(&mut node, &ctx);

    let (out, calls) = drain(&mut node, &ctx, 2);
    assert_eq!(out, rows(5));
    assert_eq!(calls, vec![(2, false), (2, false), (1, true)]);
    node.close(&ctx);
}

#[test]
fn test_empty_child_batches_are_skipped() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let child = values_node(&tbl, rows(4), vec![0, 1, 0, 0, 3], false);
    let mut node = select_node(&tbl, child, NO_LIMIT, vec![], None);
    opened(&mut node, &ctx);

    let (out, calls) = drain(&mut node, &ctx, 16);
    assert_eq!(out, rows(4));
    assert_eq!(calls, vec![(4, true)]);
    node.close(&ctx);
}

#[test]
fn test_final_batch_with_eos_is_consumed() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());

    let child = values_node(&tbl, rows(5), vec![2, 3], true);
    let mut node = select_node(&tbl, child, NO_LIMIT, vec![], None);
    opened(&mut node, &ctx);
    let (out, calls) = drain(&mut node, &ctx, 16);
    assert_eq!(out, rows(5));
    assert_eq!(calls, vec![(5, true)]);
    node.close(&ctx);

    // Rows of the final batch count toward the limit.
    let child = values_node(&tbl, rows(5), vec![2, 3], true);
    let mut node = select_node(&tbl, child, 4, vec![], None);
    opened(&mut node, &ctx);
    let (out, _) = drain(&mut node, &ctx, 16);
    assert_eq!(out, rows(4));
    node.close(&ctx);
}

#[test]
fn test_output_is_filtered_subsequence() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let odd = ExprNode::binary(ExprNode::slot(0), BinaryOp::Modulo, ExprNode::lit(2))
        .equals(ExprNode::lit(1));
    let child = values_node(&tbl, rows(20), vec![3, 7, 1, 4], true);
    let mut node = select_node(&tbl, child, NO_LIMIT, vec![odd], None);
    opened(&mut node, &ctx);

    let (out, _) = drain(&mut node, &ctx, 3);
    let expected: Vec<_> = rows(20).into_iter().filter(|r| r[0].to_i64().unwrap() % 2 == 1).collect();
    assert_eq!(out, expected);
    assert_eq!(node.rows_returned(), 10);
    node.close(&ctx);
}

#[test]
fn test_limit_with_conjuncts() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let conjuncts = vec![
        ExprNode::slot(0).gt(ExprNode::lit(5)),
        ExprNode::slot(1).is_not_null(),
    ];
    let mut node = select_node(&tbl, values_node(&tbl, rows(10), vec![4], true), 2, conjuncts, None);
    opened(&mut node, &ctx);

    let (out, _) = drain(&mut node, &ctx, 8);
    assert_eq!(out, rows(8)[6..8].to_vec());
    node.close(&ctx);
}

#[test]
fn test_fault_on_fourth_row() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    // 10 / (n - 3) faults for n = 3, the fourth row.
    let divisor = ExprNode::binary(ExprNode::slot(0), BinaryOp::Minus, ExprNode::lit(3));
    let conjunct = ExprNode::binary(ExprNode::lit(10), BinaryOp::Divide, divisor)
        .gt(ExprNode::lit(-100));
    let mut node = select_node(&tbl, values_node(&tbl, rows(10), vec![], true), NO_LIMIT, vec![conjunct], None);
    opened(&mut node, &ctx);

    let mut batch = ctx
        .new_row_batch_with_capacity(Arc::clone(node.row_desc()), 16)
        .unwrap();
    let err = node.get_next(&ctx, &mut batch).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exec);
    assert!(matches!(err, ExecError::Eval(EvalError::DivisionByZero)));

    // Nothing at or past the faulting row was produced, and what was is readable.
    assert_eq!(batch.to_values().unwrap(), rows(3));
    batch.validate().unwrap();

    // The shared child batch was dropped with the faulting row, and the child
    // has no more rows.
    let mut after = ctx
        .new_row_batch_with_capacity(Arc::clone(node.row_desc()), 16)
        .unwrap();
    assert!(node.get_next(&ctx, &mut after).unwrap());
    assert!(after.is_empty());

    node.close(&ctx);
    node.close(&ctx);
    assert_eq!(node.state(), NodeState::Closed);
    drop(batch);
    drop(after);
    assert_eq!(ctx.mem_tracker().consumption(), 0);
}

#[test]
fn test_fault_in_deep_copy_mode() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let divisor = ExprNode::binary(ExprNode::slot(0), BinaryOp::Minus, ExprNode::lit(3));
    let conjunct = ExprNode::binary(ExprNode::lit(10), BinaryOp::Divide, divisor)
        .gt(ExprNode::lit(-100));
    let mut node = select_node(&tbl, values_node(&tbl, rows(10), vec![], true), NO_LIMIT, vec![conjunct], None);
    opened(&mut node, &ctx);

    // Output smaller than the child batch, so rows are copied one by one.
    let mut first = ctx
        .new_row_batch_with_capacity(Arc::clone(node.row_desc()), 2)
        .unwrap();
    assert!(!node.get_next(&ctx, &mut first).unwrap());
    assert_eq!(first.to_values().unwrap(), rows(2));

    let mut second = ctx
        .new_row_batch_with_capacity(Arc::clone(node.row_desc()), 2)
        .unwrap();
    assert!(node.get_next(&ctx, &mut second).is_err());
    assert_eq!(second.to_values().unwrap(), rows(3)[2..].to_vec());

    // Copied rows leave the child batch intact, so the cursor is still on the
    // faulting row.
    let mut third = ctx
        .new_row_batch_with_capacity(Arc::clone(node.row_desc()), 2)
        .unwrap();
    let err = node.get_next(&ctx, &mut third).unwrap_err();
    assert!(matches!(err, ExecError::Eval(EvalError::DivisionByZero)));
    assert!(third.is_empty());
    node.close(&ctx);
}

#[test]
fn test_conjuncts_short_circuit() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());

    let probe = Arc::new(CountingProbe::default());
    let extra: Arc<dyn ScalarExpr> = probe.clone();
    let never = ExprNode::slot(0).gt(ExprNode::lit(100));
    let mut node = select_node(&tbl, values_node(&tbl, rows(10), vec![], true), NO_LIMIT, vec![never], Some(extra));
    opened(&mut node, &ctx);
    let (out, _) = drain(&mut node, &ctx, 16);
    assert!(out.is_empty());
    assert_eq!(probe.calls(), 0);
    node.close(&ctx);

    let probe = Arc::new(CountingProbe::default());
    let extra: Arc<dyn ScalarExpr> = probe.clone();
    let some = ExprNode::slot(0).lt(ExprNode::lit(5));
    let mut node = select_node(&tbl, values_node(&tbl, rows(10), vec![], true), NO_LIMIT, vec![some], Some(extra));
    opened(&mut node, &ctx);
    let (out, _) = drain(&mut node, &ctx, 16);
    assert_eq!(out.len(), 5);
    assert_eq!(probe.calls(), 5);
    node.close(&ctx);
}

#[test]
fn test_reset_replays_identical_output() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::with_batch_size(4));
    let even = ExprNode::binary(ExprNode::slot(0), BinaryOp::Modulo, ExprNode::lit(2))
        .equals(ExprNode::lit(0));
    let child = values_node(&tbl, rows(12), vec![5, 0, 2], false);
    let mut node = select_node(&tbl, child, 4, vec![even], None);
    opened(&mut node, &ctx);

    let (first, first_calls) = drain(&mut node, &ctx, 3);
    let baseline = ctx.mem_tracker().consumption();
    for _ in 0..3 {
        node.reset(&ctx).unwrap();
        assert_eq!(node.rows_returned(), 0);
        node.open(&ctx).unwrap();
        let (again, calls) = drain(&mut node, &ctx, 3);
        assert_eq!(again, first);
        assert_eq!(calls, first_calls);
        assert_eq!(ctx.mem_tracker().consumption(), baseline);
    }
    assert_eq!(first.len(), 4);
    node.close(&ctx);
    assert_eq!(ctx.mem_tracker().consumption(), 0);
}

#[test]
fn test_reset_mid_stream() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let mut node = select_node(&tbl, values_node(&tbl, rows(6), vec![], true), NO_LIMIT, vec![], None);
    opened(&mut node, &ctx);

    let mut batch = ctx
        .new_row_batch_with_capacity(Arc::clone(node.row_desc()), 2)
        .unwrap();
    assert!(!node.get_next(&ctx, &mut batch).unwrap());

    node.reset(&ctx).unwrap();
    node.open(&ctx).unwrap();
    let (out, _) = drain(&mut node, &ctx, 4);
    assert_eq!(out, rows(6));
    node.close(&ctx);
}

#[test]
fn test_eos_is_idempotent() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let mut node = select_node(&tbl, values_node(&tbl, rows(3), vec![], true), NO_LIMIT, vec![], None);
    opened(&mut node, &ctx);
    drain(&mut node, &ctx, 8);

    for _ in 0..3 {
        let mut batch = ctx
            .new_row_batch_with_capacity(Arc::clone(node.row_desc()), 8)
            .unwrap();
        assert!(node.get_next(&ctx, &mut batch).unwrap());
        assert!(batch.is_empty());
    }
    node.close(&ctx);
}

#[test]
fn test_output_batches_outlive_child_batches() {
    init_logging();
    let tbl = test_tbl();
    let config = ExecConfig {
        pool_initial_chunk_size: 16,
        pool_max_chunk_size: 64,
        ..ExecConfig::with_batch_size(5)
    };
    let ctx = context(config);
    let child = values_node(&tbl, rows(23), vec![5, 4, 5, 2, 5, 2], true);
    let mut node = select_node(&tbl, child, NO_LIMIT, vec![ExprNode::slot(1).is_not_null()], None);
    opened(&mut node, &ctx);

    // Keep every output batch alive while the select keeps pulling.
    let mut kept = Vec::new();
    loop {
        let mut batch = ctx
            .new_row_batch_with_capacity(Arc::clone(node.row_desc()), 3)
            .unwrap();
        let eos = node.get_next(&ctx, &mut batch).unwrap();
        kept.push(batch);
        if eos {
            break;
        }
    }

    let mut out = Vec::new();
    for batch in &kept {
        batch.validate().unwrap();
        out.extend(batch.to_values().unwrap());
    }
    assert_eq!(out, rows(23));

    node.close(&ctx);
    for batch in &kept {
        batch.validate().unwrap();
    }
    drop(kept);
    assert_eq!(ctx.mem_tracker().consumption(), 0);
}

#[test]
fn test_select_over_select() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::with_batch_size(3));
    let inner = select_node(
        &tbl,
        values_node(&tbl, rows(30), vec![7], true),
        NO_LIMIT,
        vec![ExprNode::slot(0).gt(ExprNode::lit(4))],
        None,
    );
    let mut outer = select_node(
        &tbl,
        Box::new(inner),
        5,
        vec![ExprNode::slot(0).lt(ExprNode::lit(20))],
        None,
    );
    opened(&mut outer, &ctx);

    let (out, _) = drain(&mut outer, &ctx, 2);
    assert_eq!(out, rows(10)[5..10].to_vec());
    outer.close(&ctx);
    assert_eq!(outer.children()[0].state(), NodeState::Closed);
}

#[test]
fn test_cancelled_mid_stream() {
    init_logging();
    let tbl = test_tbl();
    let ctx = context(ExecConfig::default());
    let log = EventLog::default();
    let child = Recording::new(values_node(&tbl, rows(10), vec![2], true), Arc::clone(&log))
        .cancel_after(1, ctx.cancel_handle().clone());
    let mut node = select_node(&tbl, Box::new(child), NO_LIMIT, vec![], None);
    opened(&mut node, &ctx);

    let mut batch = ctx
        .new_row_batch_with_capacity(Arc::clone(node.row_desc()), 16)
        .unwrap();
    let err = node.get_next(&ctx, &mut batch).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(
        events(&log).iter().filter(|e| e.ends_with("get_next")).count(),
        1
    );

    node.close(&ctx);
    assert_eq!(node.state(), NodeState::Closed);
    assert!(events(&log).contains(&"VALUES:close".to_string()));
}
