//! Expression binding and evaluation.

use std::cmp::Ordering;
use std::fmt;

use nexus_common::{EvalError, ExecError, ExecResult};

use super::{BinaryOp, ExprNode};
use crate::batch::RowRef;
use crate::descriptors::{ColumnType, RowDescriptor};
use crate::value::ScalarValue;

/// An expression that can be evaluated against a row.
///
/// Implementations must be side-effect free with respect to the row: the same
/// row always yields the same value.
pub trait ScalarExpr: fmt::Debug + Send + Sync {
    /// Evaluates the expression against `row`.
    fn evaluate(&self, row: &RowRef<'_>) -> Result<ScalarValue, EvalError>;

    /// Returns the result type, or `None` if the expression is a bare NULL.
    fn return_type(&self) -> Option<ColumnType>;
}

/// An expression resolved against a row layout.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    /// Reads the slot at `index`.
    Slot {
        /// Position of the slot within the row.
        index: usize,
        /// Slot type.
        ty: ColumnType,
    },
    /// A constant.
    Literal(ScalarValue),
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<BoundExpr>,
        /// Right operand.
        right: Box<BoundExpr>,
        /// Result type.
        ty: Option<ColumnType>,
    },
    /// Logical negation.
    Not(Box<BoundExpr>),
    /// NULL test.
    IsNull {
        /// The tested expression.
        operand: Box<BoundExpr>,
        /// True for `IS NOT NULL`.
        negated: bool,
    },
}

/// Resolves slot references and type checks `expr`.
pub fn bind_expr(expr: &ExprNode, row_desc: &RowDescriptor) -> ExecResult<BoundExpr> {
    match expr {
        ExprNode::SlotRef { slot } => {
            let index = row_desc.slot_index(*slot).ok_or_else(|| {
                ExecError::prepare(format!("slot {slot} is not part of the row layout"))
            })?;
            let ty = row_desc
                .column_type(index)
                .ok_or_else(|| ExecError::internal(format!("slot {slot} has no type")))?;
            Ok(BoundExpr::Slot { index, ty })
        }

        ExprNode::Literal { value } => Ok(BoundExpr::Literal(value.clone())),

        ExprNode::Binary { op, left, right } => {
            let left = bind_expr(left, row_desc)?;
            let right = bind_expr(right, row_desc)?;
            let ty = binary_result_type(*op, left.return_type(), right.return_type())?;
            Ok(BoundExpr::Binary {
                op: *op,
                left: Box::new(left),
                right: Box::new(right),
                ty,
            })
        }

        ExprNode::Not { operand } => {
            let operand = bind_expr(operand, row_desc)?;
            expect_boolean("NOT", operand.return_type())?;
            Ok(BoundExpr::Not(Box::new(operand)))
        }

        ExprNode::IsNull { operand, negated } => Ok(BoundExpr::IsNull {
            operand: Box::new(bind_expr(operand, row_desc)?),
            negated: *negated,
        }),
    }
}

fn type_name(ty: Option<ColumnType>) -> &'static str {
    ty.map_or("NULL", |ty| ty.name())
}

fn expect_boolean(context: &str, ty: Option<ColumnType>) -> ExecResult<()> {
    match ty {
        None | Some(ColumnType::Boolean) => Ok(()),
        Some(other) => Err(ExecError::prepare(format!(
            "{context} expects BOOLEAN, got {other}"
        ))),
    }
}

fn binary_result_type(
    op: BinaryOp,
    left: Option<ColumnType>,
    right: Option<ColumnType>,
) -> ExecResult<Option<ColumnType>> {
    let mismatch = || {
        ExecError::prepare(format!(
            "cannot apply '{op}' to {} and {}",
            type_name(left),
            type_name(right)
        ))
    };

    if op.is_logical() {
        expect_boolean(op.symbol(), left)?;
        expect_boolean(op.symbol(), right)?;
        return Ok(Some(ColumnType::Boolean));
    }

    if op.is_comparison() {
        if let (Some(l), Some(r)) = (left, right) {
            if !l.is_comparable_with(&r) {
                return Err(mismatch());
            }
        }
        return Ok(Some(ColumnType::Boolean));
    }

    let numeric = |ty: Option<ColumnType>| ty.map_or(true, |ty| ty.is_numeric());
    if !numeric(left) || !numeric(right) {
        return Err(mismatch());
    }

    // Int -> BigInt -> Double
    let widest = [left, right]
        .into_iter()
        .flatten()
        .max_by_key(|ty| match ty {
            ColumnType::Double => 2,
            ColumnType::BigInt => 1,
            _ => 0,
        });
    Ok(widest)
}

impl ScalarExpr for BoundExpr {
    fn evaluate(&self, row: &RowRef<'_>) -> Result<ScalarValue, EvalError> {
        match self {
            BoundExpr::Slot { index, .. } => row.value(*index),

            BoundExpr::Literal(value) => Ok(value.clone()),

            BoundExpr::Binary {
                op: BinaryOp::And,
                left,
                right,
                ..
            } => {
                let l = left.evaluate(row)?.to_bool();
                if l == Some(false) {
                    return Ok(ScalarValue::Boolean(false));
                }
                let r = right.evaluate(row)?.to_bool();
                Ok(match (l, r) {
                    (_, Some(false)) => ScalarValue::Boolean(false),
                    (Some(true), Some(true)) => ScalarValue::Boolean(true),
                    _ => ScalarValue::Null,
                })
            }

            BoundExpr::Binary {
                op: BinaryOp::Or,
                left,
                right,
                ..
            } => {
                let l = left.evaluate(row)?.to_bool();
                if l == Some(true) {
                    return Ok(ScalarValue::Boolean(true));
                }
                let r = right.evaluate(row)?.to_bool();
                Ok(match (l, r) {
                    (_, Some(true)) => ScalarValue::Boolean(true),
                    (Some(false), Some(false)) => ScalarValue::Boolean(false),
                    _ => ScalarValue::Null,
                })
            }

            BoundExpr::Binary {
                op,
                left,
                right,
                ty,
            } => {
                let l = left.evaluate(row)?;
                let r = right.evaluate(row)?;
                if l.is_null() || r.is_null() {
                    return Ok(ScalarValue::Null);
                }
                if op.is_comparison() {
                    Ok(evaluate_comparison(*op, &l, &r))
                } else {
                    evaluate_arithmetic(*op, *ty, &l, &r)
                }
            }

            BoundExpr::Not(operand) => Ok(match operand.evaluate(row)?.to_bool() {
                Some(b) => ScalarValue::Boolean(!b),
                None => ScalarValue::Null,
            }),

            BoundExpr::IsNull { operand, negated } => {
                let is_null = operand.evaluate(row)?.is_null();
                Ok(ScalarValue::Boolean(is_null != *negated))
            }
        }
    }

    fn return_type(&self) -> Option<ColumnType> {
        match self {
            BoundExpr::Slot { ty, .. } => Some(*ty),
            BoundExpr::Literal(value) => value.column_type(),
            BoundExpr::Binary { ty, .. } => *ty,
            BoundExpr::Not(_) | BoundExpr::IsNull { .. } => Some(ColumnType::Boolean),
        }
    }
}

fn evaluate_comparison(op: BinaryOp, left: &ScalarValue, right: &ScalarValue) -> ScalarValue {
    let Some(ord) = left.sql_cmp(right) else {
        return ScalarValue::Null;
    };
    let result = match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::NotEq => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::LtEq => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::GtEq => ord != Ordering::Less,
        _ => return ScalarValue::Null,
    };
    ScalarValue::Boolean(result)
}

fn mismatch(expected: &str, actual: &ScalarValue) -> EvalError {
    EvalError::TypeMismatch {
        expected: expected.to_string(),
        actual: type_name(actual.column_type()).to_string(),
    }
}

/// Integer arithmetic is checked; floating point division by zero is NULL.
fn evaluate_arithmetic(
    op: BinaryOp,
    ty: Option<ColumnType>,
    left: &ScalarValue,
    right: &ScalarValue,
) -> Result<ScalarValue, EvalError> {
    match ty {
        Some(ColumnType::Double) => {
            let a = left.to_f64().ok_or_else(|| mismatch("DOUBLE", left))?;
            let b = right.to_f64().ok_or_else(|| mismatch("DOUBLE", right))?;
            if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b == 0.0 {
                return Ok(ScalarValue::Null);
            }
            let result = match op {
                BinaryOp::Plus => a + b,
                BinaryOp::Minus => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                BinaryOp::Modulo => a % b,
                _ => return Err(mismatch("arithmetic operator", left)),
            };
            Ok(ScalarValue::Double(result))
        }

        Some(ty @ (ColumnType::Int | ColumnType::BigInt)) => {
            let a = left.to_i64().ok_or_else(|| mismatch(ty.name(), left))?;
            let b = right.to_i64().ok_or_else(|| mismatch(ty.name(), right))?;
            let overflow = EvalError::Overflow { op: op.symbol() };
            let result = match op {
                BinaryOp::Plus => a.checked_add(b),
                BinaryOp::Minus => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide if b == 0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Modulo if b == 0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Divide => a.checked_div(b),
                BinaryOp::Modulo => a.checked_rem(b),
                _ => return Err(mismatch("arithmetic operator", left)),
            }
            .ok_or_else(|| overflow.clone())?;

            if ty == ColumnType::Int {
                i32::try_from(result)
                    .map(ScalarValue::Int)
                    .map_err(|_| overflow)
            } else {
                Ok(ScalarValue::BigInt(result))
            }
        }

        _ => Ok(ScalarValue::Null),
    }
}
