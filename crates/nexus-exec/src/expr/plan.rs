//! Serialized expression trees.

use std::fmt;

use nexus_common::SlotId;
use serde::{Deserialize, Serialize};

use crate::value::ScalarValue;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    NotEq,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    LtEq,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    GtEq,
    /// `+`
    #[serde(rename = "+")]
    Plus,
    /// `-`
    #[serde(rename = "-")]
    Minus,
    /// `*`
    #[serde(rename = "*")]
    Multiply,
    /// `/`
    #[serde(rename = "/")]
    Divide,
    /// `%`
    #[serde(rename = "%")]
    Modulo,
    /// `AND`
    #[serde(rename = "and")]
    And,
    /// `OR`
    #[serde(rename = "or")]
    Or,
}

impl BinaryOp {
    /// Returns true for comparison operators.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    /// Returns true for arithmetic operators.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo
        )
    }

    /// Returns true for AND and OR.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Returns the SQL symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// An expression as it appears in a serialized plan.
///
/// ```json
/// {"expr": "binary", "op": ">", "left": {"expr": "slot_ref", "slot": 0},
///  "right": {"expr": "literal", "value": {"int": 3}}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum ExprNode {
    /// Reads a slot of the input row.
    SlotRef {
        /// The slot to read.
        slot: SlotId,
    },
    /// A constant.
    Literal {
        /// The constant value.
        value: ScalarValue,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<ExprNode>,
        /// Right operand.
        right: Box<ExprNode>,
    },
    /// Logical negation.
    Not {
        /// The negated expression.
        operand: Box<ExprNode>,
    },
    /// `IS NULL`, or `IS NOT NULL` when negated.
    IsNull {
        /// The tested expression.
        operand: Box<ExprNode>,
        /// True for `IS NOT NULL`.
        #[serde(default)]
        negated: bool,
    },
}

impl ExprNode {
    /// Creates a slot reference.
    pub fn slot(id: u32) -> Self {
        ExprNode::SlotRef {
            slot: SlotId::new(id),
        }
    }

    /// Creates a literal.
    pub fn lit(value: impl Into<ScalarValue>) -> Self {
        ExprNode::Literal {
            value: value.into(),
        }
    }

    /// Creates a NULL literal.
    pub fn null() -> Self {
        ExprNode::Literal {
            value: ScalarValue::Null,
        }
    }

    /// Creates a binary expression.
    pub fn binary(left: ExprNode, op: BinaryOp, right: ExprNode) -> Self {
        ExprNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Creates `self = other`.
    pub fn equals(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::Eq, other)
    }

    /// Creates `self < other`.
    pub fn lt(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::Lt, other)
    }

    /// Creates `self > other`.
    pub fn gt(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::Gt, other)
    }

    /// Creates `self AND other`.
    pub fn and(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::And, other)
    }

    /// Creates `self OR other`.
    pub fn or(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::Or, other)
    }

    /// Creates `NOT self`.
    pub fn negate(self) -> Self {
        ExprNode::Not {
            operand: Box::new(self),
        }
    }

    /// Creates `self IS NULL`.
    pub fn is_null(self) -> Self {
        ExprNode::IsNull {
            operand: Box::new(self),
            negated: false,
        }
    }

    /// Creates `self IS NOT NULL`.
    pub fn is_not_null(self) -> Self {
        ExprNode::IsNull {
            operand: Box::new(self),
            negated: true,
        }
    }
}

impl fmt::Display for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprNode::SlotRef { slot } => write!(f, "#{slot}"),
            ExprNode::Literal { value } => match value {
                ScalarValue::String(s) => write!(f, "'{s}'"),
                other => write!(f, "{other}"),
            },
            ExprNode::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            ExprNode::Not { operand } => write!(f, "NOT {operand}"),
            ExprNode::IsNull { operand, negated } => {
                if *negated {
                    write!(f, "{operand} IS NOT NULL")
                } else {
                    write!(f, "{operand} IS NULL")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_json() {
        let json = r#"{
            "expr": "binary",
            "op": ">",
            "left": {"expr": "slot_ref", "slot": 0},
            "right": {"expr": "literal", "value": {"int": 3}}
        }"#;
        let expr: ExprNode = serde_json::from_str(json).unwrap();
        assert_eq!(expr, ExprNode::slot(0).gt(ExprNode::lit(3)));
    }

    #[test]
    fn test_is_null_default() {
        let json = r#"{"expr": "is_null", "operand": {"expr": "slot_ref", "slot": 2}}"#;
        let expr: ExprNode = serde_json::from_str(json).unwrap();
        assert_eq!(expr, ExprNode::slot(2).is_null());
    }

    #[test]
    fn test_expr_display() {
        let expr = ExprNode::slot(0)
            .gt(ExprNode::lit(1))
            .and(ExprNode::slot(1).is_not_null());
        assert_eq!(expr.to_string(), "((#0 > 1) AND #1 IS NOT NULL)");
        assert_eq!(ExprNode::lit("a").equals(ExprNode::null()).to_string(), "('a' = NULL)");
    }

    #[test]
    fn test_op_classes() {
        assert!(BinaryOp::LtEq.is_comparison());
        assert!(BinaryOp::Modulo.is_arithmetic());
        assert!(BinaryOp::Or.is_logical());
        assert!(!BinaryOp::Plus.is_comparison());
    }
}
