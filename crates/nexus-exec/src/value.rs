//! Runtime values for query execution.
//!
//! Two representations are used:
//!
//! - [`Datum`] is what a row batch stores per slot. It is `Copy`; strings are
//!   handles into the batch's arena.
//! - [`ScalarValue`] is an owned value: the result of evaluating an
//!   expression, a literal in a plan, or a materialized result cell.

use std::cmp::Ordering;
use std::fmt;

use nexus_common::memory::VarLenRef;
use serde::{Deserialize, Serialize};

use crate::descriptors::ColumnType;

/// A slot value stored inside a row batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Datum {
    /// NULL value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    BigInt(i64),
    /// 64-bit floating point.
    Double(f64),
    /// Variable-length string data, owned by a batch arena.
    String(VarLenRef),
}

impl Datum {
    /// Returns true if this datum is NULL.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Returns the string handle, if this is a string datum.
    #[inline]
    pub fn as_var_len(&self) -> Option<&VarLenRef> {
        match self {
            Datum::String(value) => Some(value),
            _ => None,
        }
    }
}

/// An owned runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    BigInt(i64),
    /// 64-bit floating point.
    Double(f64),
    /// UTF-8 string.
    String(String),
}

impl ScalarValue {
    /// Creates a boolean value.
    pub fn boolean(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }

    /// Creates an integer value.
    pub fn int(v: i32) -> Self {
        ScalarValue::Int(v)
    }

    /// Creates a bigint value.
    pub fn bigint(v: i64) -> Self {
        ScalarValue::BigInt(v)
    }

    /// Creates a double value.
    pub fn double(v: f64) -> Self {
        ScalarValue::Double(v)
    }

    /// Creates a string value.
    pub fn string(v: impl Into<String>) -> Self {
        ScalarValue::String(v.into())
    }

    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Returns the boolean, or `None` for NULL and non-boolean values.
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an i64 for integer types.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(i) => Some(i64::from(*i)),
            ScalarValue::BigInt(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as an f64 for numeric types.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(i) => Some(f64::from(*i)),
            ScalarValue::BigInt(i) => Some(*i as f64),
            ScalarValue::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string slice for string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the column type of this value, or `None` for NULL.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Boolean(_) => Some(ColumnType::Boolean),
            ScalarValue::Int(_) => Some(ColumnType::Int),
            ScalarValue::BigInt(_) => Some(ColumnType::BigInt),
            ScalarValue::Double(_) => Some(ColumnType::Double),
            ScalarValue::String(_) => Some(ColumnType::String),
        }
    }

    /// Compares two non-NULL values of comparable types.
    ///
    /// Numeric values compare across widths (integers exactly, anything
    /// involving a double through f64). Returns `None` for NULL operands,
    /// incomparable types and NaN.
    pub fn sql_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (ScalarValue::Null, _) | (_, ScalarValue::Null) => None,
            (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => Some(a.cmp(b)),
            (ScalarValue::String(a), ScalarValue::String(b)) => Some(a.cmp(b)),
            (ScalarValue::Double(_), _) | (_, ScalarValue::Double(_)) => {
                self.to_f64()?.partial_cmp(&other.to_f64()?)
            }
            (a, b) => Some(a.to_i64()?.cmp(&b.to_i64()?)),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::BigInt(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Double(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(v.to_string())
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            ScalarValue::Int(i) => write!(f, "{}", i),
            ScalarValue::BigInt(i) => write!(f, "{}", i),
            ScalarValue::Double(v) => write!(f, "{}", v),
            ScalarValue::String(s) => write!(f, "{}", s),
        }
    }
}
