//! Expression evaluation faults.

use thiserror::Error;

/// A fault raised while evaluating an expression against a row.
///
/// These are fatal to the running query: a conjunct that fails aborts the
/// whole `get_next` call instead of skipping the offending row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Integer arithmetic overflowed.
    #[error("integer overflow in '{op}'")]
    Overflow {
        /// The operator that overflowed.
        op: &'static str,
    },

    /// Integer division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// An operand had a type the operator cannot handle.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// A string slot points at arena memory the batch does not own.
    #[error("string slot {slot} references memory not owned by the batch")]
    DanglingStringRef {
        /// Position of the slot within the row.
        slot: usize,
    },

    /// A slot index outside the row layout.
    #[error("slot index {slot} out of range for row of width {width}")]
    SlotOutOfRange {
        /// Requested slot.
        slot: usize,
        /// Row width.
        width: usize,
    },

    /// String data was not valid UTF-8.
    #[error("string slot {slot} is not valid UTF-8")]
    InvalidUtf8 {
        /// Position of the slot within the row.
        slot: usize,
    },
}
