//! Error handling for the execution core.
//!
//! Every lifecycle call on an operator returns [`ExecResult`]. Errors are never
//! recovered inside an operator; they are surfaced to the caller, which remains
//! responsible for closing every node it constructed.

mod eval;
mod exec;

pub use eval::EvalError;
pub use exec::{ErrorKind, ExecError};

/// Result type alias for execution operations.
pub type ExecResult<T> = std::result::Result<T, ExecError>;
