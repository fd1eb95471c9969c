//! Execution error types.

use std::fmt;
use thiserror::Error;

use super::EvalError;

/// Error kinds for categorizing failures.
///
/// The coordinator reports these to its caller together with the message, so
/// the numeric codes are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorKind {
    // Lifecycle errors (0x0000 - 0x00FF)
    /// Expression or descriptor resolution failed during Prepare.
    Prepare = 0x0001,
    /// Resource acquisition failed during Open.
    Open = 0x0002,
    /// Evaluation failed during GetNext.
    Exec = 0x0003,
    /// Cooperative cancellation was observed.
    Cancelled = 0x0004,

    // Engine errors (0x0100 - 0x01FF)
    /// Internal error or protocol misuse (bug).
    Internal = 0x0100,
    /// Invalid configuration.
    Config = 0x0101,
}

impl ErrorKind {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "Lifecycle",
            0x01 => "Engine",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The error type returned by every operator lifecycle call.
///
/// # Example
///
/// ```rust
/// use nexus_common::error::{ErrorKind, ExecError, ExecResult};
///
/// fn resolve(slot: u32) -> ExecResult<usize> {
///     Err(ExecError::prepare(format!("slot {slot} is not materialized")))
/// }
///
/// assert_eq!(resolve(4).unwrap_err().kind(), ErrorKind::Prepare);
/// ```
#[derive(Debug, Error)]
pub enum ExecError {
    // ==========================================================================
    // Lifecycle Errors
    // ==========================================================================
    /// Expression/descriptor resolution failed. Aborts tree construction.
    #[error("prepare failed: {message}")]
    Prepare {
        /// Error message.
        message: String,
    },

    /// Resource acquisition failed while opening an operator.
    #[error("open failed: {message}")]
    Open {
        /// Error message.
        message: String,
    },

    /// Row production failed.
    #[error("execution failed: {message}")]
    Exec {
        /// Error message.
        message: String,
    },

    /// Expression evaluation fault.
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),

    /// A memory tracker refused an allocation.
    #[error("memory limit exceeded for '{label}': requested {requested} bytes with {consumption} of {limit} bytes in use")]
    MemLimitExceeded {
        /// Label of the tracker that refused.
        label: String,
        /// Bytes requested.
        requested: u64,
        /// Bytes in use at the time of the request.
        consumption: u64,
        /// The tracker's limit.
        limit: u64,
    },

    /// Cancellation was observed.
    #[error("query was cancelled")]
    Cancelled,

    // ==========================================================================
    // Engine Errors
    // ==========================================================================
    /// A lifecycle method was called in a state that does not allow it.
    #[error("{node}: cannot {operation} in state {state}")]
    InvalidState {
        /// Operator name and id.
        node: String,
        /// The rejected operation.
        operation: &'static str,
        /// The operator's state at the time.
        state: String,
    },

    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// I/O error while loading configuration.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl ExecError {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Prepare { .. } => ErrorKind::Prepare,
            Self::Open { .. } => ErrorKind::Open,
            Self::Exec { .. } | Self::Eval(_) | Self::MemLimitExceeded { .. } => ErrorKind::Exec,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidState { .. } | Self::Internal { .. } => ErrorKind::Internal,
            Self::InvalidConfig { .. } | Self::Io { .. } => ErrorKind::Config,
        }
    }

    /// Returns true if this error was caused by cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Creates a prepare error.
    #[must_use]
    pub fn prepare(message: impl Into<String>) -> Self {
        Self::Prepare {
            message: message.into(),
        }
    }

    /// Creates an open error.
    #[must_use]
    pub fn open(message: impl Into<String>) -> Self {
        Self::Open {
            message: message.into(),
        }
    }

    /// Creates an execution error.
    #[must_use]
    pub fn exec(message: impl Into<String>) -> Self {
        Self::Exec {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Re-labels a failure raised while an operator acquires resources in Open.
    ///
    /// Memory exhaustion and execution faults become [`ExecError::Open`];
    /// cancellation and protocol errors keep their kind.
    #[must_use]
    pub fn into_open(self) -> Self {
        match self {
            Self::MemLimitExceeded { .. } | Self::Exec { .. } => Self::open(self.to_string()),
            other => other,
        }
    }
}
