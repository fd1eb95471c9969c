//! # nexus-common
//!
//! Common types, errors, and utilities for the NexusDB execution core.
//!
//! This crate provides the foundations shared by the operator crates:
//!
//! - **Types**: plan node, tuple and slot identifiers
//! - **Errors**: [`ExecError`] with stable [`ErrorKind`] codes
//! - **Config**: [`ExecConfig`](config::ExecConfig), loadable from TOML
//! - **Memory**: query memory tracking and the arena that backs row batches
//! - **Logging**: `tracing` subscriber bootstrap
//!
//! ## Example
//!
//! ```rust
//! use nexus_common::memory::{MemPool, MemTracker};
//! use nexus_common::ExecResult;
//!
//! fn example() -> ExecResult<()> {
//!     let tracker = MemTracker::new("query", Some(1 << 20));
//!     let mut pool = MemPool::new(tracker);
//!     let name = pool.allocate(b"nexus")?;
//!     assert_eq!(pool.get(&name), Some(&b"nexus"[..]));
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod memory;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use error::{ErrorKind, EvalError, ExecError, ExecResult};
pub use types::{PlanNodeId, SlotId, TupleId};
