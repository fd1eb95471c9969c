//! Configuration for the execution core.

mod exec;

pub use exec::ExecConfig;
