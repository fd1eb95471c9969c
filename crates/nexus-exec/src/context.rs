//! Per-query execution context.
//!
//! Every lifecycle call receives the query's [`ExecContext`]. It supplies the
//! configuration, the descriptor table, the query-wide memory tracker, the
//! cancellation flag, the expression registry and a sink for diagnostics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nexus_common::config::ExecConfig;
use nexus_common::memory::{MemPool, MemTracker};
use nexus_common::{ExecError, ExecResult};
use parking_lot::Mutex;
use tracing::warn;

use crate::batch::RowBatch;
use crate::descriptors::{DescriptorTbl, RowDescriptor};
use crate::expr::ExprRegistry;

/// Shared cancellation flag.
///
/// Clones observe the same flag, so a handle can be given to another thread
/// before the query starts.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates a handle that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Runtime resources of one query.
#[derive(Debug)]
pub struct ExecContext {
    config: ExecConfig,
    desc_tbl: Arc<DescriptorTbl>,
    mem_tracker: Arc<MemTracker>,
    cancel: CancelHandle,
    registry: ExprRegistry,
    error_log: Mutex<Vec<String>>,
}

impl ExecContext {
    /// Creates a context, validating the configuration.
    pub fn new(config: ExecConfig, desc_tbl: Arc<DescriptorTbl>) -> ExecResult<Self> {
        config.validate()?;
        let mem_tracker = MemTracker::new("query", config.mem_limit_bytes);
        Ok(Self {
            config,
            desc_tbl,
            mem_tracker,
            cancel: CancelHandle::new(),
            registry: ExprRegistry::new(),
            error_log: Mutex::new(Vec::new()),
        })
    }

    /// Replaces the cancellation flag with a shared one.
    #[must_use]
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Returns the descriptor table.
    pub fn desc_tbl(&self) -> &DescriptorTbl {
        &self.desc_tbl
    }

    /// Returns the query memory tracker.
    pub fn mem_tracker(&self) -> &Arc<MemTracker> {
        &self.mem_tracker
    }

    /// Returns the cancellation handle.
    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Returns the expression registry.
    pub fn registry(&self) -> &ExprRegistry {
        &self.registry
    }

    /// Returns [`ExecError::Cancelled`] once cancellation has been requested.
    #[inline]
    pub fn check_cancelled(&self) -> ExecResult<()> {
        if self.cancel.is_cancelled() {
            Err(ExecError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Records a diagnostic message for the query.
    pub fn log_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "query diagnostic");
        self.error_log.lock().push(message);
    }

    /// Returns the recorded diagnostics.
    pub fn error_log(&self) -> Vec<String> {
        self.error_log.lock().clone()
    }

    /// Creates an empty arena charged to the query tracker.
    pub fn new_mem_pool(&self) -> MemPool {
        MemPool::with_chunk_sizes(
            Arc::clone(&self.mem_tracker),
            self.config.pool_initial_chunk_size,
            self.config.pool_max_chunk_size,
        )
    }

    /// Creates a row batch with the configured batch size.
    pub fn new_row_batch(&self, row_desc: Arc<RowDescriptor>) -> ExecResult<RowBatch> {
        self.new_row_batch_with_capacity(row_desc, self.config.batch_size)
    }

    /// Creates a row batch with an explicit capacity.
    pub fn new_row_batch_with_capacity(
        &self,
        row_desc: Arc<RowDescriptor>,
        capacity: usize,
    ) -> ExecResult<RowBatch> {
        RowBatch::new(row_desc, capacity, self.new_mem_pool())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{ColumnType, DescriptorTableDesc, SlotDescriptor, TupleDescriptor};
    use nexus_common::TupleId;

    fn test_tbl() -> Arc<DescriptorTbl> {
        Arc::new(
            DescriptorTbl::from_desc(DescriptorTableDesc {
                tuples: vec![TupleDescriptor::new(
                    0,
                    vec![SlotDescriptor::nullable(0, "a", ColumnType::String)],
                )],
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_cancel_handle_shared() {
        let ctx = ExecContext::new(ExecConfig::default(), test_tbl()).unwrap();
        let handle = ctx.cancel_handle().clone();
        assert!(ctx.check_cancelled().is_ok());
        handle.cancel();
        assert!(ctx.check_cancelled().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_new_row_batch_uses_config() {
        let ctx = ExecContext::new(ExecConfig::with_batch_size(16), test_tbl()).unwrap();
        let desc = Arc::new(RowDescriptor::new(ctx.desc_tbl(), &[TupleId::new(0)]).unwrap());
        let batch = ctx.new_row_batch(desc).unwrap();
        assert_eq!(batch.capacity(), 16);
        assert!(ctx.mem_tracker().consumption() > 0);
        drop(batch);
        assert_eq!(ctx.mem_tracker().consumption(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ExecContext::new(ExecConfig::with_batch_size(0), test_tbl()).unwrap_err();
        assert_eq!(err.kind(), nexus_common::ErrorKind::Config);
    }

    #[test]
    fn test_error_log() {
        let ctx = ExecContext::new(ExecConfig::default(), test_tbl()).unwrap();
        ctx.log_error("first");
        ctx.log_error(String::from("second"));
        assert_eq!(ctx.error_log(), vec!["first", "second"]);
    }
}
