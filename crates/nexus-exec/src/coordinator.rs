//! Query coordinator.
//!
//! Drives one plan fragment through the operator lifecycle and collects its
//! rows. Close runs on every exit path once the tree has been built.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nexus_common::config::ExecConfig;
use nexus_common::{ErrorKind, ExecError, ExecResult};
use thiserror::Error;
use tracing::{info, warn};

use crate::context::{CancelHandle, ExecContext};
use crate::descriptors::DescriptorTbl;
use crate::node::{build_tree, ExecNode};
use crate::plan::PlanFragment;
use crate::value::ScalarValue;

/// Rows and statistics of a successful query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Output column names.
    pub columns: Vec<String>,
    /// Output rows in order.
    pub rows: Vec<Vec<ScalarValue>>,
    /// Number of non-empty batches the root produced.
    pub batches: usize,
    /// Wall-clock execution time.
    pub elapsed: Duration,
    /// Peak tracked memory.
    pub peak_memory_bytes: u64,
}

impl QueryResult {
    /// Returns the number of rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join(" | "))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        write!(f, "({} rows in {:?})", self.rows.len(), self.elapsed)
    }
}

/// Why a query failed.
#[derive(Debug, Clone, Error)]
#[error("query failed ({kind}): {message}")]
pub struct QueryFailure {
    /// Kind of the originating error.
    pub kind: ErrorKind,
    /// Message of the originating error.
    pub message: String,
    /// Diagnostics recorded by the query before it failed.
    pub diagnostics: Vec<String>,
}

impl From<ExecError> for QueryFailure {
    fn from(err: ExecError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            diagnostics: Vec::new(),
        }
    }
}

/// Executes plan fragments.
///
/// # Example
///
/// ```rust
/// use nexus_common::config::ExecConfig;
/// use nexus_exec::coordinator::QueryExecutor;
///
/// let json = r#"{
///     "desc_tbl": {"tuples": [{"id": 0, "slots": [{"id": 0, "name": "n", "type": "int"}]}]},
///     "root": {"type": "values", "node_id": 0, "row_tuples": [0], "rows": [[{"int": 1}]]}
/// }"#;
/// let result = QueryExecutor::new(ExecConfig::default()).execute_json(json).unwrap();
/// assert_eq!(result.num_rows(), 1);
/// ```
#[derive(Debug)]
pub struct QueryExecutor {
    config: ExecConfig,
    cancel: CancelHandle,
}

impl QueryExecutor {
    /// Creates an executor.
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config,
            cancel: CancelHandle::new(),
        }
    }

    /// Returns a handle that cancels queries run by this executor.
    ///
    /// Cancellation is sticky: once cancelled, every later query fails too.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Parses and executes a JSON plan fragment.
    pub fn execute_json(&self, json: &str) -> Result<QueryResult, QueryFailure> {
        let fragment = PlanFragment::from_json(json).map_err(|e| self.fail(e, Vec::new()))?;
        self.execute(&fragment)
    }

    /// Executes a plan fragment to completion.
    pub fn execute(&self, fragment: &PlanFragment) -> Result<QueryResult, QueryFailure> {
        let start = Instant::now();

        let tbl = DescriptorTbl::from_desc(fragment.desc_tbl.clone())
            .map(Arc::new)
            .map_err(|e| self.fail(e, Vec::new()))?;
        let ctx = ExecContext::new(self.config.clone(), tbl)
            .map_err(|e| self.fail(e, Vec::new()))?
            .with_cancel_handle(self.cancel.clone());
        let mut root = build_tree(&fragment.root, &ctx).map_err(|e| self.fail(e, Vec::new()))?;

        let outcome = drive(&ctx, root.as_mut());
        root.close(&ctx);

        let (rows, batches) = match outcome {
            Ok(output) => output,
            Err(e) => {
                ctx.log_error(format!("{} (id={}): {e}", root.name(), root.id()));
                return Err(self.fail(e, ctx.error_log()));
            }
        };

        let result = QueryResult {
            columns: root
                .row_desc()
                .slots()
                .iter()
                .map(|slot| slot.name.clone())
                .collect(),
            rows,
            batches,
            elapsed: start.elapsed(),
            peak_memory_bytes: ctx.mem_tracker().peak(),
        };
        info!(
            rows = result.rows.len(),
            batches = result.batches,
            elapsed_ms = result.elapsed.as_millis() as u64,
            peak_memory_bytes = result.peak_memory_bytes,
            "query finished"
        );
        Ok(result)
    }

    fn fail(&self, err: ExecError, diagnostics: Vec<String>) -> QueryFailure {
        warn!(kind = %err.kind(), error = %err, "query failed");
        QueryFailure {
            diagnostics,
            ..QueryFailure::from(err)
        }
    }
}

/// Runs Prepare, Open and GetNext until end-of-stream. The caller closes.
fn drive(ctx: &ExecContext, root: &mut dyn ExecNode) -> ExecResult<(Vec<Vec<ScalarValue>>, usize)> {
    root.prepare(ctx)?;
    root.open(ctx)?;

    let mut batch = ctx.new_row_batch(Arc::clone(root.row_desc()))?;
    let mut rows = Vec::new();
    let mut batches = 0;
    loop {
        batch.reset();
        let eos = root.get_next(ctx, &mut batch)?;
        batch.validate()?;
        if !batch.is_empty() {
            batches += 1;
            rows.extend(batch.to_values()?);
        }
        if eos {
            break;
        }
    }
    Ok((rows, batches))
}
