//! System-wide constants for the execution core.

// =============================================================================
// Row Batch Constants
// =============================================================================

/// Default number of rows per row batch.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Minimum configurable batch size.
pub const MIN_BATCH_SIZE: usize = 1;

/// Maximum configurable batch size.
///
/// Large enough for wide scans, small enough that one batch of fixed-width
/// slots stays comfortably inside a cache-friendly working set.
pub const MAX_BATCH_SIZE: usize = 64 * 1024;

// =============================================================================
// Memory Pool Constants
// =============================================================================

/// Size of the first chunk a memory pool allocates (4 KB).
pub const DEFAULT_POOL_INITIAL_CHUNK_SIZE: usize = 4 * 1024;

/// Upper bound for regular chunk growth (512 KB).
///
/// Values larger than this still get a dedicated chunk of their own size.
pub const DEFAULT_POOL_MAX_CHUNK_SIZE: usize = 512 * 1024;

// =============================================================================
// Plan Constants
// =============================================================================

/// Limit value meaning "no limit" in serialized plan nodes.
pub const NO_LIMIT: i64 = -1;
