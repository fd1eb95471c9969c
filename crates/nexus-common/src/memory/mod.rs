//! Memory accounting and arenas for query execution.
//!
//! - **MemTracker**: query-wide byte accounting with an optional limit
//! - **MemPool**: chunked arena that owns the variable-length data of a row
//!   batch and can hand its chunks to another pool without copying
//!
//! # Ownership transfer
//!
//! Rows never hold pointers. A string slot holds a [`VarLenRef`] naming the
//! chunk, offset and length of its bytes. Chunk ids are unique for the life of
//! the process, so a reference stays meaningful when the chunk moves to another
//! pool through [`MemPool::acquire_data`], and resolving it against a pool that
//! does not own the chunk fails instead of reading freed memory.

mod mem_pool;
mod tracker;

pub use mem_pool::{ChunkId, MemPool, PoolMark, VarLenRef};
pub use tracker::MemTracker;
