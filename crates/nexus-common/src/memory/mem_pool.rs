//! Chunked arena for variable-length cell data.
//!
//! A pool hands out byte ranges from a list of chunks. Chunks never grow after
//! creation, so bytes stay where they were written until the chunk is freed.
//! Memory is returned all at once when the pool is dropped or freed, or moves
//! wholesale to another pool with [`MemPool::acquire_data`].
//!
//! # Performance
//!
//! - Allocation: O(1) amortized - append to the newest chunk
//! - Lookup: O(log chunks) - binary search by chunk id
//! - Transfer: O(chunks) - no byte is copied

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::MemTracker;
use crate::constants::{DEFAULT_POOL_INITIAL_CHUNK_SIZE, DEFAULT_POOL_MAX_CHUNK_SIZE};
use crate::error::{ExecError, ExecResult};

/// Source of process-unique chunk ids. Zero is reserved for the empty value.
static NEXT_CHUNK_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one arena chunk for the life of the process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(u64);

impl ChunkId {
    const NONE: Self = Self(0);

    fn next() -> Self {
        Self(NEXT_CHUNK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.0)
    }
}

/// Handle to a byte range inside a pool chunk.
///
/// This is what a string slot stores. It is only meaningful together with the
/// pool that currently owns the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarLenRef {
    chunk: ChunkId,
    offset: u32,
    len: u32,
}

impl VarLenRef {
    /// The empty byte string. Resolves in every pool.
    pub const EMPTY: Self = Self {
        chunk: ChunkId::NONE,
        offset: 0,
        len: 0,
    };

    /// Returns the chunk holding the bytes.
    #[inline]
    #[must_use]
    pub const fn chunk(&self) -> ChunkId {
        self.chunk
    }

    /// Returns the length in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns true for the empty byte string.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Allocation watermark returned by [`MemPool::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMark {
    chunks: usize,
    last_len: usize,
    allocated_bytes: u64,
}

/// One fixed-size block of arena memory.
struct Chunk {
    id: ChunkId,
    /// Bytes written so far. Never grows past `size`, so it never reallocates.
    data: Vec<u8>,
    /// Bytes charged to the tracker for this chunk.
    size: usize,
}

impl Chunk {
    fn new(size: usize) -> Self {
        Self {
            id: ChunkId::next(),
            data: Vec::with_capacity(size),
            size,
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.size - self.data.len()
    }
}

/// Arena owning the variable-length data of one row batch.
///
/// # Thread Safety
///
/// A pool has a single owner. Moving data between pools requires `&mut` on
/// both, so a chunk can never be reachable from two pools at once.
///
/// # Example
///
/// ```rust
/// use nexus_common::memory::{MemPool, MemTracker};
///
/// let tracker = MemTracker::unlimited("example");
/// let mut child = MemPool::new(tracker.clone());
/// let mut parent = MemPool::new(tracker);
///
/// let name = child.allocate(b"alice").unwrap();
/// assert_eq!(child.get(&name), Some(&b"alice"[..]));
///
/// parent.acquire_data(&mut child);
/// assert_eq!(parent.get(&name), Some(&b"alice"[..]));
/// assert_eq!(child.get(&name), None);
/// ```
pub struct MemPool {
    /// Chunks sorted by id.
    chunks: Vec<Chunk>,
    tracker: Arc<MemTracker>,
    initial_chunk_size: usize,
    max_chunk_size: usize,
    next_chunk_size: usize,
    /// Sum of chunk sizes charged to `tracker`.
    reserved_bytes: u64,
    /// Bytes handed out by `allocate`.
    allocated_bytes: u64,
}

impl MemPool {
    /// Creates an empty pool with the default chunk sizes.
    #[must_use]
    pub fn new(tracker: Arc<MemTracker>) -> Self {
        Self::with_chunk_sizes(
            tracker,
            DEFAULT_POOL_INITIAL_CHUNK_SIZE,
            DEFAULT_POOL_MAX_CHUNK_SIZE,
        )
    }

    /// Creates an empty pool whose chunks double from `initial` up to `max`.
    ///
    /// Both sizes are clamped to at least one byte and `max` to at least
    /// `initial`.
    #[must_use]
    pub fn with_chunk_sizes(tracker: Arc<MemTracker>, initial: usize, max: usize) -> Self {
        let initial = initial.max(1);
        Self {
            chunks: Vec::new(),
            tracker,
            initial_chunk_size: initial,
            max_chunk_size: max.max(initial),
            next_chunk_size: initial,
            reserved_bytes: 0,
            allocated_bytes: 0,
        }
    }

    /// Copies `bytes` into the pool and returns a handle to them.
    pub fn allocate(&mut self, bytes: &[u8]) -> ExecResult<VarLenRef> {
        if bytes.is_empty() {
            return Ok(VarLenRef::EMPTY);
        }
        let len = u32::try_from(bytes.len()).map_err(|_| {
            ExecError::internal(format!("value of {} bytes exceeds arena limits", bytes.len()))
        })?;

        let needs_chunk = self
            .chunks
            .last()
            .map_or(true, |chunk| chunk.remaining() < bytes.len());
        if needs_chunk {
            self.grow(bytes.len())?;
        }

        let chunk = self
            .chunks
            .last_mut()
            .ok_or_else(|| ExecError::internal("arena has no chunk after growing"))?;
        let offset = u32::try_from(chunk.data.len())
            .map_err(|_| ExecError::internal("arena chunk offset exceeds u32"))?;
        chunk.data.extend_from_slice(bytes);
        self.allocated_bytes += u64::from(len);

        Ok(VarLenRef {
            chunk: chunk.id,
            offset,
            len,
        })
    }

    /// Resolves a handle, or returns `None` if this pool does not own its chunk.
    #[must_use]
    pub fn get(&self, value: &VarLenRef) -> Option<&[u8]> {
        if value.is_empty() {
            return Some(&[]);
        }
        let index = self
            .chunks
            .binary_search_by_key(&value.chunk, |chunk| chunk.id)
            .ok()?;
        let start = value.offset as usize;
        self.chunks[index].data.get(start..start + value.len())
    }

    /// Returns true if the handle resolves in this pool.
    #[must_use]
    pub fn contains(&self, value: &VarLenRef) -> bool {
        self.get(value).is_some()
    }

    /// Takes ownership of every chunk held by `src`.
    ///
    /// Handles into `src` resolve against `self` afterwards. `src` is left empty
    /// and allocates fresh chunks if it is written to again; it can never write
    /// into the chunks it gave away.
    pub fn acquire_data(&mut self, src: &mut MemPool) {
        if src.chunks.is_empty() {
            return;
        }

        if !Arc::ptr_eq(&self.tracker, &src.tracker) {
            src.tracker.release(src.reserved_bytes);
            self.tracker.consume(src.reserved_bytes);
        }

        self.reserved_bytes += src.reserved_bytes;
        self.allocated_bytes += src.allocated_bytes;
        self.chunks.append(&mut src.chunks);
        self.chunks.sort_unstable_by_key(|chunk| chunk.id);

        src.reserved_bytes = 0;
        src.allocated_bytes = 0;
        src.next_chunk_size = src.initial_chunk_size;
    }

    /// Returns the position of the next allocation.
    #[must_use]
    pub fn mark(&self) -> PoolMark {
        PoolMark {
            chunks: self.chunks.len(),
            last_len: self.chunks.last().map_or(0, |chunk| chunk.data.len()),
            allocated_bytes: self.allocated_bytes,
        }
    }

    /// Discards every allocation made since `mark` and frees the chunks added
    /// after it.
    ///
    /// Only valid while the pool has done nothing but allocate since `mark` was
    /// taken. Returns false and changes nothing if the pool is visibly behind
    /// the mark.
    pub fn rollback(&mut self, mark: PoolMark) -> bool {
        let behind = self.chunks.len() < mark.chunks
            || self.allocated_bytes < mark.allocated_bytes
            || (mark.chunks > 0 && self.chunks[mark.chunks - 1].data.len() < mark.last_len);
        if behind {
            return false;
        }

        if let Some(first) = self.chunks.get(mark.chunks) {
            self.next_chunk_size = first.size.clamp(self.initial_chunk_size, self.max_chunk_size);
        }
        let freed: u64 = self
            .chunks
            .drain(mark.chunks..)
            .map(|chunk| chunk.size as u64)
            .sum();
        self.tracker.release(freed);
        self.reserved_bytes -= freed;

        if let Some(last) = self.chunks.last_mut() {
            last.data.truncate(mark.last_len);
        }
        self.allocated_bytes = mark.allocated_bytes;
        true
    }

    /// Frees every chunk and returns the memory to the tracker.
    pub fn free_all(&mut self) {
        self.chunks.clear();
        self.tracker.release(self.reserved_bytes);
        self.reserved_bytes = 0;
        self.allocated_bytes = 0;
        self.next_chunk_size = self.initial_chunk_size;
    }

    /// Returns the bytes charged to the tracker.
    #[inline]
    #[must_use]
    pub fn reserved_bytes(&self) -> u64 {
        self.reserved_bytes
    }

    /// Returns the bytes handed out by `allocate`.
    #[inline]
    #[must_use]
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    /// Returns the number of chunks owned.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the tracker this pool charges.
    #[must_use]
    pub fn tracker(&self) -> &Arc<MemTracker> {
        &self.tracker
    }

    /// Adds a chunk able to hold at least `min_size` bytes.
    fn grow(&mut self, min_size: usize) -> ExecResult<()> {
        let size = self.next_chunk_size.max(min_size);
        self.tracker.try_consume(size as u64)?;

        // New ids are the largest issued so far, so the list stays sorted.
        self.chunks.push(Chunk::new(size));
        self.reserved_bytes += size as u64;
        self.next_chunk_size = (self.next_chunk_size * 2).min(self.max_chunk_size);
        Ok(())
    }
}

impl Drop for MemPool {
    fn drop(&mut self) {
        self.tracker.release(self.reserved_bytes);
    }
}

impl fmt::Debug for MemPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemPool")
            .field("chunk_count", &self.chunks.len())
            .field("reserved_bytes", &self.reserved_bytes)
            .field("allocated_bytes", &self.allocated_bytes)
            .field("tracker", &self.tracker.label())
            .finish()
    }
}
