//! Byte accounting with an optional limit.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{ExecError, ExecResult};

/// Tracks the bytes held by one query (or one operator) against a limit.
///
/// Consumption is updated with atomics so the tracker can be shared between a
/// coordinator thread and operator trees running on other threads.
///
/// # Example
///
/// ```rust
/// use nexus_common::memory::MemTracker;
///
/// let tracker = MemTracker::new("query", Some(1024));
/// tracker.try_consume(1000).unwrap();
/// assert!(tracker.try_consume(100).is_err());
/// tracker.release(1000);
/// assert_eq!(tracker.consumption(), 0);
/// assert_eq!(tracker.peak(), 1000);
/// ```
pub struct MemTracker {
    /// Label used in error messages.
    label: String,
    /// Maximum bytes, if limited.
    limit: Option<u64>,
    /// Bytes currently held.
    consumption: AtomicU64,
    /// High-water mark of `consumption`.
    peak: AtomicU64,
}

impl MemTracker {
    /// Creates a tracker with an optional limit.
    #[must_use]
    pub fn new(label: impl Into<String>, limit: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            limit,
            consumption: AtomicU64::new(0),
            peak: AtomicU64::new(0),
        })
    }

    /// Creates a tracker without a limit.
    #[must_use]
    pub fn unlimited(label: impl Into<String>) -> Arc<Self> {
        Self::new(label, None)
    }

    /// Returns the tracker's label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the limit, if any.
    #[inline]
    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Returns the bytes currently held.
    #[inline]
    #[must_use]
    pub fn consumption(&self) -> u64 {
        self.consumption.load(Ordering::Relaxed)
    }

    /// Returns the highest consumption observed.
    #[inline]
    #[must_use]
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Charges `bytes` if the limit allows it.
    ///
    /// On failure the consumption is left unchanged.
    pub fn try_consume(&self, bytes: u64) -> ExecResult<()> {
        let Some(limit) = self.limit else {
            self.consume(bytes);
            return Ok(());
        };

        let mut current = self.consumption.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(bytes);
            if next > limit {
                debug!(
                    tracker = %self.label,
                    requested = bytes,
                    consumption = current,
                    limit,
                    "memory limit exceeded"
                );
                return Err(ExecError::MemLimitExceeded {
                    label: self.label.clone(),
                    requested: bytes,
                    consumption: current,
                    limit,
                });
            }
            match self.consumption.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(next, Ordering::Relaxed);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Charges `bytes` unconditionally.
    ///
    /// Used when memory that was already admitted by another tracker changes
    /// hands; the limit may be exceeded temporarily.
    pub fn consume(&self, bytes: u64) {
        let next = self.consumption.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.peak.fetch_max(next, Ordering::Relaxed);
    }

    /// Returns `bytes` to the tracker.
    pub fn release(&self, bytes: u64) {
        let previous = self.consumption.fetch_sub(bytes, Ordering::AcqRel);
        debug_assert!(
            previous >= bytes,
            "tracker '{}' released {} bytes but only held {}",
            self.label,
            bytes,
            previous
        );
    }
}

impl fmt::Debug for MemTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemTracker")
            .field("label", &self.label)
            .field("limit", &self.limit)
            .field("consumption", &self.consumption())
            .field("peak", &self.peak())
            .finish()
    }
}
