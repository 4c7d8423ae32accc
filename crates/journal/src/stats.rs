//! Journal statistics and telemetry counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counter name under which truncated range reads are reported
pub const TRUNCATED_READS: &str = "truncatedReads";

/// Sink for a monotonically increasing telemetry counter.
///
/// The journal reports zero once at construction so the counter registers
/// with the embedder's metrics system even if it never fires.
pub trait Counter: Send + Sync {
    fn add_value(&self, value: u64);
}

/// Process-local counter backed by an atomic.
///
/// The default sink for journals created without an embedder-provided
/// counter; also convenient in tests.
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total reported so far
    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Counter for AtomicCounter {
    fn add_value(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }
}

/// Statistics about the journal's retained deltas.
///
/// Present iff the journal is non-empty; timestamps always name the oldest
/// and newest retained delta.
#[derive(Debug, Clone, Copy)]
pub struct JournalStats {
    /// Number of stored deltas
    pub entry_count: usize,
    /// Time of the oldest retained delta
    pub earliest_timestamp: Instant,
    /// Time of the newest retained delta
    pub latest_timestamp: Instant,
    /// Largest number of distinct paths any range summary has covered
    pub max_files_accumulated: usize,
}

impl JournalStats {
    /// Seconds between the oldest retained delta and now
    pub fn duration_in_seconds(&self) -> u64 {
        self.earliest_timestamp.elapsed().as_secs()
    }
}
