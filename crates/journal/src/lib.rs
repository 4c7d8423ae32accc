//! Change journal for the Overlook virtual filesystem
//!
//! This crate provides:
//! - Delta records (overlay file changes, checkout hash transitions)
//! - The append-only, bounded-memory journal with a single sequence counter
//! - Range accumulation ("what changed since sequence N?")
//! - Subscriber notification
//! - Journal statistics and telemetry counters

pub mod delta;
pub mod journal;
pub mod range;
pub mod stats;
pub mod subscribers;

// Re-exports
pub use delta::{FileChange, FileChangeDelta, HashUpdateDelta, PathChangeInfo, SequenceNumber};
pub use journal::{DebugDelta, DebugDeltaKind, DeltaInfo, Journal};
pub use range::RangeSummary;
pub use stats::{AtomicCounter, Counter, JournalStats, TRUNCATED_READS};
pub use subscribers::{SubscriberCallback, SubscriberId};

/// Result type for journal operations
pub type Result<T> = anyhow::Result<T>;
