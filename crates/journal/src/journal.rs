//! Append-only, bounded-memory log of overlay mutations and checkout
//! transitions

use crate::delta::{DeltaRef, FileChange, FileChangeDelta, HashUpdateDelta, SequenceNumber};
use crate::range::RangeSummary;
use crate::stats::{AtomicCounter, Counter, JournalStats};
use crate::subscribers::{SubscriberId, SubscriberRegistry};
use ahash::AHashSet;
use anyhow::Result;
use overlook_core::{CommitHash, RelativePath, RelativePathPiece, ZERO_HASH};
use parking_lot::RwLock;
use std::collections::vec_deque;
use std::collections::VecDeque;
use std::iter::{Peekable, Rev};
use std::mem;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Default byte cap for stored deltas
const DEFAULT_MEMORY_LIMIT: usize = 1_000_000_000;

/// Copy of the tip of the journal.
///
/// A file-change tip reports the current checkout hash on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaInfo {
    pub from_hash: CommitHash,
    pub to_hash: CommitHash,
    pub sequence_id: SequenceNumber,
    pub time: Instant,
}

/// One stored delta, dumped verbatim for debugging
#[derive(Debug, Clone)]
pub struct DebugDelta {
    /// Opaque annotation passed through from the caller
    pub mount_generation: i64,
    pub sequence_id: SequenceNumber,
    pub time: Instant,
    pub kind: DebugDeltaKind,
}

/// Payload of a dumped delta, mirroring the stored entry
#[derive(Debug, Clone)]
pub enum DebugDeltaKind {
    FileChange(FileChange),
    HashUpdate {
        from_hash: CommitHash,
        to_hash: CommitHash,
        unclean_paths: AHashSet<RelativePath>,
    },
}

/// The journal's inner state, guarded by one lock.
///
/// File-change and hash-update deltas live in separate deques (oldest at the
/// front) but share a single sequence counter, so the union of both deques
/// is totally ordered by `sequence_id`.
struct DeltaState {
    /// Sequence id the next recorded delta will receive
    next_sequence: SequenceNumber,
    file_change_deltas: VecDeque<FileChangeDelta>,
    hash_update_deltas: VecDeque<HashUpdateDelta>,
    /// `to_hash` of the most recent hash update ever recorded, surviving
    /// eviction and flush
    current_hash: CommitHash,
    stats: Option<JournalStats>,
    memory_limit: usize,
    delta_memory_usage: usize,
}

impl DeltaState {
    fn new() -> Self {
        Self {
            next_sequence: 1,
            file_change_deltas: VecDeque::new(),
            hash_update_deltas: VecDeque::new(),
            current_hash: ZERO_HASH,
            stats: None,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            delta_memory_usage: 0,
        }
    }

    fn assign_sequence(&mut self) -> SequenceNumber {
        let sequence_id = self.next_sequence;
        self.next_sequence += 1;
        sequence_id
    }

    fn entry_count(&self) -> usize {
        self.file_change_deltas.len() + self.hash_update_deltas.len()
    }

    fn is_file_change_in_front(&self) -> bool {
        match (self.file_change_deltas.front(), self.hash_update_deltas.front()) {
            (Some(file), Some(hash)) => file.sequence_id < hash.sequence_id,
            (Some(_), None) => true,
            _ => false,
        }
    }

    fn is_file_change_in_back(&self) -> bool {
        match (self.file_change_deltas.back(), self.hash_update_deltas.back()) {
            (Some(file), Some(hash)) => file.sequence_id > hash.sequence_id,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Globally oldest stored delta
    fn front(&self) -> Option<DeltaRef<'_>> {
        if self.is_file_change_in_front() {
            self.file_change_deltas.front().map(DeltaRef::FileChange)
        } else {
            self.hash_update_deltas.front().map(DeltaRef::HashUpdate)
        }
    }

    /// Globally newest stored delta
    fn latest(&self) -> Option<DeltaRef<'_>> {
        if self.is_file_change_in_back() {
            self.file_change_deltas.back().map(DeltaRef::FileChange)
        } else {
            self.hash_update_deltas.back().map(DeltaRef::HashUpdate)
        }
    }

    fn front_sequence_id(&self) -> Option<SequenceNumber> {
        self.front().map(|delta| delta.sequence_id())
    }

    /// Merged traversal of both deques, newest first
    fn iter_newest_to_oldest(&self) -> NewestToOldest<'_> {
        NewestToOldest {
            file_changes: self.file_change_deltas.iter().rev().peekable(),
            hash_updates: self.hash_update_deltas.iter().rev().peekable(),
        }
    }

    /// Insert a stamped file change. When the tail already records the same
    /// single-path event on the same path, the incoming delta is discarded
    /// and the tail keeps its sequence id and timestamp; the sequence
    /// counter has already advanced, so observers still see forward motion.
    fn insert_file_change(&mut self, delta: FileChangeDelta) {
        if let Some(back) = self.file_change_deltas.back() {
            if back.change.is_same_action(&delta.change) {
                return;
            }
        }
        self.note_appended(delta.time, delta.estimate_memory_usage());
        self.file_change_deltas.push_back(delta);
    }

    /// Insert a stamped hash update. Back-to-back clean transitions collapse
    /// into the tail, which takes the incoming sequence id and timestamp but
    /// keeps its original `from_hash`, so the collapsed entry still
    /// describes the full transition. Unclean transitions never merge; their
    /// path sets must stay individually queryable.
    fn insert_hash_update(&mut self, delta: HashUpdateDelta) {
        self.current_hash = delta.to_hash;
        let time = delta.time;
        match self.merge_clean_hash_update(delta) {
            None => {
                // The rewritten tail carries the new timestamp and may also
                // be the oldest stored delta
                let earliest = self.front().map(|front| front.time());
                if let Some(stats) = &mut self.stats {
                    stats.latest_timestamp = time;
                    if let Some(earliest) = earliest {
                        stats.earliest_timestamp = earliest;
                    }
                }
            }
            Some(delta) => {
                self.note_appended(time, delta.estimate_memory_usage());
                self.hash_update_deltas.push_back(delta);
            }
        }
    }

    /// Try to collapse a clean transition into a clean tail. Returns the
    /// delta back when it cannot merge.
    fn merge_clean_hash_update(&mut self, mut delta: HashUpdateDelta) -> Option<HashUpdateDelta> {
        if !delta.unclean_paths.is_empty() {
            return Some(delta);
        }
        let Some(back) = self.hash_update_deltas.back_mut() else {
            return Some(delta);
        };
        if !back.unclean_paths.is_empty() {
            return Some(delta);
        }
        delta.from_hash = back.from_hash;
        let removed = back.estimate_memory_usage();
        *back = delta;
        self.delta_memory_usage = self.delta_memory_usage + back.estimate_memory_usage() - removed;
        None
    }

    fn note_appended(&mut self, time: Instant, estimate: usize) {
        self.delta_memory_usage += estimate;
        match &mut self.stats {
            Some(stats) => {
                stats.entry_count += 1;
                stats.latest_timestamp = time;
            }
            None => {
                self.stats = Some(JournalStats {
                    entry_count: 1,
                    earliest_timestamp: time,
                    latest_timestamp: time,
                    max_files_accumulated: 0,
                });
            }
        }
    }

    /// Drop oldest deltas until usage fits the limit. The newest delta is
    /// never dropped, even when it alone exceeds the limit.
    fn evict_to_fit(&mut self) {
        let mut evicted = 0usize;
        while self.delta_memory_usage > self.memory_limit && self.entry_count() > 1 {
            self.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(
                "evicted {} oldest deltas to fit the {} byte memory limit",
                evicted, self.memory_limit
            );
        }
    }

    /// Remove the globally oldest delta, keeping usage and stats in step
    fn pop_front(&mut self) {
        let freed = if self.is_file_change_in_front() {
            self.file_change_deltas
                .pop_front()
                .map(|delta| delta.estimate_memory_usage())
        } else {
            self.hash_update_deltas
                .pop_front()
                .map(|delta| delta.estimate_memory_usage())
        };
        let Some(freed) = freed else { return };
        self.delta_memory_usage -= freed;
        match self.front().map(|delta| delta.time()) {
            Some(earliest) => {
                if let Some(stats) = &mut self.stats {
                    stats.entry_count -= 1;
                    stats.earliest_timestamp = earliest;
                }
            }
            None => {
                self.stats = None;
                self.delta_memory_usage = 0;
            }
        }
    }
}

struct NewestToOldest<'a> {
    file_changes: Peekable<Rev<vec_deque::Iter<'a, FileChangeDelta>>>,
    hash_updates: Peekable<Rev<vec_deque::Iter<'a, HashUpdateDelta>>>,
}

impl<'a> Iterator for NewestToOldest<'a> {
    type Item = DeltaRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match (self.file_changes.peek(), self.hash_updates.peek()) {
            (Some(file), Some(hash)) => {
                if file.sequence_id > hash.sequence_id {
                    self.file_changes.next().map(DeltaRef::FileChange)
                } else {
                    self.hash_updates.next().map(DeltaRef::HashUpdate)
                }
            }
            (Some(_), None) => self.file_changes.next().map(DeltaRef::FileChange),
            (None, Some(_)) => self.hash_updates.next().map(DeltaRef::HashUpdate),
            (None, None) => None,
        }
    }
}

/// The Journal answers questions about how files changed over time.
///
/// It records metadata only; it is not a snapshot of the filesystem at a
/// point in time. The intended queries are of the form "which files changed
/// between sequence A and now?", answered by [`Journal::accumulate_range`].
///
/// The journal is thread-safe. Subscribers run on the thread that recorded
/// the triggering delta. History is bounded: once the configured memory
/// limit is reached the oldest deltas are evicted, and range queries whose
/// bound reaches past the retained window say so via
/// [`RangeSummary::is_truncated`].
pub struct Journal {
    delta_state: RwLock<DeltaState>,
    subscribers: SubscriberRegistry,
    truncated_reads: Arc<dyn Counter>,
}

impl Journal {
    /// Create an empty journal reporting truncated reads to the given sink.
    ///
    /// Reports zero immediately so the counter registers with the embedder's
    /// metrics system.
    pub fn new(truncated_reads: Arc<dyn Counter>) -> Self {
        truncated_reads.add_value(0);
        Self {
            delta_state: RwLock::new(DeltaState::new()),
            subscribers: SubscriberRegistry::new(),
            truncated_reads,
        }
    }

    /// Record that `path` was created in the overlay
    pub fn record_created(&self, path: RelativePathPiece<'_>) -> Result<()> {
        self.add_file_change(FileChange::Created(path.to_owned()))
    }

    /// Record that `path` was removed from the overlay
    pub fn record_removed(&self, path: RelativePathPiece<'_>) -> Result<()> {
        self.add_file_change(FileChange::Removed(path.to_owned()))
    }

    /// Record that `path`'s content changed
    pub fn record_changed(&self, path: RelativePathPiece<'_>) -> Result<()> {
        self.add_file_change(FileChange::Changed(path.to_owned()))
    }

    /// Record a move where `to` was created by the move
    pub fn record_renamed(
        &self,
        from: RelativePathPiece<'_>,
        to: RelativePathPiece<'_>,
    ) -> Result<()> {
        self.add_file_change(FileChange::Renamed {
            from: from.to_owned(),
            to: to.to_owned(),
        })
    }

    /// Record a move where `to` already existed and was overwritten
    pub fn record_replaced(
        &self,
        from: RelativePathPiece<'_>,
        to: RelativePathPiece<'_>,
    ) -> Result<()> {
        self.add_file_change(FileChange::Replaced {
            from: from.to_owned(),
            to: to.to_owned(),
        })
    }

    /// Record a checkout transition from the current hash to `to_hash`
    pub fn record_hash_update(&self, to_hash: CommitHash) -> Result<()> {
        self.add_hash_update(None, to_hash, AHashSet::new())
    }

    /// Record a checkout transition with an explicit starting hash
    pub fn record_hash_transition(
        &self,
        from_hash: CommitHash,
        to_hash: CommitHash,
    ) -> Result<()> {
        self.add_hash_update(Some(from_hash), to_hash, AHashSet::new())
    }

    /// Record a checkout transition that left `unclean_paths` dirty relative
    /// to the checkout at `to_hash`
    pub fn record_unclean_paths(
        &self,
        from_hash: CommitHash,
        to_hash: CommitHash,
        unclean_paths: AHashSet<RelativePath>,
    ) -> Result<()> {
        self.add_hash_update(Some(from_hash), to_hash, unclean_paths)
    }

    fn add_file_change(&self, change: FileChange) -> Result<()> {
        {
            let mut state = self.delta_state.write();
            let delta = FileChangeDelta {
                sequence_id: state.assign_sequence(),
                time: Instant::now(),
                change,
            };
            state.insert_file_change(delta);
            state.evict_to_fit();
        }
        self.notify_subscribers()
    }

    fn add_hash_update(
        &self,
        from_hash: Option<CommitHash>,
        to_hash: CommitHash,
        unclean_paths: AHashSet<RelativePath>,
    ) -> Result<()> {
        {
            let mut state = self.delta_state.write();
            let delta = HashUpdateDelta {
                sequence_id: state.assign_sequence(),
                time: Instant::now(),
                from_hash: from_hash.unwrap_or(state.current_hash),
                to_hash,
                unclean_paths,
            };
            state.insert_hash_update(delta);
            state.evict_to_fit();
        }
        self.notify_subscribers()
    }

    /// Copy of the newest delta, or `None` when the journal is empty
    pub fn get_latest(&self) -> Option<DeltaInfo> {
        let state = self.delta_state.read();
        state.latest().map(|delta| match delta {
            DeltaRef::FileChange(change) => DeltaInfo {
                from_hash: state.current_hash,
                to_hash: state.current_hash,
                sequence_id: change.sequence_id,
                time: change.time,
            },
            DeltaRef::HashUpdate(update) => DeltaInfo {
                from_hash: update.from_hash,
                to_hash: update.to_hash,
                sequence_id: update.sequence_id,
                time: update.time,
            },
        })
    }

    /// Copy of the journal statistics, or `None` when empty
    pub fn get_stats(&self) -> Option<JournalStats> {
        self.delta_state.read().stats
    }

    /// Fold every delta with sequence id `>= limit_sequence` into a single
    /// summary. `0` is never assigned and means "everything". Returns `None`
    /// when no delta qualifies. A summary whose bound reaches past the
    /// oldest retained delta is marked truncated and counted on the
    /// truncated-reads sink; it remains valid for the retained portion.
    pub fn accumulate_range(&self, limit_sequence: SequenceNumber) -> Option<RangeSummary> {
        let summary = {
            let mut state = self.delta_state.write();
            Self::accumulate_range_locked(&mut state, limit_sequence)
        };
        if let Some(summary) = &summary {
            if summary.is_truncated {
                trace!("range read from sequence {} was truncated", limit_sequence);
                self.truncated_reads.add_value(1);
            }
        }
        summary
    }

    fn accumulate_range_locked(
        state: &mut DeltaState,
        limit_sequence: SequenceNumber,
    ) -> Option<RangeSummary> {
        let current_hash = state.current_hash;
        let mut result: Option<RangeSummary> = None;
        let mut saw_hash_update = false;
        for delta in state.iter_newest_to_oldest() {
            if delta.sequence_id() < limit_sequence {
                break;
            }
            let summary = result.get_or_insert_with(|| {
                RangeSummary::starting_at(delta.sequence_id(), delta.time(), current_hash)
            });
            summary.from_sequence = delta.sequence_id();
            summary.from_time = delta.time();
            match delta {
                DeltaRef::FileChange(change) => {
                    summary.merge_changed_files(change.change.changed_files());
                }
                DeltaRef::HashUpdate(update) => {
                    // Newest hash update in range fixes to_hash; each older
                    // one overwrites from_hash, leaving the oldest's value.
                    if !saw_hash_update {
                        summary.to_hash = update.to_hash;
                        saw_hash_update = true;
                    }
                    summary.from_hash = update.from_hash;
                    for path in &update.unclean_paths {
                        summary.unclean_paths.insert(path.clone());
                    }
                }
            }
        }
        if let Some(summary) = &mut result {
            summary.is_truncated = limit_sequence > 0
                && state
                    .front_sequence_id()
                    .is_some_and(|front| limit_sequence < front);
            if let Some(stats) = &mut state.stats {
                stats.max_files_accumulated = stats
                    .max_files_accumulated
                    .max(summary.changed_files_in_overlay.len());
            }
        }
        result
    }

    /// Dump up to `limit` stored deltas with sequence id `>= from`, newest
    /// first. `mount_generation` is copied into every record unchanged.
    pub fn get_debug_raw_journal_info(
        &self,
        from: SequenceNumber,
        limit: Option<usize>,
        mount_generation: i64,
    ) -> Vec<DebugDelta> {
        let state = self.delta_state.read();
        let mut entries = Vec::new();
        for delta in state.iter_newest_to_oldest() {
            if delta.sequence_id() < from {
                break;
            }
            if limit.is_some_and(|limit| entries.len() >= limit) {
                break;
            }
            let kind = match delta {
                DeltaRef::FileChange(change) => DebugDeltaKind::FileChange(change.change.clone()),
                DeltaRef::HashUpdate(update) => DebugDeltaKind::HashUpdate {
                    from_hash: update.from_hash,
                    to_hash: update.to_hash,
                    unclean_paths: update.unclean_paths.clone(),
                },
            };
            entries.push(DebugDelta {
                mount_generation,
                sequence_id: delta.sequence_id(),
                time: delta.time(),
                kind,
            });
        }
        entries
    }

    /// Drop all retained deltas. The sequence counter and the current hash
    /// are kept, so later range queries over pre-flush bounds report
    /// truncation instead of silently missing history. Notifies subscribers
    /// once.
    pub fn flush(&self) -> Result<()> {
        {
            let mut state = self.delta_state.write();
            state.file_change_deltas.clear();
            state.hash_update_deltas.clear();
            state.stats = None;
            state.delta_memory_usage = 0;
            debug!("journal flushed; next sequence id is {}", state.next_sequence);
        }
        self.notify_subscribers()
    }

    /// Set the byte cap for stored deltas; shrinking evicts immediately
    pub fn set_memory_limit(&self, limit: usize) {
        let mut state = self.delta_state.write();
        state.memory_limit = limit;
        state.evict_to_fit();
    }

    pub fn get_memory_limit(&self) -> usize {
        self.delta_state.read().memory_limit
    }

    /// Estimated bytes retained by the journal, monotone in the number of
    /// stored deltas and the paths they reference
    pub fn estimate_memory_usage(&self) -> usize {
        mem::size_of::<Self>() + self.delta_state.read().delta_memory_usage
    }

    /// Register a callback invoked after every recorded delta and flush.
    ///
    /// Callbacks run on the recording thread, typically in the middle of a
    /// filesystem mutation; do the minimum needed to schedule real work
    /// elsewhere. The returned id can be passed to
    /// [`Journal::cancel_subscriber`].
    pub fn register_subscriber<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.subscribers.register(Arc::new(callback))
    }

    pub fn cancel_subscriber(&self, id: SubscriberId) {
        self.subscribers.cancel(id);
    }

    pub fn cancel_all_subscribers(&self) {
        self.subscribers.cancel_all();
    }

    pub fn is_subscriber_valid(&self, id: SubscriberId) -> bool {
        self.subscribers.is_valid(id)
    }

    /// Invoke every subscriber with no journal locks held. All callbacks run
    /// even when an earlier one fails; the first error is returned to the
    /// recording caller.
    fn notify_subscribers(&self) -> Result<()> {
        let mut first_error = None;
        for callback in self.subscribers.snapshot() {
            if let Err(error) = callback() {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new(Arc::new(AtomicCounter::new()))
    }
}
