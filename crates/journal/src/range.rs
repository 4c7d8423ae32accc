//! Range summaries: a window of deltas folded into one answer

use crate::delta::{PathChangeInfo, SequenceNumber};
use ahash::{AHashMap, AHashSet};
use overlook_core::{CommitHash, RelativePath};
use std::time::Instant;

/// Summary of every delta with sequence id at or above the queried bound.
///
/// Produced by [`crate::Journal::accumulate_range`].
#[derive(Debug, Clone)]
pub struct RangeSummary {
    /// Oldest sequence id covered by the summary
    pub from_sequence: SequenceNumber,
    /// Newest sequence id covered by the summary
    pub to_sequence: SequenceNumber,
    /// Time of the oldest delta in range
    pub from_time: Instant,
    /// Time of the newest delta in range
    pub to_time: Instant,
    /// `from_hash` of the oldest hash update in range, or the current hash
    /// when the range contains none
    pub from_hash: CommitHash,
    /// `to_hash` of the newest hash update in range, or the current hash
    /// when the range contains none
    pub to_hash: CommitHash,
    /// Existence transition per path, folded in sequence order
    pub changed_files_in_overlay: AHashMap<RelativePath, PathChangeInfo>,
    /// Union of the unclean path sets of every hash update in range
    pub unclean_paths: AHashSet<RelativePath>,
    /// The queried bound predates the oldest retained delta; older data has
    /// been evicted or flushed and is not represented here
    pub is_truncated: bool,
}

impl RangeSummary {
    pub(crate) fn starting_at(delta_sequence: SequenceNumber, delta_time: Instant, current_hash: CommitHash) -> Self {
        Self {
            from_sequence: delta_sequence,
            to_sequence: delta_sequence,
            from_time: delta_time,
            to_time: delta_time,
            from_hash: current_hash,
            to_hash: current_hash,
            changed_files_in_overlay: AHashMap::new(),
            unclean_paths: AHashSet::new(),
            is_truncated: false,
        }
    }

    /// Merge one delta's path transitions into the summary.
    ///
    /// Traversal runs newest to oldest, so a path already present keeps its
    /// `existed_after` from the newer delta and takes `existed_before` from
    /// the older one.
    pub(crate) fn merge_changed_files<I>(&mut self, changes: I)
    where
        I: IntoIterator<Item = (RelativePath, PathChangeInfo)>,
    {
        for (path, info) in changes {
            self.changed_files_in_overlay
                .entry(path)
                .and_modify(|existing| existing.existed_before = info.existed_before)
                .or_insert(info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlook_core::ZERO_HASH;

    fn path(s: &str) -> RelativePath {
        RelativePath::new(s).unwrap()
    }

    fn empty_summary() -> RangeSummary {
        RangeSummary::starting_at(1, Instant::now(), ZERO_HASH)
    }

    #[test]
    fn test_merge_unseen_path_inserts() {
        let mut summary = empty_summary();
        summary.merge_changed_files([(path("a"), PathChangeInfo::new(true, true))]);
        assert_eq!(
            summary.changed_files_in_overlay.get("a"),
            Some(&PathChangeInfo::new(true, true))
        );
    }

    #[test]
    fn test_merge_seen_path_takes_older_existed_before() {
        let mut summary = empty_summary();
        // Newest delta: path created
        summary.merge_changed_files([(path("a"), PathChangeInfo::new(false, true))]);
        // Older delta: path removed (it existed before that removal)
        summary.merge_changed_files([(path("a"), PathChangeInfo::new(true, false))]);
        // existed_after stays from the newest, existed_before from the oldest
        assert_eq!(
            summary.changed_files_in_overlay.get("a"),
            Some(&PathChangeInfo::new(true, true))
        );
    }

    #[test]
    fn test_merge_independent_paths() {
        let mut summary = empty_summary();
        summary.merge_changed_files([
            (path("a"), PathChangeInfo::new(false, true)),
            (path("b"), PathChangeInfo::new(true, false)),
        ]);
        assert_eq!(summary.changed_files_in_overlay.len(), 2);
        assert_eq!(
            summary.changed_files_in_overlay.get("b"),
            Some(&PathChangeInfo::new(true, false))
        );
    }
}
