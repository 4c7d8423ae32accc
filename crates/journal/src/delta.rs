//! Delta records: one entry per observed mutation

use ahash::AHashSet;
use overlook_core::{CommitHash, RelativePath};
use smallvec::{smallvec, SmallVec};
use std::mem;
use std::time::Instant;

/// Monotonic tag assigned to every delta at append time.
///
/// `0` is never assigned; range queries use it as the "no lower bound"
/// sentinel. The first assigned value is `1`.
pub type SequenceNumber = u64;

/// Whether a path existed before and after the changes being described
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PathChangeInfo {
    pub existed_before: bool,
    pub existed_after: bool,
}

impl PathChangeInfo {
    pub fn new(existed_before: bool, existed_after: bool) -> Self {
        Self {
            existed_before,
            existed_after,
        }
    }
}

/// A single observed file mutation.
///
/// `Renamed` means `to` was created by the move; `Replaced` means `to`
/// already existed and was overwritten by the move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Created(RelativePath),
    Removed(RelativePath),
    Changed(RelativePath),
    Renamed { from: RelativePath, to: RelativePath },
    Replaced { from: RelativePath, to: RelativePath },
}

impl FileChange {
    /// The one or two paths involved in this change
    pub fn paths(&self) -> SmallVec<[&RelativePath; 2]> {
        match self {
            FileChange::Created(path) | FileChange::Removed(path) | FileChange::Changed(path) => {
                smallvec![path]
            }
            FileChange::Renamed { from, to } | FileChange::Replaced { from, to } => {
                smallvec![from, to]
            }
        }
    }

    /// Whether `newer` repeats the same single-path event on the same path,
    /// so the journal can drop it as already represented. Two-path changes
    /// never merge.
    pub(crate) fn is_same_action(&self, newer: &FileChange) -> bool {
        match (self, newer) {
            (FileChange::Created(a), FileChange::Created(b))
            | (FileChange::Removed(a), FileChange::Removed(b))
            | (FileChange::Changed(a), FileChange::Changed(b)) => a == b,
            _ => false,
        }
    }

    /// Per-path existence transitions described by this change
    pub fn changed_files(&self) -> SmallVec<[(RelativePath, PathChangeInfo); 2]> {
        match self {
            FileChange::Created(path) => {
                smallvec![(path.clone(), PathChangeInfo::new(false, true))]
            }
            FileChange::Removed(path) => {
                smallvec![(path.clone(), PathChangeInfo::new(true, false))]
            }
            FileChange::Changed(path) => {
                smallvec![(path.clone(), PathChangeInfo::new(true, true))]
            }
            FileChange::Renamed { from, to } => smallvec![
                (from.clone(), PathChangeInfo::new(true, false)),
                (to.clone(), PathChangeInfo::new(false, true)),
            ],
            FileChange::Replaced { from, to } => smallvec![
                (from.clone(), PathChangeInfo::new(true, false)),
                (to.clone(), PathChangeInfo::new(true, true)),
            ],
        }
    }
}

/// A file mutation as stored in the journal
#[derive(Debug, Clone)]
pub struct FileChangeDelta {
    pub sequence_id: SequenceNumber,
    pub time: Instant,
    pub change: FileChange,
}

impl FileChangeDelta {
    /// Estimated bytes this delta retains, for the journal memory budget
    pub fn estimate_memory_usage(&self) -> usize {
        let paths: usize = self.change.paths().iter().map(|p| p.as_str().len()).sum();
        mem::size_of::<Self>() + paths
    }
}

/// A checkout-position transition as stored in the journal.
///
/// `from_hash` may be `ZERO_HASH` when no prior position was known.
/// `unclean_paths` lists paths left dirty relative to the checkout at
/// `to_hash`; it is frequently empty.
#[derive(Debug, Clone)]
pub struct HashUpdateDelta {
    pub sequence_id: SequenceNumber,
    pub time: Instant,
    pub from_hash: CommitHash,
    pub to_hash: CommitHash,
    pub unclean_paths: AHashSet<RelativePath>,
}

impl HashUpdateDelta {
    /// Estimated bytes this delta retains, for the journal memory budget
    pub fn estimate_memory_usage(&self) -> usize {
        let paths: usize = self
            .unclean_paths
            .iter()
            .map(|p| mem::size_of::<RelativePath>() + p.as_str().len())
            .sum();
        mem::size_of::<Self>() + paths
    }
}

/// Borrowed view of either kind of stored delta, for merged traversal
#[derive(Debug, Copy, Clone)]
pub(crate) enum DeltaRef<'a> {
    FileChange(&'a FileChangeDelta),
    HashUpdate(&'a HashUpdateDelta),
}

impl DeltaRef<'_> {
    pub(crate) fn sequence_id(&self) -> SequenceNumber {
        match self {
            DeltaRef::FileChange(delta) => delta.sequence_id,
            DeltaRef::HashUpdate(delta) => delta.sequence_id,
        }
    }

    pub(crate) fn time(&self) -> Instant {
        match self {
            DeltaRef::FileChange(delta) => delta.time,
            DeltaRef::HashUpdate(delta) => delta.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> RelativePath {
        RelativePath::new(s).unwrap()
    }

    #[test]
    fn test_same_action_single_path() {
        let changed_a = FileChange::Changed(path("a"));
        assert!(changed_a.is_same_action(&FileChange::Changed(path("a"))));
        assert!(!changed_a.is_same_action(&FileChange::Changed(path("b"))));
        assert!(!changed_a.is_same_action(&FileChange::Created(path("a"))));
        assert!(FileChange::Removed(path("a")).is_same_action(&FileChange::Removed(path("a"))));
    }

    #[test]
    fn test_two_path_changes_never_merge() {
        let renamed = FileChange::Renamed {
            from: path("a"),
            to: path("b"),
        };
        assert!(!renamed.is_same_action(&renamed.clone()));
        let replaced = FileChange::Replaced {
            from: path("a"),
            to: path("b"),
        };
        assert!(!replaced.is_same_action(&replaced.clone()));
    }

    #[test]
    fn test_changed_files_single_path() {
        let changes = FileChange::Created(path("a")).changed_files();
        assert_eq!(changes.as_slice(), &[(path("a"), PathChangeInfo::new(false, true))]);

        let changes = FileChange::Removed(path("a")).changed_files();
        assert_eq!(changes.as_slice(), &[(path("a"), PathChangeInfo::new(true, false))]);

        let changes = FileChange::Changed(path("a")).changed_files();
        assert_eq!(changes.as_slice(), &[(path("a"), PathChangeInfo::new(true, true))]);
    }

    #[test]
    fn test_changed_files_rename_and_replace() {
        let changes = FileChange::Renamed {
            from: path("old"),
            to: path("new"),
        }
        .changed_files();
        assert_eq!(
            changes.as_slice(),
            &[
                (path("old"), PathChangeInfo::new(true, false)),
                (path("new"), PathChangeInfo::new(false, true)),
            ]
        );

        let changes = FileChange::Replaced {
            from: path("old"),
            to: path("target"),
        }
        .changed_files();
        assert_eq!(
            changes.as_slice(),
            &[
                (path("old"), PathChangeInfo::new(true, false)),
                (path("target"), PathChangeInfo::new(true, true)),
            ]
        );
    }

    #[test]
    fn test_memory_estimate_grows_with_paths() {
        let short = FileChangeDelta {
            sequence_id: 1,
            time: Instant::now(),
            change: FileChange::Changed(path("a")),
        };
        let long = FileChangeDelta {
            sequence_id: 2,
            time: Instant::now(),
            change: FileChange::Changed(path("a/much/longer/path/name.txt")),
        };
        assert!(long.estimate_memory_usage() > short.estimate_memory_usage());

        let clean = HashUpdateDelta {
            sequence_id: 3,
            time: Instant::now(),
            from_hash: overlook_core::ZERO_HASH,
            to_hash: overlook_core::ZERO_HASH,
            unclean_paths: AHashSet::new(),
        };
        let mut dirty = clean.clone();
        dirty.unclean_paths.insert(path("dirty/file"));
        assert!(dirty.estimate_memory_usage() > clean.estimate_memory_usage());
    }
}
