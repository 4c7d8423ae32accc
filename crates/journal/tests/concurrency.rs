//! Multi-threaded journal tests
//!
//! Producers, readers, and subscribers all hit the journal concurrently in
//! the mounted filesystem, so the ordering guarantees need to hold under
//! real contention.

use overlook_core::{CommitHash, RelativePathPiece};
use overlook_journal::Journal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const PRODUCERS: usize = 4;
const RECORDS_PER_PRODUCER: usize = 250;

#[test]
fn concurrent_producers_get_unique_increasing_sequences() {
    let journal = Journal::default();
    let notifications = Arc::new(AtomicUsize::new(0));
    let seen = notifications.clone();
    journal.register_subscriber(move || {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let journal = &journal;
            scope.spawn(move || {
                for i in 0..RECORDS_PER_PRODUCER {
                    // Distinct paths, so nothing compacts and every record
                    // stays an individual delta
                    let name = format!("producer_{producer}/file_{i}.rs");
                    let path = RelativePathPiece::new(&name).unwrap();
                    journal.record_changed(path).unwrap();
                }
            });
        }
    });

    let total = PRODUCERS * RECORDS_PER_PRODUCER;
    assert_eq!(notifications.load(Ordering::SeqCst), total);

    let stats = journal.get_stats().unwrap();
    assert_eq!(stats.entry_count, total);

    let summary = journal.accumulate_range(0).unwrap();
    assert_eq!(summary.from_sequence, 1);
    assert_eq!(summary.to_sequence, total as u64);
    assert_eq!(summary.changed_files_in_overlay.len(), total);
    assert!(!summary.is_truncated);

    // The debug dump sees a strictly decreasing sequence, newest first
    let dump = journal.get_debug_raw_journal_info(0, None, 0);
    assert_eq!(dump.len(), total);
    for pair in dump.windows(2) {
        assert!(pair[0].sequence_id > pair[1].sequence_id);
        assert!(pair[0].time >= pair[1].time);
    }
}

#[test]
fn readers_observe_monotonic_sequences_during_writes() {
    let journal = Journal::default();

    thread::scope(|scope| {
        let writer = {
            let journal = &journal;
            scope.spawn(move || {
                for i in 0..RECORDS_PER_PRODUCER {
                    let name = format!("write/file_{i}.rs");
                    journal
                        .record_changed(RelativePathPiece::new(&name).unwrap())
                        .unwrap();
                }
            })
        };

        for _ in 0..3 {
            let journal = &journal;
            scope.spawn(move || {
                let mut last_seen = 0u64;
                loop {
                    if let Some(latest) = journal.get_latest() {
                        assert!(latest.sequence_id >= last_seen);
                        last_seen = latest.sequence_id;
                    }
                    if let Some(summary) = journal.accumulate_range(0) {
                        assert!(summary.to_sequence >= last_seen);
                        assert!(summary.from_sequence <= summary.to_sequence);
                    }
                    if last_seen >= RECORDS_PER_PRODUCER as u64 {
                        break;
                    }
                }
            });
        }

        writer.join().unwrap();
    });

    assert_eq!(
        journal.get_latest().unwrap().sequence_id,
        RECORDS_PER_PRODUCER as u64
    );
}

#[test]
fn concurrent_hash_updates_keep_a_coherent_tip() {
    let journal = Journal::default();

    thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let journal = &journal;
            scope.spawn(move || {
                for i in 0..32 {
                    let mut bytes = [0u8; 32];
                    bytes[0] = producer as u8;
                    bytes[1] = i as u8;
                    journal
                        .record_hash_update(CommitHash::from_bytes(bytes))
                        .unwrap();
                }
            });
        }
    });

    // Clean updates may have merged arbitrarily, but the tip must carry the
    // last sequence assigned and the current hash on both ends of a summary
    // that contains every retained update.
    let latest = journal.get_latest().unwrap();
    assert_eq!(latest.sequence_id, (PRODUCERS * 32) as u64);

    let summary = journal.accumulate_range(0).unwrap();
    assert_eq!(summary.to_hash, latest.to_hash);
}

#[test]
fn eviction_under_concurrent_writes_keeps_newest() {
    let journal = Journal::default();
    journal.set_memory_limit(1);

    thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let journal = &journal;
            scope.spawn(move || {
                for i in 0..64 {
                    let name = format!("p{producer}/f{i}");
                    journal
                        .record_changed(RelativePathPiece::new(&name).unwrap())
                        .unwrap();
                }
            });
        }
    });

    // Everything but the newest delta was evicted
    let stats = journal.get_stats().unwrap();
    assert_eq!(stats.entry_count, 1);
    let latest = journal.get_latest().unwrap();
    assert_eq!(latest.sequence_id, (PRODUCERS * 64) as u64);

    let summary = journal.accumulate_range(1).unwrap();
    assert!(summary.is_truncated);
    assert_eq!(summary.from_sequence, latest.sequence_id);
}
