//! Subscriber registry, locked independently of the delta log

use anyhow::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier returned by [`crate::Journal::register_subscriber`]
pub type SubscriberId = u64;

/// Callback invoked after every successful record or flush.
///
/// Callbacks run synchronously on the mutating thread with no journal locks
/// held, often in the middle of a filesystem mutation; do the minimum needed
/// to schedule real work elsewhere. A callback may call back into the
/// journal, but must not assume the delta that triggered it is still
/// retained.
pub type SubscriberCallback = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Registered callbacks, keyed by id.
///
/// Uses its own sharded map so registration and notification never contend
/// with the delta log lock.
pub(crate) struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: DashMap<SubscriberId, SubscriberCallback>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: DashMap::new(),
        }
    }

    pub fn register(&self, callback: SubscriberCallback) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.insert(id, callback);
        id
    }

    pub fn cancel(&self, id: SubscriberId) {
        self.subscribers.remove(&id);
    }

    pub fn cancel_all(&self) {
        self.subscribers.clear();
    }

    pub fn is_valid(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    /// Copy of the live callbacks. Iterating the copy keeps notification
    /// isolated from concurrent cancellation and holds no map shard while a
    /// callback runs.
    pub fn snapshot(&self) -> Vec<SubscriberCallback> {
        self.subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> SubscriberCallback {
        Arc::new(|| Ok(()))
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let registry = SubscriberRegistry::new();
        assert_eq!(registry.register(noop()), 1);
        assert_eq!(registry.register(noop()), 2);
        assert_eq!(registry.register(noop()), 3);
    }

    #[test]
    fn test_cancel_and_validity() {
        let registry = SubscriberRegistry::new();
        let id = registry.register(noop());
        assert!(registry.is_valid(id));
        registry.cancel(id);
        assert!(!registry.is_valid(id));
        // Cancelling an unknown id is a no-op
        registry.cancel(999);
    }

    #[test]
    fn test_cancel_all() {
        let registry = SubscriberRegistry::new();
        let a = registry.register(noop());
        let b = registry.register(noop());
        registry.cancel_all();
        assert!(!registry.is_valid(a));
        assert!(!registry.is_valid(b));
        // Ids keep advancing after a clear
        assert_eq!(registry.register(noop()), 3);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let registry = SubscriberRegistry::new();
        let id = registry.register(noop());
        let snapshot = registry.snapshot();
        registry.cancel(id);
        // The snapshot still holds the callback even though it was cancelled
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.snapshot().len(), 0);
    }
}
