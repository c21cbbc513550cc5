//! Advisory record of which SidecarWorkloads were last seen deleted
//!
//! After the finalizer is released the object disappears, and the next
//! reconcile fails to fetch it. The tracker lets the loop recognise that
//! case and finish quietly instead of surfacing a not-found error. Losing
//! an entry (restart, eviction) costs one extra retry and nothing more.

use dashmap::DashMap;

use crate::crd::ObjectKey;

/// Thread-safe map of `ObjectKey` to "most recently observed as deleted"
#[derive(Debug, Default)]
pub struct DeletionTracker {
    entries: DashMap<ObjectKey, bool>,
}

impl DeletionTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record whether `key` was last observed deleted
    ///
    /// Only deleted keys are stored; a live observation drops the entry.
    pub fn set(&self, key: &ObjectKey, deleted: bool) {
        if deleted {
            self.entries.insert(key.clone(), true);
        } else {
            self.entries.remove(key);
        }
    }

    /// True if `key` was last observed deleted; false when unknown
    pub fn get(&self, key: &ObjectKey) -> bool {
        self.entries.get(key).map(|e| *e).unwrap_or(false)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn unknown_keys_are_not_deleted() {
        let tracker = DeletionTracker::new();
        assert!(!tracker.get(&ObjectKey::new("default", "proxy")));
        assert!(tracker.is_empty());
    }

    /// Story: a delete followed by a re-create flips the entry back
    #[test]
    fn story_recreate_clears_deleted_mark() {
        let tracker = DeletionTracker::new();
        let key = ObjectKey::new("default", "proxy");

        tracker.set(&key, true);
        assert!(tracker.get(&key));

        tracker.set(&key, false);
        assert!(!tracker.get(&key));
        assert!(tracker.is_empty());
    }

    /// Story: live resources never occupy the tracker
    ///
    /// Only keys last seen deleted are kept, so the map grows with deletions
    /// and not with every resource the controller has seen.
    #[test]
    fn story_live_observations_are_not_stored() {
        let tracker = DeletionTracker::new();
        for i in 0..50 {
            tracker.set(&ObjectKey::new("default", format!("live-{i}")), false);
        }
        assert!(tracker.is_empty());

        let gone = ObjectKey::new("default", "gone");
        tracker.set(&gone, true);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(&gone));
    }

    #[test]
    fn keys_are_namespace_scoped() {
        let tracker = DeletionTracker::new();
        tracker.set(&ObjectKey::new("team-a", "proxy"), true);
        assert!(!tracker.get(&ObjectKey::new("team-b", "proxy")));
    }

    /// Story: parallel reconciles of different keys share one tracker
    #[test]
    fn story_concurrent_writers_for_different_keys() {
        let tracker = Arc::new(DeletionTracker::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let key = ObjectKey::new("default", format!("proxy-{i}"));
                    for round in 0..100 {
                        tracker.set(&key, round % 2 == 0);
                        let _ = tracker.get(&key);
                    }
                    tracker.set(&key, i % 2 == 0);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.len(), 4);
        for i in 0..8 {
            let key = ObjectKey::new("default", format!("proxy-{i}"));
            assert_eq!(tracker.get(&key), i % 2 == 0);
        }
    }
}
