//! Skip checkpoints: advisory timestamp-to-revision map per journal.
//!
//! A checkpoint `(timestamp -> revision)` lets a reader that wants to skip to a
//! point in time resume scanning near it instead of from the journal start.
//! Checkpoints are conservative: the stored revision never exceeds the revision
//! of the next unread record at the time it was recorded. Losing any or all of
//! them only forces a longer scan.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::store::RecordStore;

/// Timestamp-ordered checkpoints for one journal.
///
/// Entries are monotonic: a greater timestamp never maps to a smaller revision.
#[derive(Debug)]
pub struct SkipCheckpointCache {
    journal_id: String,
    entries: Mutex<BTreeMap<i64, i64>>,
}

impl SkipCheckpointCache {
    /// Create an empty cache for the given journal.
    pub fn new(journal_id: impl Into<String>) -> Self {
        Self {
            journal_id: journal_id.into(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    // Poisoning only means another reader panicked mid-update; entries are advisory.
    fn entries(&self) -> MutexGuard<'_, BTreeMap<i64, i64>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record that scanning may resume at `revision` for any target at or after `timestamp`.
    ///
    /// Returns false if the entry was dropped because it would break monotonicity
    /// with its neighbours. For an existing timestamp the smaller revision wins.
    pub fn put(&self, timestamp: i64, revision: i64) -> bool {
        let mut entries = self.entries();

        let before = entries
            .range((Bound::Unbounded, Bound::Excluded(timestamp)))
            .next_back()
            .map(|(_, rev)| *rev);
        let after = entries
            .range((Bound::Excluded(timestamp), Bound::Unbounded))
            .next()
            .map(|(_, rev)| *rev);
        if before.is_some_and(|rev| rev > revision) || after.is_some_and(|rev| rev < revision) {
            debug!(
                journal = %self.journal_id,
                timestamp,
                revision,
                "dropping non-monotonic checkpoint"
            );
            return false;
        }

        let slot = entries.entry(timestamp).or_insert(revision);
        *slot = (*slot).min(revision);
        true
    }

    /// The checkpoint with the greatest timestamp less than or equal to `timestamp`.
    pub fn floor(&self, timestamp: i64) -> Option<(i64, i64)> {
        self.entries()
            .range(..=timestamp)
            .next_back()
            .map(|(ts, rev)| (*ts, *rev))
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns true if no checkpoints are stored.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drop all checkpoints.
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Identity of the journal these checkpoints belong to.
    pub fn journal_id(&self) -> &str {
        &self.journal_id
    }
}

struct RegistryEntry {
    journal: Weak<dyn RecordStore>,
    cache: Arc<SkipCheckpointCache>,
}

impl RegistryEntry {
    fn new(journal: &Arc<dyn RecordStore>) -> Self {
        Self {
            journal: Arc::downgrade(journal),
            cache: Arc::new(SkipCheckpointCache::new(journal.journal_id())),
        }
    }

    fn is_owned_by(&self, journal: &Arc<dyn RecordStore>) -> bool {
        match self.journal.upgrade() {
            Some(owner) => {
                Arc::as_ptr(&owner) as *const () == Arc::as_ptr(journal) as *const ()
            }
            None => false,
        }
    }
}

/// Process-wide registry handing out one checkpoint cache per journal.
///
/// Journals are held weakly: once a journal is dropped its cache is reclaimed
/// on the next [`prune`](Self::prune), which [`cache_for`](Self::cache_for) runs
/// before every lookup.
#[derive(Default)]
pub struct CheckpointRegistry {
    caches: DashMap<String, RegistryEntry>,
}

impl CheckpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            caches: DashMap::new(),
        }
    }

    /// The checkpoint cache shared by all readers of `journal`.
    pub fn cache_for(&self, journal: &Arc<dyn RecordStore>) -> Arc<SkipCheckpointCache> {
        self.prune();

        let mut entry = self
            .caches
            .entry(journal.journal_id().to_string())
            .or_insert_with(|| RegistryEntry::new(journal));
        if !entry.is_owned_by(journal) {
            debug!(journal = %journal.journal_id(), "replacing checkpoint cache of a reopened journal");
            *entry = RegistryEntry::new(journal);
        }
        Arc::clone(&entry.cache)
    }

    /// Remove caches whose journal is no longer referenced. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.caches.len();
        self.caches.retain(|_, entry| entry.journal.strong_count() > 0);
        let removed = before.saturating_sub(self.caches.len());
        if removed > 0 {
            debug!(removed, "pruned checkpoint caches of dropped journals");
        }
        removed
    }

    /// Number of journals with a registered cache.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Returns true if no cache is registered.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

impl fmt::Debug for CheckpointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let journals: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("CheckpointRegistry")
            .field("journals", &journals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJournal;

    mod cache {
        use super::*;

        #[test]
        fn test_floor_returns_greatest_not_after() {
            let cache = SkipCheckpointCache::new("j");
            assert!(cache.put(100, 10));
            assert!(cache.put(200, 20));
            assert!(cache.put(300, 30));

            assert_eq!(cache.floor(99), None);
            assert_eq!(cache.floor(100), Some((100, 10)));
            assert_eq!(cache.floor(250), Some((200, 20)));
            assert_eq!(cache.floor(i64::MAX), Some((300, 30)));
        }

        #[test]
        fn test_put_rejects_non_monotonic_entries() {
            let cache = SkipCheckpointCache::new("j");
            assert!(cache.put(100, 10));
            assert!(cache.put(300, 30));

            assert!(!cache.put(200, 5));
            assert!(!cache.put(200, 31));
            assert!(cache.put(200, 20));
            assert_eq!(cache.len(), 3);
        }

        #[test]
        fn test_put_same_timestamp_keeps_smaller_revision() {
            let cache = SkipCheckpointCache::new("j");
            assert!(cache.put(100, 10));
            assert!(cache.put(100, 8));
            assert!(cache.put(100, 12));
            assert_eq!(cache.floor(100), Some((100, 8)));
        }

        #[test]
        fn test_clear() {
            let cache = SkipCheckpointCache::new("j");
            cache.put(1, 1);
            cache.clear();
            assert!(cache.is_empty());
            assert_eq!(cache.floor(1), None);
        }
    }

    mod registry {
        use super::*;

        fn journal(id: &str) -> Arc<dyn RecordStore> {
            Arc::new(MemoryJournal::new(id))
        }

        #[test]
        fn test_same_journal_shares_cache() {
            let registry = CheckpointRegistry::new();
            let j = journal("a");

            let c1 = registry.cache_for(&j);
            c1.put(10, 1);
            let c2 = registry.cache_for(&j);

            assert!(Arc::ptr_eq(&c1, &c2));
            assert_eq!(c2.floor(10), Some((10, 1)));
            assert_eq!(registry.len(), 1);
        }

        #[test]
        fn test_distinct_journals_get_distinct_caches() {
            let registry = CheckpointRegistry::new();
            let a = journal("a");
            let b = journal("b");

            let ca = registry.cache_for(&a);
            let cb = registry.cache_for(&b);
            assert!(!Arc::ptr_eq(&ca, &cb));
            assert_eq!(ca.journal_id(), "a");
            assert_eq!(cb.journal_id(), "b");
            assert_eq!(registry.len(), 2);
        }

        #[test]
        fn test_dropped_journal_is_pruned() {
            let registry = CheckpointRegistry::new();
            let a = journal("a");
            registry.cache_for(&a).put(1, 1);
            assert_eq!(registry.len(), 1);

            drop(a);
            assert_eq!(registry.prune(), 1);
            assert!(registry.is_empty());
        }

        #[test]
        fn test_reopened_journal_gets_fresh_cache() {
            let registry = CheckpointRegistry::new();
            let first = journal("a");
            let _held = registry.cache_for(&first);
            let stale = registry.cache_for(&first);
            stale.put(5, 5);

            let second = journal("a");
            let fresh = registry.cache_for(&second);
            assert!(!Arc::ptr_eq(&stale, &fresh));
            assert!(fresh.is_empty());
        }
    }
}
