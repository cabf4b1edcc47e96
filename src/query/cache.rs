//! Cache storage types shared by the query client and optimistic updates.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::key::QueryKey;

/// Type-erased cached value. Concrete types are recovered by downcasting.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// A cached entry with timestamp and staleness information.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: Instant,
    pub is_stale: bool,
}

impl<T> CacheEntry<T> {
    /// Creates a new cache entry with the given data.
    pub fn new(data: T) -> Self {
        Self {
            data,
            timestamp: Instant::now(),
            is_stale: false,
        }
    }

    /// Checks if this entry is stale based on the given stale time.
    pub fn check_staleness(&mut self, stale_time: Duration) -> bool {
        if self.timestamp.elapsed() >= stale_time {
            self.is_stale = true;
        }
        self.is_stale
    }

    /// Marks this entry as stale.
    pub const fn mark_stale(&mut self) {
        self.is_stale = true;
    }

    /// Checks if this entry should be garbage collected based on cache time.
    pub fn should_gc(&self, cache_time: Duration) -> bool {
        self.timestamp.elapsed() > cache_time
    }

    /// Converts the payload while keeping timestamp and staleness.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            data: f(self.data),
            timestamp: self.timestamp,
            is_stale: self.is_stale,
        }
    }
}

/// One slot of the cache map: the erased entry and the revision it was written at.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) entry: CacheEntry<AnyValue>,
    pub(crate) revision: u64,
}

impl Slot {
    pub(crate) fn new(data: AnyValue, revision: u64) -> Self {
        Self {
            entry: CacheEntry::new(data),
            revision,
        }
    }

    /// Recovers a typed copy of the entry, or `None` on a type mismatch.
    pub(crate) fn downcast<V: Clone + 'static>(&self) -> Option<CacheEntry<V>> {
        let data = self.entry.data.downcast_ref::<V>()?.clone();
        Some(CacheEntry {
            data,
            timestamp: self.entry.timestamp,
            is_stale: self.entry.is_stale,
        })
    }
}

/// Cache entries captured before an optimistic patch, restorable as they were.
///
/// Only the first capture of a key is kept, so a snapshot always describes
/// the state before the earliest patch that touched it.
#[derive(Debug, Default)]
pub struct Snapshot {
    entries: Vec<(QueryKey, Slot)>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The keys captured by this snapshot, in capture order.
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub(crate) fn record(&mut self, key: &QueryKey, slot: &Slot) {
        if !self.entries.iter().any(|(captured, _)| captured == key) {
            self.entries.push((key.clone(), slot.clone()));
        }
    }

    pub(crate) fn merge(&mut self, other: Snapshot) {
        for (key, slot) in other.entries {
            self.record(&key, &slot);
        }
    }

    pub(crate) fn into_entries(self) -> Vec<(QueryKey, Slot)> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_new_entry() {
        let entry = CacheEntry::new(42);
        assert_eq!(entry.data, 42);
        assert!(!entry.is_stale);
    }

    #[test]
    fn test_check_staleness_fresh() {
        let mut entry = CacheEntry::new(42);
        let is_stale = entry.check_staleness(Duration::from_secs(1));
        assert!(!is_stale);
        assert!(!entry.is_stale);
    }

    #[test]
    fn test_check_staleness_stale() {
        let mut entry = CacheEntry::new(42);
        sleep(Duration::from_millis(10));
        let is_stale = entry.check_staleness(Duration::from_millis(5));
        assert!(is_stale);
        assert!(entry.is_stale);
    }

    #[test]
    fn test_zero_stale_time_is_immediately_stale() {
        let mut entry = CacheEntry::new(42);
        assert!(entry.check_staleness(Duration::ZERO));
    }

    #[test]
    fn test_mark_stale() {
        let mut entry = CacheEntry::new(42);
        assert!(!entry.is_stale);
        entry.mark_stale();
        assert!(entry.is_stale);
    }

    #[test]
    fn test_should_gc() {
        let entry = CacheEntry::new(42);
        assert!(!entry.should_gc(Duration::from_secs(60)));
        sleep(Duration::from_millis(10));
        assert!(entry.should_gc(Duration::from_millis(5)));
    }

    #[test]
    fn test_map_keeps_metadata() {
        let mut entry = CacheEntry::new(21);
        entry.mark_stale();
        let timestamp = entry.timestamp;

        let mapped = entry.map(|n| n * 2);
        assert_eq!(mapped.data, 42);
        assert!(mapped.is_stale);
        assert_eq!(mapped.timestamp, timestamp);
    }

    #[test]
    fn test_slot_downcast() {
        let slot = Slot::new(Arc::new(vec![1, 2, 3]), 7);
        let entry = slot.downcast::<Vec<i32>>().expect("type should match");
        assert_eq!(entry.data, vec![1, 2, 3]);
        assert!(slot.downcast::<String>().is_none());
    }

    #[test]
    fn test_snapshot_keeps_first_capture() {
        let key = QueryKey::from(["comments", "P1"]);
        let first = Slot::new(Arc::new(1_i32), 1);
        let second = Slot::new(Arc::new(2_i32), 2);

        let mut snapshot = Snapshot::default();
        snapshot.record(&key, &first);
        snapshot.record(&key, &second);

        assert_eq!(snapshot.len(), 1);
        let entries = snapshot.into_entries();
        assert_eq!(entries[0].1.revision, 1);
    }
}
