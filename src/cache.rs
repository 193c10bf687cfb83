//! Bounded LRU cache with optional per-entry TTL
//!
//! Two instances exist in the engine: one for loaded grammars (no TTL) and
//! one for recent query embeddings (TTL of a few minutes). Purely a
//! performance aid; correctness never depends on a cache hit.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

/// LRU cache with insertion-order eviction and optional TTL.
///
/// `get` refreshes recency; expired entries behave as absent.
pub struct TtlLru<K: Hash + Eq, V> {
    inner: LruCache<K, (V, Instant)>,
    ttl: Option<Duration>,
}

impl<K: Hash + Eq, V> TtlLru<K, V> {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: LruCache::new(capacity),
            ttl,
        }
    }

    /// Look up a key, refreshing its recency. Expired entries are dropped.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if let Some(ttl) = self.ttl {
            let expired = self
                .inner
                .peek(key)
                .is_some_and(|(_, at)| at.elapsed() > ttl);
            if expired {
                self.inner.pop(key);
                return None;
            }
        }
        self.inner.get(key).map(|(value, _)| value)
    }

    /// Insert or replace, evicting the least-recent entry at capacity.
    pub fn insert(&mut self, key: K, value: V) {
        self.inner.put(key, (value, Instant::now()));
    }

    /// Fetch the value for `key`, computing and caching it on a miss.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &V
    where
        K: Clone,
    {
        if self.get(&key).is_none() {
            self.insert(key.clone(), make());
        }
        &self.inner.get(&key).expect("just inserted").0
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key).map(|(value, _)| value)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_evicts_first_inserted() {
        let mut cache = TtlLru::new(3, None);
        for i in 0..4 {
            cache.insert(i, i * 10);
        }
        // 4 distinct inserts into capacity 3: key 0 evicted
        assert!(cache.get(&0).is_none());
        assert_eq!(cache.get(&1), Some(&10));
        assert_eq!(cache.get(&3), Some(&30));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn get_protects_from_eviction() {
        let mut cache = TtlLru::new(3, None);
        cache.insert(0, "a");
        cache.insert(1, "b");
        cache.insert(2, "c");
        // Touch key 0 so it is most-recent before the overflowing insert
        assert_eq!(cache.get(&0), Some(&"a"));
        cache.insert(3, "d");
        assert_eq!(cache.get(&0), Some(&"a"));
        // Key 1 was least-recent and got evicted instead
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn replace_in_place_keeps_len() {
        let mut cache = TtlLru::new(2, None);
        cache.insert("k", 1);
        cache.insert("k", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"k"), Some(&2));
    }

    #[test]
    fn expired_entries_are_absent() {
        let mut cache = TtlLru::new(4, Some(Duration::from_millis(0)));
        cache.insert("k", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&"k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn no_ttl_entries_persist() {
        let mut cache = TtlLru::new(4, None);
        cache.insert("k", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"k"), Some(&1));
    }

    #[test]
    fn remove_and_clear() {
        let mut cache = TtlLru::new(4, None);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.remove(&1), Some("a"));
        assert!(cache.get(&1).is_none());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn get_or_insert_computes_once() {
        let mut cache = TtlLru::new(4, None);
        let mut calls = 0;
        cache.get_or_insert_with(1, || {
            calls += 1;
            "v"
        });
        cache.get_or_insert_with(1, || {
            calls += 1;
            "other"
        });
        assert_eq!(calls, 1);
        assert_eq!(cache.get(&1), Some(&"v"));
    }
}
