//! In-memory cache for storing key-value pairs.
//!
//! Uses moka's high-performance concurrent cache implementation.

use moka::sync::Cache;

/// Thread-safe in-memory registry that never evicts.
///
/// Used for storing:
/// - Deployed nodes (`MemCache<NodeId, Arc<NodeHandle>>`)
/// - Manual connection nodes (`MemCache<String, ConnectionNode>`)
#[derive(Clone)]
pub struct MemCache<K, V> {
    entries: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`].
    ///
    /// No capacity bound and no expiry, so entries stay until removed.
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().build(),
        }
    }

    /// Insert or replace an entry.
    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key, value);
    }

    /// Get an entry through key `&K`.
    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.get(key)
    }

    /// Remove an entry through key `&K`, returning it if present.
    pub fn remove(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.remove(key)
    }

    /// Return an iterator over the entries of the cache.
    pub fn iter(&self) -> moka::sync::Iter<'_, K, V> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::MemCache;

    #[test]
    fn test_set_get_remove() {
        let cache: MemCache<String, u32> = MemCache::new();
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.remove(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn test_entries_are_never_evicted() {
        let cache: MemCache<u32, u32> = MemCache::new();
        for i in 0..5000 {
            cache.set(i, i);
        }
        cache.entries.run_pending_tasks();

        assert_eq!(cache.entries.entry_count(), 5000);
        assert!((0..5000).all(|i| cache.get(&i) == Some(i)));
        assert_eq!(cache.iter().count(), 5000);
    }
}
