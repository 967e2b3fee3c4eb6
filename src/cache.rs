use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Capacity-bounded recency cache of decoded tiles
///
/// Not synchronised; the reader wraps it in a mutex. Values are cheap to
/// clone (the reader stores `Arc<Raster>`), so `get` hands out clones.
#[derive(Debug)]
pub struct TileCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
}

impl<K: Hash + Eq, V: Clone> TileCache<K, V> {
    /// A capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Marks the entry most recently used
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Inserts or overwrites, evicting the least recently used entry when full.
    /// Returns whether the key was already present.
    pub fn set(&mut self, key: K, value: V) -> bool {
        self.entries.put(key, value).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_set() {
        let mut cache = TileCache::new(2);
        assert!(!cache.set(1, "a"));
        assert_eq!(cache.get(&1), Some("a"));
        assert!(cache.set(1, "b"));
        assert_eq!(cache.get(&1), Some("b"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = TileCache::new(2);
        cache.set(1, 10);
        cache.set(2, 20);
        // touching 1 leaves 2 as the eviction candidate
        assert_eq!(cache.get(&1), Some(10));
        assert!(!cache.set(3, 30));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&2));
        assert!(cache.contains(&1));
        assert!(cache.contains(&3));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut cache = TileCache::new(3);
        for i in 0..100 {
            cache.set(i % 7, i);
            assert!(cache.len() <= cache.capacity());
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = TileCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set("x", 1);
        cache.set("y", 2);
        assert_eq!(cache.get(&"x"), None);
        assert_eq!(cache.get(&"y"), Some(2));
        cache.clear();
        assert!(cache.is_empty());
    }
}
