//! LRU deduplication cache over gossip message ids.
//!
//! Breaks forwarding cycles: a message seen once is merged and re-forwarded,
//! every later copy is dropped on the floor. Promotion on re-access keeps the
//! hot working set resident, so eviction removes the least-recently-*seen*
//! id first.

use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use uuid::Uuid;

/// Fallback capacity when the configured one is not positive.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

pub struct DedupCache {
    inner: RwLock<LruCache<Uuid, ()>>,
}

impl DedupCache {
    /// A capacity of zero or below selects [`DEFAULT_DEDUP_CAPACITY`].
    pub fn new(capacity: isize) -> Self {
        let capacity = if capacity <= 0 {
            DEFAULT_DEDUP_CAPACITY
        } else {
            capacity as usize
        };
        let capacity = NonZeroUsize::new(capacity).expect("capacity is positive");
        Self {
            inner: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Record `id` as seen. Returns `true` if it was new; a known id is
    /// promoted to most-recently-used and `false` comes back.
    pub fn insert(&self, id: Uuid) -> bool {
        self.inner.write().put(id, ()).is_none()
    }

    /// Non-promoting membership probe (header short-circuit path).
    pub fn contains(&self, id: &Uuid) -> bool {
        self.inner.read().peek(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_then_duplicate() {
        let cache = DedupCache::new(8);
        let id = Uuid::new_v4();

        assert!(cache.insert(id));
        assert!(!cache.insert(id));
        assert!(cache.contains(&id));
    }

    #[test]
    fn test_capacity_is_honored() {
        let cache = DedupCache::new(3);
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            cache.insert(*id);
        }

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&ids[0]));
        assert!(!cache.contains(&ids[1]));
        assert!(cache.contains(&ids[4]));
    }

    #[test]
    fn test_reinsert_promotes() {
        let cache = DedupCache::new(2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        cache.insert(a);
        cache.insert(b);
        // Touch a again: b becomes the eviction candidate.
        cache.insert(a);
        cache.insert(c);

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[test]
    fn test_non_positive_capacity_uses_default() {
        assert_eq!(DedupCache::new(0).capacity(), DEFAULT_DEDUP_CAPACITY);
        assert_eq!(DedupCache::new(-5).capacity(), DEFAULT_DEDUP_CAPACITY);
        assert_eq!(DedupCache::new(42).capacity(), 42);
    }
}
