//! Recently used programs.
//!
//! Programs called again within a block get a discount, so the overlay tracks
//! which module hashes were used recently. The cache is a pure cost heuristic:
//! it is not journaled, survives reverts, and is thrown away at the end of
//! each block.

use alloy_primitives::B256;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Bounded LRU set of module hashes, allocated on first insert.
#[derive(Debug, Default)]
pub struct RecentWasms {
    cache: Option<LruCache<B256, ()>>,
}

impl RecentWasms {
    /// Creates an unallocated cache.
    pub fn new() -> Self {
        Self { cache: None }
    }

    /// Inserts `item`, returning true if it was already present.
    ///
    /// `retain` sizes the cache on first use and is ignored afterwards. A hit
    /// refreshes the entry; a miss may evict the least recently used one.
    pub fn insert(&mut self, item: B256, retain: u16) -> bool {
        let cache = self.cache.get_or_insert_with(|| {
            LruCache::new(NonZeroUsize::new(retain.into()).unwrap_or(NonZeroUsize::MIN))
        });
        if cache.get(&item).is_some() {
            return true;
        }
        cache.put(item, ());
        false
    }

    pub fn contains(&self, item: &B256) -> bool {
        self.cache.as_ref().is_some_and(|cache| cache.contains(item))
    }

    /// Capacity, if the cache has been allocated.
    pub fn capacity(&self) -> Option<usize> {
        self.cache.as_ref().map(|cache| cache.cap().get())
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies all entries into a new, independent cache of the same capacity.
    pub fn copy(&self) -> Self {
        let Some(cache) = &self.cache else {
            return Self::new();
        };
        let mut copied = LruCache::new(cache.cap());
        // oldest first, so recency order carries over
        for (item, _) in cache.iter().rev() {
            copied.put(*item, ());
        }
        Self {
            cache: Some(copied),
        }
    }
}

impl Clone for RecentWasms {
    fn clone(&self) -> Self {
        self.copy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> B256 {
        B256::repeat_byte(byte)
    }

    #[test]
    fn test_insert_reports_hits() {
        let mut recent = RecentWasms::new();
        assert_eq!(recent.capacity(), None);

        assert!(!recent.insert(hash(1), 4));
        assert!(recent.insert(hash(1), 4));
        assert!(recent.insert(hash(1), 4));
        assert_eq!(recent.capacity(), Some(4));
    }

    #[test]
    fn test_eviction_of_least_recent() {
        let mut recent = RecentWasms::new();
        for byte in 1..=3 {
            assert!(!recent.insert(hash(byte), 3));
        }
        // touching 1 makes 2 the eviction candidate
        assert!(recent.insert(hash(1), 3));
        assert!(!recent.insert(hash(4), 3));

        assert_eq!(recent.len(), 3);
        assert!(!recent.contains(&hash(2)));
        assert!(!recent.insert(hash(2), 3));
        assert!(!recent.contains(&hash(3)));
    }

    #[test]
    fn test_capacity_fixed_after_allocation() {
        let mut recent = RecentWasms::new();
        recent.insert(hash(1), 2);
        for byte in 2..=10 {
            recent.insert(hash(byte), 100);
        }
        assert_eq!(recent.capacity(), Some(2));
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_zero_retain_keeps_one() {
        let mut recent = RecentWasms::new();
        assert!(!recent.insert(hash(1), 0));
        assert!(recent.insert(hash(1), 0));
        assert!(!recent.insert(hash(2), 0));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn test_copy_is_independent() {
        let mut source = RecentWasms::new();
        source.insert(hash(1), 3);
        source.insert(hash(2), 3);

        let mut copy = source.copy();
        assert_eq!(copy.capacity(), Some(3));
        assert!(copy.insert(hash(1), 3));

        assert!(!copy.insert(hash(3), 3));
        assert!(!source.contains(&hash(3)));

        assert!(!source.insert(hash(4), 3));
        assert!(!copy.contains(&hash(4)));
    }

    #[test]
    fn test_copy_preserves_recency_order() {
        let mut source = RecentWasms::new();
        for byte in 1..=3 {
            source.insert(hash(byte), 3);
        }
        source.insert(hash(1), 3);

        let mut copy = source.copy();
        copy.insert(hash(4), 3);
        assert!(!copy.contains(&hash(2)));
        assert!(copy.contains(&hash(1)));
    }

    #[test]
    fn test_copy_of_unallocated() {
        let source = RecentWasms::new();
        let mut copy = source.clone();
        assert_eq!(copy.capacity(), None);
        copy.insert(hash(1), 5);
        assert_eq!(source.capacity(), None);
    }
}
