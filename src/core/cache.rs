//! Segment cache shared by encode calls on one [`Bpe`](super::Bpe).
//!
//! Keys are the exact segment text, values the resolved subword units
//! (before separators are attached). The cache is unbounded unless a
//! capacity is configured, in which case least-recently-used segments are
//! evicted and simply recomputed on their next occurrence.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

pub struct SegmentCache {
    entries: Mutex<LruCache<String, Vec<String>>>,
    capacity: Option<NonZeroUsize>,
}

impl SegmentCache {
    /// Cache that never evicts.
    pub fn unbounded() -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            capacity: None,
        }
    }

    /// Cache holding at most `capacity` segments; `0` means unbounded.
    pub fn with_capacity(capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(cap) => Self {
                entries: Mutex::new(LruCache::new(cap)),
                capacity: Some(cap),
            },
            None => Self::unbounded(),
        }
    }

    /// Empty cache with the same capacity.
    pub fn fresh(&self) -> Self {
        match self.capacity {
            Some(cap) => Self::with_capacity(cap.get()),
            None => Self::unbounded(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    pub fn get(&self, segment: &str) -> Option<Vec<String>> {
        let mut entries = self.entries.lock().ok()?;
        entries.get(segment).cloned()
    }

    pub fn put(&self, segment: &str, units: Vec<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(segment.to_string(), units);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for SegmentCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_keeps_everything() {
        let cache = SegmentCache::unbounded();
        for i in 0..10_000 {
            cache.put(&i.to_string(), vec![i.to_string()]);
        }
        assert_eq!(cache.len(), 10_000);
        assert_eq!(cache.get("42"), Some(vec!["42".to_string()]));
        assert_eq!(cache.capacity(), None);
    }

    #[test]
    fn test_bounded_evicts_least_recent() {
        let cache = SegmentCache::with_capacity(2);
        cache.put("a", vec!["a".into()]);
        cache.put("b", vec!["b".into()]);
        assert!(cache.get("a").is_some());
        cache.put("c", vec!["c".into()]);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_fresh_is_empty_with_same_capacity() {
        let cache = SegmentCache::with_capacity(8);
        cache.put("x", vec![]);
        let fresh = cache.fresh();
        assert!(fresh.is_empty());
        assert_eq!(fresh.capacity(), Some(8));
        assert_eq!(SegmentCache::with_capacity(0).capacity(), None);
    }

    #[test]
    fn test_clear() {
        let cache = SegmentCache::default();
        cache.put("x", vec!["x".into()]);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
