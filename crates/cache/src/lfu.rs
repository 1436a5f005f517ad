//! Least-frequently-used bounded cache.
//!
//! Bookkeeping follows the classic frequency-bucket design: buckets form a
//! doubly linked list in ascending frequency order and each bucket holds
//! the set of keys currently at that frequency. A hit promotes the key to
//! the `frequency + 1` bucket (created on demand); inserts land in the
//! frequency-1 bucket; eviction removes an arbitrary member of the lowest
//! non-empty bucket. Membership within a bucket is an unordered set, so
//! ties at the same frequency break arbitrarily, not by recency.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::error::{CacheError, CacheResult};

struct Bucket<K> {
    freq: u64,
    items: HashSet<K>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Entry<V> {
    value: V,
    bucket: usize,
}

struct LfuInner<K, V> {
    entries: HashMap<K, Entry<V>>,
    buckets: Vec<Option<Bucket<K>>>,
    free: Vec<usize>,
    head: Option<usize>,
    max_size: usize,
}

impl<K, V> LfuInner<K, V>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: Clone,
{
    fn bucket(&self, idx: usize) -> &Bucket<K> {
        self.buckets[idx].as_ref().unwrap_or_else(|| unreachable!())
    }

    fn bucket_mut(&mut self, idx: usize) -> &mut Bucket<K> {
        self.buckets[idx].as_mut().unwrap_or_else(|| unreachable!())
    }

    fn alloc_bucket(&mut self, bucket: Bucket<K>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.buckets[idx] = Some(bucket);
            idx
        } else {
            self.buckets.push(Some(bucket));
            self.buckets.len() - 1
        }
    }

    /// Link a fresh bucket directly after `prev` (or at the head).
    fn link_after(&mut self, prev: Option<usize>, freq: u64) -> usize {
        let next = match prev {
            Some(p) => self.bucket(p).next,
            None => self.head,
        };
        let idx = self.alloc_bucket(Bucket {
            freq,
            items: HashSet::new(),
            prev,
            next,
        });
        match prev {
            Some(p) => self.bucket_mut(p).next = Some(idx),
            None => self.head = Some(idx),
        }
        if let Some(n) = next {
            self.bucket_mut(n).prev = Some(idx);
        }
        idx
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let bucket = self.bucket(idx);
            (bucket.prev, bucket.next)
        };
        match prev {
            Some(p) => self.bucket_mut(p).next = next,
            None => self.head = next,
        }
        if let Some(n) = next {
            self.bucket_mut(n).prev = prev;
        }
        self.buckets[idx] = None;
        self.free.push(idx);
    }

    /// Move `key` from its current bucket to the bucket for one higher
    /// frequency, creating and pruning buckets as needed.
    fn promote(&mut self, key: &K, from: usize) -> usize {
        let freq = self.bucket(from).freq;
        let next = self.bucket(from).next;

        let target = match next {
            Some(n) if self.bucket(n).freq == freq + 1 => n,
            _ => self.link_after(Some(from), freq + 1),
        };

        self.bucket_mut(from).items.remove(key);
        self.bucket_mut(target).items.insert(key.clone());
        if self.bucket(from).items.is_empty() {
            self.unlink(from);
        }
        target
    }

    /// Remove an arbitrary member of the lowest non-empty frequency bucket.
    fn evict_lfu(&mut self) {
        let Some(head) = self.head else { return };
        let victim = match self.bucket(head).items.iter().next() {
            Some(key) => key.clone(),
            None => return,
        };
        self.bucket_mut(head).items.remove(&victim);
        if self.bucket(head).items.is_empty() {
            self.unlink(head);
        }
        self.entries.remove(&victim);
        tracing::debug!(key = %victim, policy = "lfu", "evicted cache entry");
    }
}

/// Thread-safe bounded cache with least-frequently-used eviction.
///
/// All operations are O(1) amortized and run under a single per-instance
/// lock.
pub struct LfuCache<K, V> {
    inner: Mutex<LfuInner<K, V>>,
}

impl<K, V> LfuCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: Clone,
{
    /// Create a cache holding at most `max_size` entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ZeroCapacity`] if `max_size` is zero.
    pub fn new(max_size: usize) -> CacheResult<Self> {
        if max_size == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        Ok(Self {
            inner: Mutex::new(LfuInner {
                entries: HashMap::with_capacity(max_size),
                buckets: Vec::new(),
                free: Vec::new(),
                head: None,
                max_size,
            }),
        })
    }

    /// Look up a key, bumping its access frequency on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let bucket = inner.entries.get(key)?.bucket;
        let target = inner.promote(key, bucket);
        let entry = inner.entries.get_mut(key)?;
        entry.bucket = target;
        Some(entry.value.clone())
    }

    /// Insert a new entry at frequency 1, evicting one entry from the
    /// lowest non-empty frequency bucket first if at capacity.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::AlreadyExists`] if the key is present; the
    /// original value is retained.
    pub fn insert(&self, key: K, value: V) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            return Err(CacheError::AlreadyExists {
                key: key.to_string(),
            });
        }
        if inner.entries.len() >= inner.max_size {
            inner.evict_lfu();
        }

        let bucket = match inner.head {
            Some(h) if inner.bucket(h).freq == 1 => h,
            _ => inner.link_after(None, 1),
        };
        inner.bucket_mut(bucket).items.insert(key.clone());
        inner.entries.insert(key, Entry { value, bucket });
        Ok(())
    }

    /// Remove and return an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] if the key is absent.
    pub fn pop(&self, key: &K) -> CacheResult<V> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .remove(key)
            .ok_or_else(|| CacheError::NotFound {
                key: key.to_string(),
            })?;
        inner.bucket_mut(entry.bucket).items.remove(key);
        if inner.bucket(entry.bucket).items.is_empty() {
            inner.unlink(entry.bucket);
        }
        Ok(entry.value)
    }

    /// Whether the key currently has a cached entry. Does not touch
    /// frequency bookkeeping.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Drop every entry and all frequency tracking.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.buckets.clear();
        inner.free.clear();
        inner.head = None;
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Configured capacity.
    pub fn max_size(&self) -> usize {
        self.inner.lock().max_size
    }

    /// Point-in-time copy of the keys, ascending frequency; order within
    /// one frequency is arbitrary.
    pub fn keys(&self) -> Vec<K> {
        let inner = self.inner.lock();
        let mut keys = Vec::with_capacity(inner.entries.len());
        let mut cursor = inner.head;
        while let Some(idx) = cursor {
            let bucket = inner.bucket(idx);
            keys.extend(bucket.items.iter().cloned());
            cursor = bucket.next;
        }
        keys
    }

    /// Point-in-time copy of the values, ascending frequency.
    pub fn values(&self) -> Vec<V> {
        self.items().into_iter().map(|(_, v)| v).collect()
    }

    /// Point-in-time copy of `(key, value)` pairs, ascending frequency.
    /// Safe to iterate without holding any lock.
    pub fn items(&self) -> Vec<(K, V)> {
        let inner = self.inner.lock();
        let mut items = Vec::with_capacity(inner.entries.len());
        let mut cursor = inner.head;
        while let Some(idx) = cursor {
            let bucket = inner.bucket(idx);
            for key in &bucket.items {
                if let Some(entry) = inner.entries.get(key) {
                    items.push((key.clone(), entry.value.clone()));
                }
            }
            cursor = bucket.next;
        }
        items
    }
}

impl<K, V> fmt::Debug for LfuCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LfuCache")
            .field("len", &inner.entries.len())
            .field("max_size", &inner.max_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cache(max: usize) -> LfuCache<String, u32> {
        LfuCache::new(max).expect("nonzero capacity")
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            LfuCache::<String, u32>::new(0).err(),
            Some(CacheError::ZeroCapacity)
        );
    }

    #[test]
    fn test_eviction_prefers_lowest_frequency() {
        let cache = cache(2);
        cache.insert("s3".to_string(), 1).unwrap();
        cache.insert("sts".to_string(), 2).unwrap();

        for _ in 0..5 {
            assert_eq!(cache.get(&"s3".to_string()), Some(1));
        }
        cache.insert("ec2".to_string(), 3).unwrap();

        assert!(!cache.contains(&"sts".to_string()));
        assert!(cache.contains(&"s3".to_string()));
        assert!(cache.contains(&"ec2".to_string()));
    }

    #[test]
    fn test_tied_frequencies_evict_some_member() {
        // Both entries sit at frequency 1; eviction promises only that
        // one of them goes, not which.
        let cache = cache(2);
        cache.insert("a".to_string(), 1).unwrap();
        cache.insert("b".to_string(), 2).unwrap();
        cache.insert("c".to_string(), 3).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&"c".to_string()));
        let survivors = [
            cache.contains(&"a".to_string()),
            cache.contains(&"b".to_string()),
        ];
        assert_eq!(survivors.iter().filter(|s| **s).count(), 1);
    }

    #[test]
    fn test_no_silent_overwrite() {
        let cache = cache(2);
        cache.insert("s3".to_string(), 1).unwrap();
        let err = cache.insert("s3".to_string(), 9).unwrap_err();
        assert!(matches!(err, CacheError::AlreadyExists { .. }));
        assert_eq!(cache.get(&"s3".to_string()), Some(1));
    }

    #[test]
    fn test_promotion_creates_and_prunes_buckets() {
        let cache = cache(3);
        cache.insert("a".to_string(), 1).unwrap();
        cache.insert("b".to_string(), 2).unwrap();

        // a -> freq 2, then freq 3; b stays at freq 1
        cache.get(&"a".to_string());
        cache.get(&"a".to_string());

        // keys are reported in ascending frequency order
        assert_eq!(cache.keys(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_pop_and_not_found() {
        let cache = cache(2);
        cache.insert("s3".to_string(), 7).unwrap();
        assert_eq!(cache.pop(&"s3".to_string()).unwrap(), 7);
        assert!(matches!(
            cache.pop(&"s3".to_string()),
            Err(CacheError::NotFound { .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_resets_buckets() {
        let cache = cache(2);
        cache.insert("a".to_string(), 1).unwrap();
        cache.get(&"a".to_string());
        cache.clear();

        assert!(cache.is_empty());
        cache.insert("b".to_string(), 2).unwrap();
        assert_eq!(cache.get(&"b".to_string()), Some(2));
    }

    #[test]
    fn test_fresh_insert_can_lose_to_frequent_entry() {
        let cache = cache(2);
        cache.insert("hot".to_string(), 1).unwrap();
        cache.get(&"hot".to_string());
        cache.insert("warm".to_string(), 2).unwrap();

        // "warm" is the only frequency-1 entry, so it is the victim even
        // though it was inserted most recently.
        cache.insert("new".to_string(), 3).unwrap();
        assert!(cache.contains(&"hot".to_string()));
        assert!(cache.contains(&"new".to_string()));
        assert!(!cache.contains(&"warm".to_string()));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let cache = cache(2);
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.insert((*name).to_string(), i as u32).unwrap();
            assert!(cache.len() <= 2);
        }
    }
}
