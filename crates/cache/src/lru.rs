//! Least-recently-used bounded cache.
//!
//! Entries live in a hash map for O(1) addressing plus a doubly linked
//! recency list threaded through slab slots (index links, no `unsafe`).
//! The list head is the least-recently-used entry and the tail the most
//! recently used; `get` and `insert` both move the touched entry to the
//! tail, and eviction removes the head.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::error::{CacheError, CacheResult};

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

struct LruInner<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    max_size: usize,
}

impl<K, V> LruInner<K, V>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: Clone,
{
    fn node(&self, idx: usize) -> &Node<K, V> {
        // Indices handed around internally always point at occupied slots.
        self.slots[idx].as_ref().unwrap_or_else(|| unreachable!())
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        self.slots[idx].as_mut().unwrap_or_else(|| unreachable!())
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let node = self.node_mut(idx);
        node.prev = None;
        node.next = None;
    }

    fn push_tail(&mut self, idx: usize) {
        let old_tail = self.tail;
        {
            let node = self.node_mut(idx);
            node.prev = old_tail;
            node.next = None;
        }
        if let Some(t) = old_tail {
            self.node_mut(t).next = Some(idx);
        }
        self.tail = Some(idx);
        if self.head.is_none() {
            self.head = Some(idx);
        }
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(node);
            idx
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn release(&mut self, idx: usize) -> Node<K, V> {
        let node = self.slots[idx].take().unwrap_or_else(|| unreachable!());
        self.free.push(idx);
        node
    }

    fn evict_lru(&mut self) {
        if let Some(head) = self.head {
            self.detach(head);
            let node = self.release(head);
            self.map.remove(&node.key);
            tracing::debug!(key = %node.key, policy = "lru", "evicted cache entry");
        }
    }
}

/// Thread-safe bounded cache with least-recently-used eviction.
///
/// All operations are O(1) and run under a single per-instance lock.
pub struct LruCache<K, V> {
    inner: Mutex<LruInner<K, V>>,
}

impl<K, V> LruCache<K, V>
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
            inner: Mutex::new(LruInner {
                map: HashMap::with_capacity(max_size),
                slots: Vec::with_capacity(max_size),
                free: Vec::new(),
                head: None,
                tail: None,
                max_size,
            }),
        })
    }

    /// Look up a key, promoting it to most-recently-used on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let idx = *inner.map.get(key)?;
        inner.detach(idx);
        inner.push_tail(idx);
        Some(inner.node(idx).value.clone())
    }

    /// Insert a new entry, evicting the least-recently-used entry first if
    /// the cache is at capacity.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::AlreadyExists`] if the key is present; the
    /// original value is retained.
    pub fn insert(&self, key: K, value: V) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        if inner.map.contains_key(&key) {
            return Err(CacheError::AlreadyExists {
                key: key.to_string(),
            });
        }
        if inner.map.len() >= inner.max_size {
            inner.evict_lru();
        }
        let idx = inner.alloc(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        inner.push_tail(idx);
        inner.map.insert(key, idx);
        Ok(())
    }

    /// Remove and return an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] if the key is absent.
    pub fn pop(&self, key: &K) -> CacheResult<V> {
        let mut inner = self.inner.lock();
        let idx = inner.map.remove(key).ok_or_else(|| CacheError::NotFound {
            key: key.to_string(),
        })?;
        inner.detach(idx);
        Ok(inner.release(idx).value)
    }

    /// Whether the key currently has a cached entry. Does not touch
    /// recency bookkeeping.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().map.contains_key(key)
    }

    /// Drop every entry and all recency tracking.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.slots.clear();
        inner.free.clear();
        inner.head = None;
        inner.tail = None;
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }

    /// Configured capacity.
    pub fn max_size(&self) -> usize {
        self.inner.lock().max_size
    }

    /// Point-in-time copy of the keys, least recently used first.
    pub fn keys(&self) -> Vec<K> {
        let inner = self.inner.lock();
        let mut keys = Vec::with_capacity(inner.map.len());
        let mut cursor = inner.head;
        while let Some(idx) = cursor {
            let node = inner.node(idx);
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    /// Point-in-time copy of the values, least recently used first.
    pub fn values(&self) -> Vec<V> {
        let inner = self.inner.lock();
        let mut values = Vec::with_capacity(inner.map.len());
        let mut cursor = inner.head;
        while let Some(idx) = cursor {
            let node = inner.node(idx);
            values.push(node.value.clone());
            cursor = node.next;
        }
        values
    }

    /// Point-in-time copy of `(key, value)` pairs, least recently used
    /// first. Safe to iterate without holding any lock.
    pub fn items(&self) -> Vec<(K, V)> {
        let inner = self.inner.lock();
        let mut items = Vec::with_capacity(inner.map.len());
        let mut cursor = inner.head;
        while let Some(idx) = cursor {
            let node = inner.node(idx);
            items.push((node.key.clone(), node.value.clone()));
            cursor = node.next;
        }
        items
    }
}

impl<K, V> fmt::Debug for LruCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LruCache")
            .field("len", &inner.map.len())
            .field("max_size", &inner.max_size)
            .finish()
    }
}
