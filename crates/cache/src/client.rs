//! Policy selection and the caller-facing cache facade.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CacheResult;
use crate::key::ClientCacheKey;
use crate::lfu::LfuCache;
use crate::lru::LruCache;

/// Eviction strategy for the client cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the least-recently-used entry
    #[default]
    Lru,
    /// Evict a member of the lowest frequency bucket
    Lfu,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lru => f.write_str("lru"),
            Self::Lfu => f.write_str("lfu"),
        }
    }
}

/// Client-cache configuration.
///
/// Clients carry a noticeable memory footprint, so caching defaults to on
/// with a small capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether constructed clients are cached at all. A disabled cache
    /// means every client request constructs a fresh handle.
    pub enabled: bool,

    /// Maximum number of cached clients.
    pub max_size: usize,

    /// Which entry is discarded when the cache is full.
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 10,
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

/// Bounded client cache with the configured eviction policy.
///
/// A thin dispatching wrapper over [`LruCache`] / [`LfuCache`] keyed by
/// [`ClientCacheKey`]. Both backends share the same contract: strict
/// insert (no silent overwrite), strict pop, snapshot iteration.
pub enum ClientCache<V> {
    /// Recency-ordered backend
    Lru(LruCache<ClientCacheKey, V>),
    /// Frequency-ordered backend
    Lfu(LfuCache<ClientCacheKey, V>),
}

impl<V: Clone> ClientCache<V> {
    /// Build a cache from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CacheError::ZeroCapacity`] if `max_size` is zero.
    pub fn new(config: &CacheConfig) -> CacheResult<Self> {
        let cache = match config.eviction_policy {
            EvictionPolicy::Lru => Self::Lru(LruCache::new(config.max_size)?),
            EvictionPolicy::Lfu => Self::Lfu(LfuCache::new(config.max_size)?),
        };
        tracing::debug!(
            policy = %config.eviction_policy,
            max_size = config.max_size,
            "initialized client cache"
        );
        Ok(cache)
    }

    /// Look up a cached client, updating eviction bookkeeping on a hit.
    pub fn get(&self, key: &ClientCacheKey) -> Option<V> {
        match self {
            Self::Lru(cache) => cache.get(key),
            Self::Lfu(cache) => cache.get(key),
        }
    }

    /// Insert a newly constructed client.
    pub fn insert(&self, key: ClientCacheKey, value: V) -> CacheResult<()> {
        match self {
            Self::Lru(cache) => cache.insert(key, value),
            Self::Lfu(cache) => cache.insert(key, value),
        }
    }

    /// Remove and return a cached client.
    pub fn pop(&self, key: &ClientCacheKey) -> CacheResult<V> {
        match self {
            Self::Lru(cache) => cache.pop(key),
            Self::Lfu(cache) => cache.pop(key),
        }
    }

    /// Whether a client is cached under this key.
    pub fn contains(&self, key: &ClientCacheKey) -> bool {
        match self {
            Self::Lru(cache) => cache.contains(key),
            Self::Lfu(cache) => cache.contains(key),
        }
    }

    /// Drop all cached clients.
    pub fn clear(&self) {
        match self {
            Self::Lru(cache) => cache.clear(),
            Self::Lfu(cache) => cache.clear(),
        }
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        match self {
            Self::Lru(cache) => cache.len(),
            Self::Lfu(cache) => cache.len(),
        }
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn max_size(&self) -> usize {
        match self {
            Self::Lru(cache) => cache.max_size(),
            Self::Lfu(cache) => cache.max_size(),
        }
    }

    /// The active eviction policy.
    pub fn policy(&self) -> EvictionPolicy {
        match self {
            Self::Lru(_) => EvictionPolicy::Lru,
            Self::Lfu(_) => EvictionPolicy::Lfu,
        }
    }

    /// Point-in-time copy of the cached keys.
    pub fn keys(&self) -> Vec<ClientCacheKey> {
        match self {
            Self::Lru(cache) => cache.keys(),
            Self::Lfu(cache) => cache.keys(),
        }
    }

    /// Point-in-time copy of the cached clients.
    pub fn values(&self) -> Vec<V> {
        match self {
            Self::Lru(cache) => cache.values(),
            Self::Lfu(cache) => cache.values(),
        }
    }

    /// Point-in-time copy of `(key, client)` pairs.
    pub fn items(&self) -> Vec<(ClientCacheKey, V)> {
        match self {
            Self::Lru(cache) => cache.items(),
            Self::Lfu(cache) => cache.items(),
        }
    }
}

impl<V: Clone> fmt::Debug for ClientCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("policy", &self.policy())
            .field("len", &self.len())
            .field("max_size", &self.max_size())
            .finish()
    }
}

impl<V: Clone> fmt::Display for ClientCache<V> {
    /// Renders the cache contents one labeled entry per line, for
    /// diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ClientCache[{}]:", self.policy())?;
        for key in self.keys() {
            writeln!(f, "  {}", key.label())?;
        }
        Ok(())
    }
}
