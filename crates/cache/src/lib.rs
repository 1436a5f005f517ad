//! Bounded, thread-safe caching for constructed service clients.
//!
//! Clients are expensive to build and cheap to share, so sessions memoize
//! them behind a normalized cache key. This crate provides the pieces:
//!
//! - [`ClientCacheKey`] / [`CacheValue`] — canonical, hashable identity for
//!   heterogeneous construction parameters, independent of keyword ordering
//!   and trailing nulls.
//! - [`LruCache`] / [`LfuCache`] — generic bounded caches with O(1)
//!   amortized operations and strict contract errors (no silent overwrite,
//!   no silent miss on `pop`).
//! - [`ClientCache`] — the policy-dispatching facade configured by
//!   [`CacheConfig`].
//!
//! Every cache operation runs under a single per-instance lock. The lock
//! only ever guards in-memory bookkeeping; network calls never happen while
//! it is held.

pub mod client;
pub mod error;
pub mod key;
pub mod lfu;
pub mod lru;

pub use client::{CacheConfig, ClientCache, EvictionPolicy};
pub use error::{CacheError, CacheResult};
pub use key::{CacheValue, ClientCacheKey, Normalize};
pub use lfu::LfuCache;
pub use lru::LruCache;
