//! Error types for cache contract violations.

use thiserror::Error;

/// Errors raised by the bounded client caches.
///
/// The cache is deliberately strict: it is a cache, not a map. Inserting an
/// existing key or popping an absent one is a caller bug (or a lost insert
/// race the caller is expected to recover from), so both surface as errors
/// rather than being absorbed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Insert attempted for a key that is already cached. The original
    /// value is retained; callers must `pop` explicitly before replacing.
    #[error("client already cached for {key}")]
    AlreadyExists {
        /// Human-readable label of the offending key
        key: String,
    },

    /// Lookup or removal of a key with no cached entry.
    #[error("no cached client for {key}")]
    NotFound {
        /// Human-readable label of the missing key
        key: String,
    },

    /// Cache constructed with a capacity of zero.
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
}

/// Result type alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
