//! Auto-refreshing credential sessions
//!
//! Sessions hold short-lived credentials obtained from a pluggable
//! source and refresh them transparently, so long-running programs
//! never handle rotation themselves.
//!
//! # Features
//!
//! - **Frozen snapshots** - Readers get immutable credential sets,
//!   replaced wholesale on refresh, never mutated in place
//! - **Lazy or eager refresh** - Deferred until first use by default
//! - **Thundering-herd protection** - One source call serves every
//!   concurrent reader during a refresh
//! - **Advisory and mandatory windows** - Early refresh failures fall
//!   back to still-valid credentials; late ones propagate
//! - **Bounded client caching** - LRU or LFU, keyed by normalized
//!   construction parameters
//! - **Pluggable sources** - Role assumption, container metadata
//!   endpoint, X.509 mutual TLS, or any user-supplied callable

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![forbid(unsafe_code)]

/// Refresh and session configuration
pub mod config;
/// Core types: snapshots, secrets and errors
pub mod core;
/// Credential refresh lifecycle
pub mod refresh;
/// Strategy dispatch
pub mod registry;
/// The session facade
pub mod session;
/// Pluggable credential sources
pub mod source;

/// Commonly used types and traits
pub mod prelude {
    pub use crate::config::{RefreshConfig, SessionConfig};
    pub use crate::core::{CredentialSnapshot, RawCredentials, Result, SecretString, SessionError};
    pub use crate::refresh::{RefreshController, RefreshState};
    pub use crate::registry::{Collaborators, SessionParams, SessionRegistry, StrategyKind};
    pub use crate::session::{ClientFactory, ClientHandle, ClientParams, Session, SessionBuilder};
    pub use crate::source::{CredentialSource, Identity};
    pub use async_trait::async_trait;
}

pub use crate::config::{RefreshConfig, SessionConfig};
pub use crate::core::{CredentialSnapshot, RawCredentials, Result, SecretString, SessionError};
pub use crate::refresh::{RefreshController, RefreshState};
pub use crate::registry::{
    Collaborators, SessionParams, SessionRegistry, SourceFactory, StrategyKind,
};
pub use crate::session::{
    ClientConfig, ClientFactory, ClientHandle, ClientParams, DefaultClientFactory, RetryConfig,
    ServiceClient, Session, SessionBuilder,
};
pub use crate::source::{CredentialSource, CustomSource, Identity};

// Re-export the cache crate so hosts configure caching without a
// separate dependency.
pub use refresh_session_cache as cache;
pub use refresh_session_cache::{CacheConfig, EvictionPolicy};
