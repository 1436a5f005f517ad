//! Error types for session and credential operations.
//!
//! One enum covers the full taxonomy: construction-time validation and
//! configuration failures, credential-shape failures, transport failures
//! reported by collaborators, strategy dispatch, and cache contract
//! violations. Every variant carries structured fields — no caller should
//! ever have to parse a message to recover the cause. Non-fatal
//! conditions (registry overwrite, stale-credential fallback) go through
//! `tracing::warn!` instead, never through this enum.

use refresh_session_cache::CacheError;
use thiserror::Error;

/// Top-level error for session construction, credential refresh and
/// client caching.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A required construction parameter is missing or malformed.
    #[error("invalid value for '{param}': {message}")]
    Validation {
        /// Offending parameter name
        param: &'static str,
        /// What was wrong with it
        message: String,
    },

    /// Structurally valid input that is incompatible with policy, e.g.
    /// conflicting MFA parameters.
    #[error("incompatible configuration: {message}")]
    Configuration {
        /// What conflicts and how to resolve it
        message: String,
    },

    /// A credential source produced a snapshot missing required fields.
    #[error("credential source '{method}' returned incomplete credentials (missing: {})", missing.join(", "))]
    IncompleteCredentials {
        /// Source method name
        method: String,
        /// Names of the absent credential fields
        missing: Vec<&'static str>,
    },

    /// A credential field was present but unusable.
    #[error("malformed credential field '{param}': {message} (value: {value:?})")]
    MalformedCredential {
        /// Offending field name
        param: &'static str,
        /// Why it could not be used
        message: String,
        /// The rejected value, when safe to echo
        value: Option<String>,
    },

    /// Transport-level failure reaching a credential endpoint.
    #[error("failed to reach credential endpoint '{endpoint}': {message}")]
    Connection {
        /// The endpoint that could not be reached
        endpoint: String,
        /// Transport diagnostic
        message: String,
    },

    /// The credential endpoint was reached but the request failed.
    #[error("credential request failed{}: {message}", match status { Some(code) => format!(" with status {code}"), None => String::new() })]
    Request {
        /// HTTP-ish status code when the collaborator had one
        status: Option<u16>,
        /// Remote diagnostic
        message: String,
    },

    /// Strategy dispatch against a name nobody registered.
    #[error("'{name}' is not a registered strategy (available: {})", available.join(", "))]
    InvalidStrategy {
        /// The requested strategy name
        name: String,
        /// Registered strategy names, sorted
        available: Vec<&'static str>,
    },

    /// Client-cache contract violation.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl SessionError {
    /// Shorthand for a validation failure.
    pub fn validation(param: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            param,
            message: message.into(),
        }
    }

    /// Shorthand for a configuration conflict.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
