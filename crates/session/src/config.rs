//! Refresh and session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use refresh_session_cache::CacheConfig;

use crate::core::error::{Result, SessionError};

/// Advisory refresh window: refresh is attempted once remaining
/// lifetime drops to this, but a failed attempt is survivable.
pub const DEFAULT_ADVISORY_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Mandatory refresh window: inside it a failed refresh is a hard error
/// because the credentials are too close to expiry to keep serving.
pub const DEFAULT_MANDATORY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Controls when and how credentials are re-fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Defer the first fetch until credentials are actually read.
    /// When false the first fetch happens at session open.
    pub defer_refresh: bool,

    /// Remaining-lifetime threshold at which refresh is attempted.
    #[serde(with = "humantime_serde")]
    pub advisory_timeout: Duration,

    /// Remaining-lifetime threshold below which a failed refresh is
    /// propagated instead of falling back to the stale snapshot.
    #[serde(with = "humantime_serde")]
    pub mandatory_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            defer_refresh: true,
            advisory_timeout: DEFAULT_ADVISORY_TIMEOUT,
            mandatory_timeout: DEFAULT_MANDATORY_TIMEOUT,
        }
    }
}

impl RefreshConfig {
    /// Validate window ordering.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] when either window is zero
    /// or the mandatory window exceeds the advisory one.
    pub fn validate(&self) -> Result<()> {
        if self.advisory_timeout.is_zero() || self.mandatory_timeout.is_zero() {
            return Err(SessionError::configuration(
                "refresh timeouts must be non-zero",
            ));
        }
        if self.mandatory_timeout > self.advisory_timeout {
            return Err(SessionError::configuration(format!(
                "mandatory_timeout ({}s) must not exceed advisory_timeout ({}s)",
                self.mandatory_timeout.as_secs(),
                self.advisory_timeout.as_secs()
            )));
        }
        Ok(())
    }

    /// Advisory window in whole seconds.
    pub fn advisory_secs(&self) -> i64 {
        i64::try_from(self.advisory_timeout.as_secs()).unwrap_or(i64::MAX)
    }

    /// Mandatory window in whole seconds.
    pub fn mandatory_secs(&self) -> i64 {
        i64::try_from(self.mandatory_timeout.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Top-level session configuration: refresh behavior plus client caching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Credential refresh behavior
    pub refresh: RefreshConfig,

    /// Client cache behavior
    pub cache: CacheConfig,
}

impl SessionConfig {
    /// Validate the whole configuration tree.
    pub fn validate(&self) -> Result<()> {
        self.refresh.validate()
    }
}
