//! Frozen credential snapshots and the raw wire shape sources produce.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SessionError};
use crate::core::secret::SecretString;

/// An immutable set of temporary credentials.
///
/// Snapshots are frozen at refresh time: once handed out they never
/// mutate, and holders keep seeing the same values even after the
/// controller has replaced them with a fresh set. Secret fields zero
/// their memory on drop and redact themselves in `Debug` output.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialSnapshot {
    /// Access key identifier (not secret)
    pub access_key: String,

    /// Secret access key
    pub secret_key: SecretString,

    /// Session token bound to this credential set
    pub session_token: SecretString,

    /// Absolute expiry instant, second resolution
    #[serde(rename = "expiry_time")]
    pub expiry: DateTime<Utc>,
}

impl CredentialSnapshot {
    /// Build a snapshot from already-validated parts.
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<SecretString>,
        session_token: impl Into<SecretString>,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: session_token.into(),
            expiry,
        }
    }

    /// Whole seconds until expiry, negative once past it.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expiry - now).num_seconds()
    }

    /// Whether the expiry instant has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.seconds_remaining(now) <= 0
    }

    /// Whether the snapshot expires within `window_secs` from `now`.
    ///
    /// This is the refresh trigger: a snapshot inside the advisory window
    /// is still usable but due for replacement.
    pub fn expires_within(&self, now: DateTime<Utc>, window_secs: i64) -> bool {
        self.seconds_remaining(now) <= window_secs
    }

    /// Expiry rendered as an ISO-8601 timestamp, second resolution.
    pub fn expiry_iso8601(&self) -> String {
        self.expiry.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl std::fmt::Debug for CredentialSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSnapshot")
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key)
            .field("session_token", &self.session_token)
            .field("expiry", &self.expiry_iso8601())
            .finish()
    }
}

/// The loose shape credential endpoints and user callables return.
///
/// Every field is optional at this layer; [`RawCredentials::into_snapshot`]
/// is the single place where completeness is enforced, so each source can
/// stay a thin field-mapping shim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RawCredentials {
    /// Access key identifier
    pub access_key: Option<String>,

    /// Secret access key
    pub secret_key: Option<String>,

    /// Session token
    pub token: Option<String>,

    /// ISO-8601 expiry timestamp
    pub expiry_time: Option<String>,
}

impl RawCredentials {
    /// Validate and freeze into a [`CredentialSnapshot`].
    ///
    /// # Errors
    ///
    /// [`SessionError::IncompleteCredentials`] naming every absent field,
    /// or [`SessionError::MalformedCredential`] when `expiry_time` is not
    /// a valid ISO-8601 timestamp.
    pub fn into_snapshot(self, method: &str) -> Result<CredentialSnapshot> {
        let mut missing = Vec::new();
        if self.access_key.is_none() {
            missing.push("access_key");
        }
        if self.secret_key.is_none() {
            missing.push("secret_key");
        }
        if self.token.is_none() {
            missing.push("token");
        }
        if self.expiry_time.is_none() {
            missing.push("expiry_time");
        }
        if !missing.is_empty() {
            return Err(SessionError::IncompleteCredentials {
                method: method.to_string(),
                missing,
            });
        }

        // All four checked present above.
        let (Some(access_key), Some(secret_key), Some(token), Some(expiry_time)) =
            (self.access_key, self.secret_key, self.token, self.expiry_time)
        else {
            unreachable!()
        };

        let expiry = DateTime::parse_from_rfc3339(&expiry_time)
            .map_err(|err| SessionError::MalformedCredential {
                param: "expiry_time",
                message: format!("not a valid ISO-8601 timestamp: {err}"),
                value: Some(expiry_time.clone()),
            })?
            .with_timezone(&Utc);

        Ok(CredentialSnapshot::new(access_key, secret_key, token, expiry))
    }
}
