//! Credential lifecycle: frozen snapshots, lazy or eager refresh, and
//! thundering-herd protection.
//!
//! Reads take a lock-free snapshot probe first; only callers that find
//! the snapshot missing or inside the advisory window queue on the
//! refresh gate, and the first one through re-checks freshness so a
//! single source invocation serves the whole queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};

use crate::config::RefreshConfig;
use crate::core::error::Result;
use crate::core::snapshot::CredentialSnapshot;
use crate::source::CredentialSource;

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No fetch yet; the first read will trigger one
    Deferred,
    /// Credentials were materialized at open
    Eager,
    /// A refresh is in flight right now
    Refreshing,
}

/// Drives a [`CredentialSource`], holding the current frozen snapshot.
pub struct RefreshController {
    source: Arc<dyn CredentialSource>,
    config: RefreshConfig,
    current: ArcSwapOption<CredentialSnapshot>,
    gate: tokio::sync::Mutex<()>,
    refreshing: AtomicBool,
}

impl RefreshController {
    /// Build a controller. Performs no I/O; call [`start`](Self::start)
    /// to honor eager refresh.
    pub fn new(source: Arc<dyn CredentialSource>, config: RefreshConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            current: ArcSwapOption::const_empty(),
            gate: tokio::sync::Mutex::new(()),
            refreshing: AtomicBool::new(false),
        })
    }

    /// Materialize credentials now unless refresh is deferred.
    pub async fn start(&self) -> Result<()> {
        if !self.config.defer_refresh {
            self.current().await?;
        }
        Ok(())
    }

    /// Install a snapshot without consulting the source.
    ///
    /// Used to carry credentials over from a previous process; an
    /// expired seed simply triggers a refresh on the next read.
    pub fn seed(&self, snapshot: CredentialSnapshot) {
        self.current.store(Some(Arc::new(snapshot)));
    }

    /// The current credentials, refreshing first if they are missing or
    /// inside the advisory window.
    ///
    /// Concurrent callers that arrive during a refresh all receive the
    /// result of that same refresh; the source is invoked at most once
    /// per expiry cycle.
    ///
    /// # Errors
    ///
    /// Propagates source failures, except when a still-valid snapshot
    /// outside the mandatory window exists; that one is served stale
    /// with a warning instead.
    pub async fn current(&self) -> Result<Arc<CredentialSnapshot>> {
        if let Some(snapshot) = self.current.load_full() {
            if !self.needs_refresh(&snapshot, Utc::now()) {
                return Ok(snapshot);
            }
        }

        let _guard = self.gate.lock().await;

        // A refresh may have completed while this caller queued.
        if let Some(snapshot) = self.current.load_full() {
            if !self.needs_refresh(&snapshot, Utc::now()) {
                return Ok(snapshot);
            }
        }

        self.refresh_locked().await
    }

    /// The current snapshot without triggering a refresh, if any.
    pub fn snapshot(&self) -> Option<Arc<CredentialSnapshot>> {
        self.current.load_full()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RefreshState {
        if self.refreshing.load(Ordering::SeqCst) {
            RefreshState::Refreshing
        } else if self.config.defer_refresh {
            RefreshState::Deferred
        } else {
            RefreshState::Eager
        }
    }

    fn needs_refresh(&self, snapshot: &CredentialSnapshot, now: DateTime<Utc>) -> bool {
        snapshot.expires_within(now, self.config.advisory_secs())
    }

    // Caller holds the gate.
    async fn refresh_locked(&self) -> Result<Arc<CredentialSnapshot>> {
        self.refreshing.store(true, Ordering::SeqCst);
        let _reset = scopeguard::guard(&self.refreshing, |flag| {
            flag.store(false, Ordering::SeqCst);
        });

        match self.source.credentials().await {
            Ok(snapshot) => {
                let now = Utc::now();
                if snapshot.is_expired(now) {
                    tracing::warn!(
                        method = self.source.method(),
                        expiry = %snapshot.expiry_iso8601(),
                        "source returned already-expired credentials"
                    );
                }
                tracing::debug!(
                    method = self.source.method(),
                    expiry = %snapshot.expiry_iso8601(),
                    "refreshed credentials"
                );
                let snapshot = Arc::new(snapshot);
                self.current.store(Some(snapshot.clone()));
                Ok(snapshot)
            }
            Err(err) => {
                if let Some(previous) = self.current.load_full() {
                    let remaining = previous.seconds_remaining(Utc::now());
                    if remaining > self.config.mandatory_secs() {
                        tracing::warn!(
                            method = self.source.method(),
                            remaining_secs = remaining,
                            error = %err,
                            "refresh failed, serving existing credentials"
                        );
                        return Ok(previous);
                    }
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for RefreshController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshController")
            .field("method", &self.source.method())
            .field("state", &self.state())
            .field("has_snapshot", &self.current.load().is_some())
            .finish()
    }
}
