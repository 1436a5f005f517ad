//! User-supplied credential source.
//!
//! For authentication flows nothing built in covers: the caller hands
//! over an async callable returning the raw credential shape, and this
//! source applies the usual completeness validation on every refresh.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::core::error::Result;
use crate::core::snapshot::{CredentialSnapshot, RawCredentials};
use crate::source::{CredentialSource, Identity};

type CredentialFn = dyn Fn() -> BoxFuture<'static, Result<RawCredentials>> + Send + Sync;

/// Credential source wrapping a user-provided async callable.
pub struct CustomSource {
    label: String,
    callable: Arc<CredentialFn>,
}

impl CustomSource {
    /// Wrap a callable under a diagnostic label.
    ///
    /// The label identifies the callable in identity maps and errors,
    /// since closures have no useful name of their own.
    pub fn new<F>(label: impl Into<String>, callable: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<RawCredentials>> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            callable: Arc::new(callable),
        }
    }
}

#[async_trait]
impl CredentialSource for CustomSource {
    fn method(&self) -> &'static str {
        "custom"
    }

    async fn credentials(&self) -> Result<CredentialSnapshot> {
        let raw = (self.callable)().await?;
        raw.into_snapshot(self.method())
    }

    async fn identity(&self) -> Result<Identity> {
        Ok(Identity::from([
            ("method".to_string(), self.method().to_string()),
            ("source".to_string(), self.label.clone()),
        ]))
    }
}

impl std::fmt::Debug for CustomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomSource")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
