//! Pluggable credential sources.
//!
//! A source knows how to produce one fresh credential set on demand and
//! how to describe the identity those credentials act as. Sources never
//! cache or schedule anything; lifecycle (when to call, concurrency,
//! stale fallback) belongs to the refresh controller.
//!
//! Network-facing sources take their transport as a collaborator trait
//! (`AssumeRoleApi`, `MetadataTransport`, `MtlsTransport`) so the
//! protocol logic stays testable without wire access.

pub mod assume_role;
pub mod container;
pub mod custom;
pub mod x509;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::snapshot::CredentialSnapshot;

/// Who the credentials act as, as a flat string map.
///
/// Keys vary by source method; every map carries at least `"method"`.
pub type Identity = BTreeMap<String, String>;

/// A strategy for obtaining temporary credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Stable method name, used in errors, identity maps and logs.
    fn method(&self) -> &'static str;

    /// Fetch one fresh credential set.
    ///
    /// Called by the refresh controller each time the current snapshot
    /// enters the advisory window. Implementations must not cache.
    async fn credentials(&self) -> Result<CredentialSnapshot>;

    /// Describe the identity the credentials act as.
    async fn identity(&self) -> Result<Identity>;
}

impl fmt::Debug for dyn CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSource")
            .field("method", &self.method())
            .finish_non_exhaustive()
    }
}

pub use assume_role::{AssumeRoleApi, AssumeRoleConfig, AssumeRoleRequest, AssumeRoleSource, MfaTokenProvider};
pub use container::{ContainerMetadataConfig, ContainerMetadataSource, MetadataTransport};
pub use custom::CustomSource;
pub use x509::{MtlsTransport, Pkcs11Config, X509Config, X509Source};
