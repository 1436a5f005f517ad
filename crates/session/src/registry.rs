//! Strategy dispatch: string discriminators to credential sources.
//!
//! The set of built-in strategies is a closed enum; the registry maps
//! discriminator strings to source factories and is populated by one
//! explicit [`SessionRegistry::builtin`] call at startup rather than by
//! ambient import-time side effects. Host programs pass the registry
//! around as a value and may register their own factories on top.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::config::SessionConfig;
use crate::core::error::{Result, SessionError};
use crate::session::Session;
use crate::source::{
    AssumeRoleApi, AssumeRoleConfig, AssumeRoleSource, ContainerMetadataConfig,
    ContainerMetadataSource, CredentialSource, MetadataTransport, MtlsTransport, X509Config,
    X509Source,
};

/// The built-in credential strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Assume a role through a token service
    AssumeRole,
    /// Container metadata endpoint
    ContainerMetadata,
    /// X.509 mutual-TLS role alias exchange
    X509,
    /// User-supplied callable
    Custom,
}

impl StrategyKind {
    /// Every built-in strategy.
    pub const ALL: [StrategyKind; 4] = [
        Self::AssumeRole,
        Self::ContainerMetadata,
        Self::X509,
        Self::Custom,
    ];

    /// The discriminator string for this strategy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssumeRole => "assume_role",
            Self::ContainerMetadata => "container_metadata",
            Self::X509 => "x509",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SessionError::InvalidStrategy {
                name: s.to_string(),
                available: Self::ALL.map(StrategyKind::as_str).to_vec(),
            })
    }
}

/// Builds a credential source from strategy parameters.
pub trait SourceFactory: Send + Sync {
    /// The discriminator this factory answers to.
    fn name(&self) -> &'static str;

    /// Build a source from JSON parameters.
    fn build(&self, params: serde_json::Value) -> Result<Arc<dyn CredentialSource>>;
}

fn bad_params(err: serde_json::Error) -> SessionError {
    SessionError::validation("source", format!("invalid strategy parameters: {err}"))
}

struct AssumeRoleFactory {
    api: Arc<dyn AssumeRoleApi>,
}

impl SourceFactory for AssumeRoleFactory {
    fn name(&self) -> &'static str {
        StrategyKind::AssumeRole.as_str()
    }

    fn build(&self, params: serde_json::Value) -> Result<Arc<dyn CredentialSource>> {
        let config: AssumeRoleConfig = serde_json::from_value(params).map_err(bad_params)?;
        Ok(Arc::new(AssumeRoleSource::new(config, self.api.clone())?))
    }
}

/// JSON shape for container-metadata parameters; everything optional,
/// with the environment as the fallback.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContainerParams {
    endpoint: Option<String>,
    authorization_token: Option<String>,
}

struct ContainerMetadataFactory {
    transport: Arc<dyn MetadataTransport>,
}

impl SourceFactory for ContainerMetadataFactory {
    fn name(&self) -> &'static str {
        StrategyKind::ContainerMetadata.as_str()
    }

    fn build(&self, params: serde_json::Value) -> Result<Arc<dyn CredentialSource>> {
        let params: ContainerParams = serde_json::from_value(params).map_err(bad_params)?;
        let config = match params.endpoint {
            Some(endpoint) => ContainerMetadataConfig {
                endpoint: Url::parse(&endpoint).map_err(|err| {
                    SessionError::validation(
                        "endpoint",
                        format!("'{endpoint}' is not a valid URL: {err}"),
                    )
                })?,
                authorization_token: params.authorization_token,
            },
            None => ContainerMetadataConfig::from_env()?,
        };
        Ok(Arc::new(ContainerMetadataSource::new(
            config,
            self.transport.clone(),
        )))
    }
}

struct X509Factory {
    transport: Arc<dyn MtlsTransport>,
}

impl SourceFactory for X509Factory {
    fn name(&self) -> &'static str {
        StrategyKind::X509.as_str()
    }

    fn build(&self, params: serde_json::Value) -> Result<Arc<dyn CredentialSource>> {
        let config: X509Config = serde_json::from_value(params).map_err(bad_params)?;
        Ok(Arc::new(X509Source::new(config, self.transport.clone())?))
    }
}

/// External collaborators the built-in strategies need.
///
/// Strategies whose collaborator is absent are simply not registered,
/// so a host that only ever assumes roles wires one field.
#[derive(Default)]
pub struct Collaborators {
    /// Remote assume-role and caller-identity calls
    pub assume_role: Option<Arc<dyn AssumeRoleApi>>,
    /// Metadata endpoint HTTP transport
    pub metadata: Option<Arc<dyn MetadataTransport>>,
    /// Mutual-TLS transport
    pub mtls: Option<Arc<dyn MtlsTransport>>,
}

/// Parameters for [`SessionRegistry::create_session`].
#[derive(Debug, Default)]
pub struct SessionParams {
    /// Strategy-specific source parameters, as JSON
    pub source: serde_json::Value,
    /// Refresh and cache configuration
    pub config: SessionConfig,
}

/// Maps strategy names to source factories.
pub struct SessionRegistry {
    factories: HashMap<&'static str, Arc<dyn SourceFactory>>,
}

impl SessionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry holding the built-in strategies whose collaborator
    /// was provided. The custom strategy takes an arbitrary callable
    /// and therefore cannot be built from JSON; wrap a
    /// [`crate::source::CustomSource`] in a [`Session`] directly, or
    /// register a host-defined factory for it.
    pub fn builtin(collaborators: Collaborators) -> Self {
        let mut registry = Self::new();
        if let Some(api) = collaborators.assume_role {
            registry.register(Arc::new(AssumeRoleFactory { api }));
        }
        if let Some(transport) = collaborators.metadata {
            registry.register(Arc::new(ContainerMetadataFactory { transport }));
        }
        if let Some(transport) = collaborators.mtls {
            registry.register(Arc::new(X509Factory { transport }));
        }
        registry
    }

    /// Register a factory, replacing any existing one for the same
    /// name with a warning.
    pub fn register(&mut self, factory: Arc<dyn SourceFactory>) {
        let name = factory.name();
        if self.factories.insert(name, factory).is_some() {
            tracing::warn!(strategy = name, "strategy already registered, overwriting");
        }
    }

    /// Registered strategy names, sorted.
    pub fn strategies(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Build a source for `strategy` without wrapping it in a session.
    pub fn create_source(
        &self,
        strategy: &str,
        params: serde_json::Value,
    ) -> Result<Arc<dyn CredentialSource>> {
        let factory = self
            .factories
            .get(strategy)
            .ok_or_else(|| SessionError::InvalidStrategy {
                name: strategy.to_string(),
                available: self.strategies(),
            })?;
        factory.build(params)
    }

    /// Build and open a session for `strategy`.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidStrategy`] for an unregistered name,
    /// otherwise whatever source construction, configuration validation
    /// or the eager first fetch produce.
    pub async fn create_session(&self, strategy: &str, params: SessionParams) -> Result<Session> {
        let source = self.create_source(strategy, params.source)?;
        let session = Session::builder(source).config(params.config).build()?;
        session.open().await?;
        Ok(session)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("strategies", &self.strategies())
            .finish()
    }
}
