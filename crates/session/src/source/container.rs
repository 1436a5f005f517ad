//! Container metadata-endpoint credential source.
//!
//! Long-running tasks in container schedulers expose task credentials
//! through a local HTTP endpoint whose location arrives via environment
//! variables. The HTTP GET itself goes through [`MetadataTransport`].

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::core::error::{Result, SessionError};
use crate::core::snapshot::{CredentialSnapshot, RawCredentials};
use crate::source::{CredentialSource, Identity};

/// Full endpoint URI, used as-is when set.
pub const ENV_FULL_URI: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";

/// Path relative to the link-local metadata host.
pub const ENV_RELATIVE_URI: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";

/// Optional bearer token for the metadata endpoint.
pub const ENV_AUTHORIZATION_TOKEN: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";

const DEFAULT_ENDPOINT_BASE: &str = "http://169.254.170.2";

/// Performs the metadata-endpoint HTTP GET.
#[async_trait]
pub trait MetadataTransport: Send + Sync {
    /// Fetch and parse the endpoint response as JSON.
    async fn get_json(&self, url: &Url, bearer_token: Option<&str>) -> Result<serde_json::Value>;
}

/// Resolved metadata-endpoint location and authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMetadataConfig {
    /// Credential endpoint URL
    pub endpoint: Url,
    /// Bearer token sent with each request
    pub authorization_token: Option<String>,
}

impl ContainerMetadataConfig {
    /// Resolve the endpoint from process environment variables.
    ///
    /// The full URI wins over the relative one; a relative path is
    /// resolved against the link-local metadata host.
    ///
    /// # Errors
    ///
    /// [`SessionError::Configuration`] when neither variable is set,
    /// [`SessionError::Validation`] when the resolved URI does not parse.
    pub fn from_env() -> Result<Self> {
        let full = std::env::var(ENV_FULL_URI).ok().filter(|v| !v.is_empty());
        let relative = std::env::var(ENV_RELATIVE_URI).ok().filter(|v| !v.is_empty());

        let uri = match (full, relative) {
            (Some(full), _) => full,
            (None, Some(relative)) => format!("{DEFAULT_ENDPOINT_BASE}{relative}"),
            (None, None) => {
                return Err(SessionError::configuration(format!(
                    "neither {ENV_FULL_URI} nor {ENV_RELATIVE_URI} is set; \
                     are you running inside a container with a task role?"
                )));
            }
        };

        let endpoint = Url::parse(&uri).map_err(|err| {
            SessionError::validation("endpoint", format!("'{uri}' is not a valid URL: {err}"))
        })?;

        Ok(Self {
            endpoint,
            authorization_token: std::env::var(ENV_AUTHORIZATION_TOKEN)
                .ok()
                .filter(|v| !v.is_empty()),
        })
    }
}

/// Credential source backed by the container metadata endpoint.
pub struct ContainerMetadataSource {
    config: ContainerMetadataConfig,
    transport: Arc<dyn MetadataTransport>,
}

impl ContainerMetadataSource {
    /// Build the source from an already-resolved configuration.
    pub fn new(config: ContainerMetadataConfig, transport: Arc<dyn MetadataTransport>) -> Self {
        Self { config, transport }
    }

    /// Resolve the endpoint from the environment and build the source.
    pub fn from_env(transport: Arc<dyn MetadataTransport>) -> Result<Self> {
        Ok(Self::new(ContainerMetadataConfig::from_env()?, transport))
    }

    fn field(body: &serde_json::Value, name: &str) -> Option<String> {
        body.get(name).and_then(|v| v.as_str()).map(str::to_string)
    }
}

#[async_trait]
impl CredentialSource for ContainerMetadataSource {
    fn method(&self) -> &'static str {
        "container_metadata"
    }

    async fn credentials(&self) -> Result<CredentialSnapshot> {
        let body = self
            .transport
            .get_json(
                &self.config.endpoint,
                self.config.authorization_token.as_deref(),
            )
            .await?;

        let raw = RawCredentials {
            access_key: Self::field(&body, "AccessKeyId"),
            secret_key: Self::field(&body, "SecretAccessKey"),
            token: Self::field(&body, "Token"),
            expiry_time: Self::field(&body, "Expiration"),
        };
        raw.into_snapshot(self.method())
    }

    async fn identity(&self) -> Result<Identity> {
        Ok(Identity::from([
            ("method".to_string(), self.method().to_string()),
            ("source".to_string(), self.config.endpoint.to_string()),
        ]))
    }
}
