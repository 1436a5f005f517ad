//! Session facade: cached client construction over refreshed credentials.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use refresh_session_cache::{CacheValue, ClientCache, ClientCacheKey, Normalize};

use crate::config::SessionConfig;
use crate::core::error::{Result, SessionError};
use crate::core::snapshot::CredentialSnapshot;
use crate::refresh::{RefreshController, RefreshState};
use crate::source::{CredentialSource, Identity};

/// A constructed service client.
///
/// The session does not prescribe what a client is; anything the
/// factory produces qualifies. `as_any` lets callers downcast to the
/// concrete type their factory builds.
pub trait ClientHandle: Send + Sync {
    /// Service this client talks to.
    fn service(&self) -> &str;

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("service", &self.service())
            .finish_non_exhaustive()
    }
}

/// Builds service clients from frozen credentials and parameters.
pub trait ClientFactory: Send + Sync {
    /// Construct a client for `service`.
    fn build(
        &self,
        service: &str,
        credentials: &CredentialSnapshot,
        params: &ClientParams,
    ) -> Result<Arc<dyn ClientHandle>>;
}

/// Retry behavior requested for a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per operation
    pub max_attempts: Option<u32>,
    /// Retry mode name, e.g. "standard" or "adaptive"
    pub mode: Option<String>,
}

/// Advanced per-client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Retry behavior
    pub retries: Option<RetryConfig>,
    /// Connect timeout in seconds
    pub connect_timeout: Option<u64>,
    /// Read timeout in seconds
    pub read_timeout: Option<u64>,
}

impl Normalize for ClientConfig {
    fn normalize(&self) -> CacheValue {
        let mut map = Vec::new();
        if let Some(retries) = &self.retries {
            let mut nested = Vec::new();
            if let Some(max_attempts) = retries.max_attempts {
                nested.push(("max_attempts".to_string(), CacheValue::from(i64::from(max_attempts))));
            }
            if let Some(mode) = &retries.mode {
                nested.push(("mode".to_string(), CacheValue::from(mode.as_str())));
            }
            map.push(("retries".to_string(), CacheValue::map(nested)));
        }
        if let Some(connect_timeout) = self.connect_timeout {
            map.push((
                "connect_timeout".to_string(),
                CacheValue::from(connect_timeout as i64),
            ));
        }
        if let Some(read_timeout) = self.read_timeout {
            map.push((
                "read_timeout".to_string(),
                CacheValue::from(read_timeout as i64),
            ));
        }
        CacheValue::map(map)
    }
}

/// Client construction parameters.
///
/// Every field is optional; unset fields are left out of the cache key
/// entirely, so `{region: None}` and `{}` identify the same client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientParams {
    /// Region the client targets
    pub region_name: Option<String>,
    /// Pinned API version
    pub api_version: Option<String>,
    /// Whether to use TLS
    pub use_ssl: Option<bool>,
    /// Whether to verify the server certificate
    pub verify: Option<bool>,
    /// Endpoint override
    pub endpoint_url: Option<String>,
    /// Advanced configuration
    pub config: Option<ClientConfig>,
}

impl ClientParams {
    /// Normalized cache key for a client of `service` with these
    /// parameters.
    pub fn cache_key(&self, service: &str) -> ClientCacheKey {
        let mut keyword = Vec::new();
        if let Some(region_name) = &self.region_name {
            keyword.push(("region_name".to_string(), CacheValue::from(region_name.as_str())));
        }
        if let Some(api_version) = &self.api_version {
            keyword.push(("api_version".to_string(), CacheValue::from(api_version.as_str())));
        }
        if let Some(use_ssl) = self.use_ssl {
            keyword.push(("use_ssl".to_string(), CacheValue::from(use_ssl)));
        }
        if let Some(verify) = self.verify {
            keyword.push(("verify".to_string(), CacheValue::from(verify)));
        }
        if let Some(endpoint_url) = &self.endpoint_url {
            keyword.push(("endpoint_url".to_string(), CacheValue::from(endpoint_url.as_str())));
        }
        if let Some(config) = &self.config {
            keyword.push(("config".to_string(), config.normalize()));
        }
        ClientCacheKey::for_service(service, keyword)
    }
}

/// The client the default factory produces: a record of what was
/// requested and which credential set it was built against.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    /// Service name
    pub service: String,
    /// Parameters the client was built with
    pub params: ClientParams,
    /// Access key of the credentials frozen into this client
    pub access_key: String,
}

impl ClientHandle for ServiceClient {
    fn service(&self) -> &str {
        &self.service
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory producing [`ServiceClient`] records.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClientFactory;

impl ClientFactory for DefaultClientFactory {
    fn build(
        &self,
        service: &str,
        credentials: &CredentialSnapshot,
        params: &ClientParams,
    ) -> Result<Arc<dyn ClientHandle>> {
        Ok(Arc::new(ServiceClient {
            service: service.to_string(),
            params: params.clone(),
            access_key: credentials.access_key.clone(),
        }))
    }
}

/// A session: one credential source, auto-refreshed credentials, and a
/// bounded cache of constructed clients.
pub struct Session {
    source: Arc<dyn CredentialSource>,
    controller: Arc<RefreshController>,
    cache: Option<ClientCache<Arc<dyn ClientHandle>>>,
    factory: Arc<dyn ClientFactory>,
}

impl Session {
    /// Start building a session around a credential source.
    pub fn builder(source: Arc<dyn CredentialSource>) -> SessionBuilder {
        SessionBuilder {
            source,
            config: SessionConfig::default(),
            factory: None,
        }
    }

    /// Honor eager refresh by materializing credentials now.
    ///
    /// A no-op under deferred refresh.
    pub async fn open(&self) -> Result<()> {
        self.controller.start().await
    }

    /// A client for `service`, cached when caching is enabled.
    ///
    /// A cache hit returns without touching credentials at all. On a
    /// miss the client is built from current credentials and inserted;
    /// if a concurrent caller inserted first, their client wins and is
    /// returned, so every racer converges on one handle.
    pub async fn client(&self, service: &str, params: &ClientParams) -> Result<Arc<dyn ClientHandle>> {
        if service.trim().is_empty() {
            return Err(SessionError::validation("service", "must not be empty"));
        }

        let Some(cache) = &self.cache else {
            let credentials = self.controller.current().await?;
            return self.factory.build(service, &credentials, params);
        };

        let key = params.cache_key(service);
        if let Some(client) = cache.get(&key) {
            tracing::debug!(key = %key, "client cache hit");
            return Ok(client);
        }

        let credentials = self.controller.current().await?;
        let client = self.factory.build(service, &credentials, params)?;

        match cache.insert(key.clone(), client.clone()) {
            Ok(()) => Ok(client),
            // Lost the insert race; converge on the winner.
            Err(_) => Ok(cache.get(&key).unwrap_or(client)),
        }
    }

    /// The current credentials, refreshing if needed.
    pub async fn credentials(&self) -> Result<Arc<CredentialSnapshot>> {
        self.controller.current().await
    }

    /// The current snapshot without triggering a refresh.
    pub fn frozen_credentials(&self) -> Option<Arc<CredentialSnapshot>> {
        self.controller.snapshot()
    }

    /// Identity metadata from the active source. May perform network
    /// I/O; never cached.
    pub async fn identity(&self) -> Result<Identity> {
        self.source.identity().await
    }

    /// Alias for [`identity`](Self::identity).
    pub async fn whoami(&self) -> Result<Identity> {
        self.identity().await
    }

    /// The refresh lifecycle state.
    pub fn refresh_state(&self) -> RefreshState {
        self.controller.state()
    }

    /// The client cache, when enabled.
    pub fn cache(&self) -> Option<&ClientCache<Arc<dyn ClientHandle>>> {
        self.cache.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("method", &self.source.method())
            .field("state", &self.refresh_state())
            .field("cached_clients", &self.cache.as_ref().map(ClientCache::len))
            .finish()
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    source: Arc<dyn CredentialSource>,
    config: SessionConfig,
    factory: Option<Arc<dyn ClientFactory>>,
}

impl SessionBuilder {
    /// Use this configuration tree.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the client factory.
    pub fn factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Validate configuration and assemble the session. No I/O; call
    /// [`Session::open`] afterwards.
    pub fn build(self) -> Result<Session> {
        self.config.validate()?;

        let cache = if self.config.cache.enabled {
            Some(ClientCache::new(&self.config.cache)?)
        } else {
            None
        };

        let controller = Arc::new(RefreshController::new(
            self.source.clone(),
            self.config.refresh.clone(),
        )?);

        Ok(Session {
            source: self.source,
            controller,
            cache,
            factory: self
                .factory
                .unwrap_or_else(|| Arc::new(DefaultClientFactory)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    use refresh_session_cache::CacheConfig;

    use crate::config::RefreshConfig;
    use crate::core::snapshot::RawCredentials;

    struct StaticSource;

    #[async_trait]
    impl CredentialSource for StaticSource {
        fn method(&self) -> &'static str {
            "static"
        }

        async fn credentials(&self) -> Result<CredentialSnapshot> {
            RawCredentials {
                access_key: Some("AKIDEXAMPLE".to_string()),
                secret_key: Some("sk".to_string()),
                token: Some("tk".to_string()),
                expiry_time: Some((Utc::now() + Duration::hours(1)).to_rfc3339()),
            }
            .into_snapshot(self.method())
        }

        async fn identity(&self) -> Result<Identity> {
            Ok(Identity::from([(
                "method".to_string(),
                "static".to_string(),
            )]))
        }
    }

    struct CountingFactory {
        builds: AtomicUsize,
    }

    impl CountingFactory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
            })
        }
    }

    impl ClientFactory for CountingFactory {
        fn build(
            &self,
            service: &str,
            credentials: &CredentialSnapshot,
            params: &ClientParams,
        ) -> Result<Arc<dyn ClientHandle>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            DefaultClientFactory.build(service, credentials, params)
        }
    }

    fn session_with(factory: Arc<CountingFactory>, cache_enabled: bool) -> Session {
        Session::builder(Arc::new(StaticSource))
            .config(SessionConfig {
                refresh: RefreshConfig::default(),
                cache: CacheConfig {
                    enabled: cache_enabled,
                    ..CacheConfig::default()
                },
            })
            .factory(factory)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_identical_params_share_one_client() {
        let factory = CountingFactory::new();
        let session = session_with(factory.clone(), true);

        let params = ClientParams {
            region_name: Some("us-west-2".to_string()),
            ..ClientParams::default()
        };
        let first = session.client("s3", &params).await.unwrap();
        let second = session.client("s3", &params).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_builds_every_time() {
        let factory = CountingFactory::new();
        let session = session_with(factory.clone(), false);

        session.client("s3", &ClientParams::default()).await.unwrap();
        session.client("s3", &ClientParams::default()).await.unwrap();
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_service_name_rejected() {
        let session = session_with(CountingFactory::new(), true);
        let err = session.client("  ", &ClientParams::default()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Validation { param: "service", .. }
        ));
    }

    #[tokio::test]
    async fn test_differing_params_build_distinct_clients() {
        let factory = CountingFactory::new();
        let session = session_with(factory.clone(), true);

        let west = ClientParams {
            region_name: Some("us-west-2".to_string()),
            ..ClientParams::default()
        };
        let east = ClientParams {
            region_name: Some("us-east-1".to_string()),
            ..ClientParams::default()
        };
        let first = session.client("s3", &west).await.unwrap();
        let second = session.client("s3", &east).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_whoami_delegates_to_source() {
        let session = session_with(CountingFactory::new(), true);
        let identity = session.whoami().await.unwrap();
        assert_eq!(identity.get("method").map(String::as_str), Some("static"));
    }

    #[test]
    fn test_nested_config_normalization_is_order_independent() {
        let config = ClientConfig {
            retries: Some(RetryConfig {
                max_attempts: Some(2),
                mode: Some("standard".to_string()),
            }),
            ..ClientConfig::default()
        };
        let params_a = ClientParams {
            config: Some(config.clone()),
            region_name: Some("us-west-2".to_string()),
            ..ClientParams::default()
        };

        let key = params_a.cache_key("s3");
        let label = key.label();
        assert!(label.contains("config"));
        assert!(label.contains("region_name='us-west-2'"));
    }

    #[test]
    fn test_unset_params_match_defaults() {
        let explicit = ClientParams::default();
        let key_a = explicit.cache_key("s3");
        let key_b = ClientCacheKey::for_service("s3", []);
        assert_eq!(key_a, key_b);
    }
}
