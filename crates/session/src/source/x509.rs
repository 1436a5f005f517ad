//! X.509 mutual-TLS credential source.
//!
//! Exchanges a device certificate for temporary credentials through a
//! role-alias endpoint. The TLS handshake and HTTP exchange live behind
//! the [`MtlsTransport`] collaborator; this module owns endpoint
//! normalization, key-source validation and response reshaping.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::error::{Result, SessionError};
use crate::core::snapshot::{CredentialSnapshot, RawCredentials};
use crate::source::{CredentialSource, Identity};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// PKCS#11 hardware-token key source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pkcs11Config {
    /// Path to the PKCS#11 provider library
    pub library_path: PathBuf,
    /// User PIN
    pub pin: Option<String>,
    /// Token label to select
    pub token_label: Option<String>,
    /// Private key object label
    pub key_label: Option<String>,
    /// Slot to use when the label is ambiguous
    pub slot_id: Option<u64>,
}

/// A fully described mTLS request against the role-alias endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtlsRequest {
    /// Request URL
    pub url: Url,
    /// Device certificate (path to a PEM file)
    pub certificate: PathBuf,
    /// File-based private key, absent when PKCS#11 is used
    pub private_key: Option<PathBuf>,
    /// Hardware-token key source, absent when a key file is used
    pub pkcs11: Option<Pkcs11Config>,
    /// Thing-name header value
    pub thing_name: Option<String>,
    /// Requested credential lifetime header value
    pub duration_seconds: Option<u32>,
    /// Whether the server certificate is verified
    pub verify_peer: bool,
    /// Request timeout
    pub timeout: Duration,
}

/// Performs the mutual-TLS GET and parses the body as JSON.
#[async_trait]
pub trait MtlsTransport: Send + Sync {
    /// Execute the request, returning the parsed response body.
    async fn get_json(&self, request: &MtlsRequest) -> Result<serde_json::Value>;
}

/// X.509 source configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct X509Config {
    /// Credential endpoint hostname (required)
    pub endpoint: String,

    /// Role alias to exchange the certificate for (required)
    pub role_alias: String,

    /// Device certificate PEM file (required)
    pub certificate: PathBuf,

    /// Registered thing name sent with the request
    pub thing_name: Option<String>,

    /// File-based private key; exclusive with `pkcs11`
    pub private_key: Option<PathBuf>,

    /// PKCS#11 key source; exclusive with `private_key`
    pub pkcs11: Option<Pkcs11Config>,

    /// Requested credential lifetime in seconds
    pub duration_seconds: Option<u32>,

    /// Verify the server certificate. Defaults to true.
    pub verify_peer: Option<bool>,

    /// Request timeout. Defaults to 10 seconds.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Credential source exchanging a device certificate for credentials.
pub struct X509Source {
    request: MtlsRequest,
    endpoint_host: String,
    role_alias: String,
    transport: Arc<dyn MtlsTransport>,
}

impl fmt::Debug for X509Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X509Source")
            .field("request", &self.request)
            .field("endpoint_host", &self.endpoint_host)
            .field("role_alias", &self.role_alias)
            .finish_non_exhaustive()
    }
}

impl X509Source {
    /// Validate the configuration and build the source. No network I/O.
    ///
    /// # Errors
    ///
    /// [`SessionError::Validation`] for missing endpoint, role alias or
    /// certificate; [`SessionError::Configuration`] unless exactly one of
    /// `private_key` and `pkcs11` is set.
    pub fn new(config: X509Config, transport: Arc<dyn MtlsTransport>) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(SessionError::validation("endpoint", "must be provided"));
        }
        if config.role_alias.trim().is_empty() {
            return Err(SessionError::validation("role_alias", "must be provided"));
        }
        if config.certificate.as_os_str().is_empty() {
            return Err(SessionError::validation("certificate", "must be provided"));
        }
        match (&config.private_key, &config.pkcs11) {
            (None, None) => {
                return Err(SessionError::configuration(
                    "either 'private_key' or 'pkcs11' must be provided",
                ));
            }
            (Some(_), Some(_)) => {
                return Err(SessionError::configuration(
                    "only one of 'private_key' and 'pkcs11' can be provided",
                ));
            }
            _ => {}
        }

        let endpoint_host = Self::normalize_endpoint(&config.endpoint);
        let url = Url::parse(&format!(
            "https://{endpoint_host}/role-aliases/{}/credentials",
            config.role_alias
        ))
        .map_err(|err| {
            SessionError::validation(
                "endpoint",
                format!("'{endpoint_host}' does not form a valid URL: {err}"),
            )
        })?;

        Ok(Self {
            request: MtlsRequest {
                url,
                certificate: config.certificate,
                private_key: config.private_key,
                pkcs11: config.pkcs11,
                thing_name: config.thing_name,
                duration_seconds: config.duration_seconds,
                verify_peer: config.verify_peer.unwrap_or(true),
                timeout: config.timeout.unwrap_or(DEFAULT_TIMEOUT),
            },
            endpoint_host,
            role_alias: config.role_alias,
            transport,
        })
    }

    /// Rewrite a data-plane hostname into its credential-plane twin.
    ///
    /// Device endpoints of the form `<id>-ats.iot.<region>...` serve the
    /// data plane; the credential endpoint lives under
    /// `<id>.credentials.iot.<region>...`. Endpoints already on the
    /// credential plane pass through unchanged.
    fn normalize_endpoint(endpoint: &str) -> String {
        if endpoint.contains(".credentials.iot.") {
            return endpoint.to_string();
        }
        if endpoint.contains(".iot.") && endpoint.contains("-ats.") {
            let rewritten = endpoint.replace("-ats.iot", ".credentials.iot");
            tracing::warn!(
                "endpoint looks like a data endpoint, rewriting to the \
                 credential endpoint"
            );
            return rewritten;
        }
        endpoint.to_string()
    }

    fn field(credentials: &serde_json::Value, name: &str) -> Option<String> {
        credentials
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[async_trait]
impl CredentialSource for X509Source {
    fn method(&self) -> &'static str {
        "x509"
    }

    async fn credentials(&self) -> Result<CredentialSnapshot> {
        let body = self.transport.get_json(&self.request).await?;

        // The endpoint nests the fields under a "credentials" object.
        let credentials = body.get("credentials").ok_or_else(|| SessionError::Request {
            status: None,
            message: "response is missing the 'credentials' object".to_string(),
        })?;

        let raw = RawCredentials {
            access_key: Self::field(credentials, "accessKeyId"),
            secret_key: Self::field(credentials, "secretAccessKey"),
            token: Self::field(credentials, "sessionToken"),
            expiry_time: Self::field(credentials, "expiration"),
        };
        raw.into_snapshot(self.method())
    }

    async fn identity(&self) -> Result<Identity> {
        let mut identity = Identity::from([
            ("method".to_string(), self.method().to_string()),
            ("endpoint".to_string(), self.endpoint_host.clone()),
            ("role_alias".to_string(), self.role_alias.clone()),
        ]);
        if let Some(thing_name) = &self.request.thing_name {
            identity.insert("thing_name".to_string(), thing_name.clone());
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;

    struct FakeTransport {
        requests: Mutex<Vec<MtlsRequest>>,
        body: serde_json::Value,
    }

    impl FakeTransport {
        fn new(body: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                body,
            })
        }
    }

    #[async_trait]
    impl MtlsTransport for FakeTransport {
        async fn get_json(&self, request: &MtlsRequest) -> Result<serde_json::Value> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.body.clone())
        }
    }

    fn config() -> X509Config {
        X509Config {
            endpoint: "abc123.credentials.iot.us-east-1.amazonaws.com".to_string(),
            role_alias: "device-role".to_string(),
            certificate: PathBuf::from("/etc/device/cert.pem"),
            private_key: Some(PathBuf::from("/etc/device/key.pem")),
            thing_name: Some("sensor-01".to_string()),
            ..X509Config::default()
        }
    }

    fn body() -> serde_json::Value {
        json!({
            "credentials": {
                "accessKeyId": "AKIDEXAMPLE",
                "secretAccessKey": "sk",
                "sessionToken": "tk",
                "expiration": "2026-01-01T00:00:00Z"
            }
        })
    }

    #[test]
    fn test_key_source_exclusivity() {
        let mut neither = config();
        neither.private_key = None;
        assert!(matches!(
            X509Source::new(neither, FakeTransport::new(body())).unwrap_err(),
            SessionError::Configuration { .. }
        ));

        let mut both = config();
        both.pkcs11 = Some(Pkcs11Config::default());
        assert!(matches!(
            X509Source::new(both, FakeTransport::new(body())).unwrap_err(),
            SessionError::Configuration { .. }
        ));
    }

    #[test]
    fn test_data_endpoint_rewritten_to_credential_endpoint() {
        assert_eq!(
            X509Source::normalize_endpoint("abc123-ats.iot.us-east-1.amazonaws.com"),
            "abc123.credentials.iot.us-east-1.amazonaws.com"
        );
        assert_eq!(
            X509Source::normalize_endpoint("abc123.credentials.iot.us-east-1.amazonaws.com"),
            "abc123.credentials.iot.us-east-1.amazonaws.com"
        );
    }

    #[tokio::test]
    async fn test_request_carries_role_alias_path_and_headers() {
        let transport = FakeTransport::new(body());
        let source = X509Source::new(config(), transport.clone()).unwrap();

        let snapshot = source.credentials().await.unwrap();
        assert_eq!(snapshot.access_key, "AKIDEXAMPLE");

        let requests = transport.requests.lock().unwrap();
        assert_eq!(
            requests[0].url.path(),
            "/role-aliases/device-role/credentials"
        );
        assert_eq!(requests[0].thing_name.as_deref(), Some("sensor-01"));
        assert!(requests[0].verify_peer);
        assert_eq!(requests[0].timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_missing_credentials_object_is_a_request_error() {
        let transport = FakeTransport::new(json!({"message": "forbidden"}));
        let source = X509Source::new(config(), transport).unwrap();
        let err = source.credentials().await.unwrap_err();
        assert!(matches!(err, SessionError::Request { .. }));
    }

    #[tokio::test]
    async fn test_identity_describes_the_device() {
        let source = X509Source::new(config(), FakeTransport::new(body())).unwrap();
        let identity = source.identity().await.unwrap();
        assert_eq!(identity.get("method").map(String::as_str), Some("x509"));
        assert_eq!(
            identity.get("role_alias").map(String::as_str),
            Some("device-role")
        );
        assert_eq!(
            identity.get("thing_name").map(String::as_str),
            Some("sensor-01")
        );
    }
}
