//! Role-assumption credential source.
//!
//! The remote call itself is behind the [`AssumeRoleApi`] collaborator;
//! this module owns parameter validation, the three MFA modalities
//! (static code, token command, token provider) and reshaping the raw
//! response into a snapshot.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SessionError};
use crate::core::snapshot::{CredentialSnapshot, RawCredentials};
use crate::source::{CredentialSource, Identity};

/// Default role session name when the caller does not supply one.
pub const DEFAULT_SESSION_NAME: &str = "default-session";

/// Produces a fresh MFA token code on each refresh.
///
/// Invoked once per credential fetch, so hardware tokens and TOTP apps
/// both work. The returned code must be a 6-digit string.
#[async_trait]
pub trait MfaTokenProvider: Send + Sync {
    /// Produce one fresh token code.
    async fn token_code(&self) -> Result<String>;
}

/// Runs a configured command and reads the token code from its stdout.
struct CommandTokenProvider {
    argv: Vec<String>,
}

#[async_trait]
impl MfaTokenProvider for CommandTokenProvider {
    async fn token_code(&self) -> Result<String> {
        // argv validated non-empty at construction
        let program = self
            .argv
            .first()
            .ok_or_else(|| SessionError::configuration("mfa_token_command is empty"))?;

        let output = tokio::process::Command::new(program)
            .args(&self.argv[1..])
            .output()
            .await
            .map_err(|err| {
                SessionError::configuration(format!(
                    "failed to run mfa_token_command '{program}': {err}"
                ))
            })?;

        if !output.status.success() {
            return Err(SessionError::configuration(format!(
                "mfa_token_command '{program}' exited with {}",
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Parameters for the remote assume-role call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssumeRoleRequest {
    /// Role to assume
    pub role_arn: String,
    /// Session name attached to the assumed role
    pub session_name: String,
    /// Requested credential lifetime in seconds
    pub duration_seconds: Option<u32>,
    /// External ID expected by the role's trust policy
    pub external_id: Option<String>,
    /// Inline session policy document
    pub policy: Option<String>,
    /// MFA device serial number
    pub mfa_serial: Option<String>,
    /// MFA token code for this call
    pub mfa_token_code: Option<String>,
}

/// Performs the remote assume-role and caller-identity calls.
#[async_trait]
pub trait AssumeRoleApi: Send + Sync {
    /// Assume the role and return the raw credential fields.
    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<RawCredentials>;

    /// Look up the identity the current credentials act as.
    async fn caller_identity(&self) -> Result<Identity>;
}

/// Role-assumption configuration.
///
/// All fields except `role_arn` are optional. MFA accepts exactly one
/// token input: a static `mfa_token_code`, an `mfa_token_command` argv,
/// or a programmatic `mfa_token_provider`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssumeRoleConfig {
    /// Role to assume (required)
    pub role_arn: String,

    /// Session name; defaults to [`DEFAULT_SESSION_NAME`]
    pub session_name: Option<String>,

    /// Requested credential lifetime in seconds
    pub duration_seconds: Option<u32>,

    /// External ID expected by the role's trust policy
    pub external_id: Option<String>,

    /// Inline session policy document
    pub policy: Option<String>,

    /// MFA device serial number
    pub mfa_serial: Option<String>,

    /// Static MFA token code. The caller owns rotating it.
    pub mfa_token_code: Option<String>,

    /// Command (argv) producing a fresh token code per refresh
    pub mfa_token_command: Option<Vec<String>>,

    /// Programmatic token provider, invoked per refresh
    #[serde(skip)]
    pub mfa_token_provider: Option<Arc<dyn MfaTokenProvider>>,
}

impl fmt::Debug for AssumeRoleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleConfig")
            .field("role_arn", &self.role_arn)
            .field("session_name", &self.session_name)
            .field("duration_seconds", &self.duration_seconds)
            .field("external_id", &self.external_id)
            .field("mfa_serial", &self.mfa_serial)
            .field("has_token_code", &self.mfa_token_code.is_some())
            .field("has_token_command", &self.mfa_token_command.is_some())
            .field("has_token_provider", &self.mfa_token_provider.is_some())
            .finish()
    }
}

/// Credential source that assumes a role through [`AssumeRoleApi`].
pub struct AssumeRoleSource {
    request: AssumeRoleRequest,
    provider: Option<Arc<dyn MfaTokenProvider>>,
    api: Arc<dyn AssumeRoleApi>,
}

impl fmt::Debug for AssumeRoleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleSource")
            .field("request", &self.request)
            .field("has_provider", &self.provider.is_some())
            .finish_non_exhaustive()
    }
}

impl AssumeRoleSource {
    /// Validate the configuration and build the source. No network I/O.
    ///
    /// # Errors
    ///
    /// [`SessionError::Validation`] for a missing `role_arn`,
    /// [`SessionError::Configuration`] for incompatible MFA parameters.
    pub fn new(config: AssumeRoleConfig, api: Arc<dyn AssumeRoleApi>) -> Result<Self> {
        if config.role_arn.trim().is_empty() {
            return Err(SessionError::validation(
                "role_arn",
                "must be provided for role assumption",
            ));
        }

        let session_name = match config.session_name {
            Some(name) => name,
            None => {
                tracing::warn!(
                    default = DEFAULT_SESSION_NAME,
                    "session_name not provided, using default"
                );
                DEFAULT_SESSION_NAME.to_string()
            }
        };

        let mut provider = config.mfa_token_provider;
        if let Some(argv) = config.mfa_token_command {
            if provider.is_some() {
                return Err(SessionError::configuration(
                    "only one of 'mfa_token_provider' and 'mfa_token_command' may be set",
                ));
            }
            if argv.is_empty() {
                return Err(SessionError::configuration(
                    "'mfa_token_command' must name a program to run",
                ));
            }
            provider = Some(Arc::new(CommandTokenProvider { argv }));
        }

        if provider.is_some() {
            if config.mfa_serial.is_none() {
                return Err(SessionError::configuration(
                    "'mfa_serial' must be provided when an MFA token source is set",
                ));
            }
            if config.mfa_token_code.is_some() {
                tracing::warn!(
                    "static 'mfa_token_code' is ignored and overridden by the \
                     token provider on each refresh"
                );
            }
        } else {
            // Without a dynamic token source, serial and static code go
            // together or not at all.
            match (&config.mfa_serial, &config.mfa_token_code) {
                (Some(_), None) | (None, Some(_)) => {
                    return Err(SessionError::configuration(
                        "'mfa_serial' and 'mfa_token_code' must both be provided \
                         when no MFA token provider is set",
                    ));
                }
                _ => {}
            }
        }

        Ok(Self {
            request: AssumeRoleRequest {
                role_arn: config.role_arn,
                session_name,
                duration_seconds: config.duration_seconds,
                external_id: config.external_id,
                policy: config.policy,
                mfa_serial: config.mfa_serial,
                mfa_token_code: config.mfa_token_code,
            },
            provider,
            api,
        })
    }

    fn validate_token_code(code: &str) -> Result<()> {
        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionError::validation(
                "mfa_token_code",
                "must be a 6-digit string",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialSource for AssumeRoleSource {
    fn method(&self) -> &'static str {
        "assume_role"
    }

    async fn credentials(&self) -> Result<CredentialSnapshot> {
        let mut request = self.request.clone();

        if let Some(provider) = &self.provider {
            request.mfa_token_code = Some(provider.token_code().await?);
        }

        // Token codes from any modality are validated per refresh, since
        // providers mint a new one each time.
        if let Some(code) = &request.mfa_token_code {
            Self::validate_token_code(code)?;
        }

        let raw = self.api.assume_role(&request).await?;
        raw.into_snapshot(self.method())
    }

    async fn identity(&self) -> Result<Identity> {
        self.api.caller_identity().await
    }
}
