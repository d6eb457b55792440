//! Settings the directory side needs, distilled from [`GatewayConfig`].

use crate::schema::canonical_names;
use crate::Result;
use dirgate_core::config::{
    CredentialMechanismKind, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS,
};
use dirgate_core::error::Error;
use dirgate_core::GatewayConfig;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// A bind DN and its password.
#[derive(Debug, Clone)]
pub struct BindCredentials {
    dn: String,
    password: SecretString,
}

impl BindCredentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(dn: impl Into<String>, password: SecretString) -> Self {
        Self {
            dn: dn.into(),
            password,
        }
    }

    /// Bind DN.
    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Bind password.
    #[must_use]
    pub const fn password(&self) -> &SecretString {
        &self.password
    }
}

/// How a new credential reaches the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialMechanism {
    /// LDAP Password Modify extended operation under the read-write identity
    PasswordModify,
    /// External program; the DN is appended to `args` and the secret goes to stdin
    Command {
        /// Executable
        program: PathBuf,
        /// Leading arguments
        args: Vec<String>,
    },
}

/// Directory-side configuration.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    endpoints: Vec<String>,
    read_only: BindCredentials,
    read_write: BindCredentials,
    mutable_attributes: Vec<String>,
    allow_credential_change: bool,
    expose_credentials: bool,
    mechanism: CredentialMechanism,
    tls_verify: bool,
    ca_cert: Option<PathBuf>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
}

impl DirectoryConfig {
    /// Creates a configuration for a single endpoint with an empty allow-list.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided URL is invalid.
    pub fn new(
        url: impl Into<String>,
        read_only: BindCredentials,
        read_write: BindCredentials,
    ) -> Result<Self> {
        let url = url.into();
        Url::parse(&url)?;

        Ok(Self {
            endpoints: vec![url],
            read_only,
            read_write,
            mutable_attributes: Vec::new(),
            allow_credential_change: false,
            expose_credentials: false,
            mechanism: CredentialMechanism::PasswordModify,
            tls_verify: true,
            ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        })
    }

    /// Endpoints in connect order.
    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Identity used for searches.
    #[must_use]
    pub const fn read_only(&self) -> &BindCredentials {
        &self.read_only
    }

    /// Identity used for modifications.
    #[must_use]
    pub const fn read_write(&self) -> &BindCredentials {
        &self.read_write
    }

    /// Returns true if `name` is on the allow-list (case-insensitive).
    #[must_use]
    pub fn is_mutable(&self, name: &str) -> bool {
        self.mutable_attributes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(name))
    }

    /// Whether credential changes are permitted.
    #[must_use]
    pub const fn allow_credential_change(&self) -> bool {
        self.allow_credential_change
    }

    /// Whether reads include the credential attribute.
    #[must_use]
    pub const fn expose_credentials(&self) -> bool {
        self.expose_credentials
    }

    /// Credential change mechanism.
    #[must_use]
    pub const fn mechanism(&self) -> &CredentialMechanism {
        &self.mechanism
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn ca_cert(&self) -> Option<&Path> {
        self.ca_cert.as_deref()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Per-operation bound, `None` when operations may wait indefinitely.
    #[must_use]
    pub const fn operation_timeout(&self) -> Option<Duration> {
        match self.operation_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Appends a fallback endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided URL is invalid.
    pub fn with_fallback(mut self, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        Url::parse(&url)?;
        self.endpoints.push(url);
        Ok(self)
    }

    /// Replaces the allow-list, canonicalizing every name against the attribute schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if a name is not in the schema.
    pub fn with_mutable_attributes<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.mutable_attributes = canonical_names(names)?;
        Ok(self)
    }

    /// Enables or disables credential changes.
    #[must_use]
    pub const fn with_credential_change(mut self, allowed: bool) -> Self {
        self.allow_credential_change = allowed;
        self
    }

    /// Includes or hides the credential attribute on reads.
    #[must_use]
    pub const fn with_exposed_credentials(mut self, exposed: bool) -> Self {
        self.expose_credentials = exposed;
        self
    }

    /// Selects the credential change mechanism.
    #[must_use]
    pub fn with_mechanism(mut self, mechanism: CredentialMechanism) -> Self {
        self.mechanism = mechanism;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_ca_cert(mut self, path: PathBuf) -> Self {
        self.ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds (0 = unbounded).
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}

impl TryFrom<&GatewayConfig> for DirectoryConfig {
    type Error = Error;

    fn try_from(config: &GatewayConfig) -> Result<Self> {
        let bind = &config.bind;
        let read_only = BindCredentials::new(&bind.read_only_dn, bind.read_only_password.clone());
        let read_write =
            BindCredentials::new(&bind.read_write_dn, bind.read_write_password.clone());

        let mut directory = Self::new(&config.connect.primary, read_only, read_write)?;
        if let Some(secondary) = &config.connect.secondary {
            directory = directory.with_fallback(secondary)?;
        }

        let mechanism = match config.credential_change.mechanism {
            CredentialMechanismKind::Exop => CredentialMechanism::PasswordModify,
            CredentialMechanismKind::Command => {
                let (program, args) = config.credential_change.command_line().ok_or_else(|| {
                    Error::ConfigError("credential_change.command is empty".to_string())
                })?;
                CredentialMechanism::Command { program, args }
            }
        };

        let mut directory = directory
            .with_mutable_attributes(&config.api.mutable_attributes)?
            .with_credential_change(config.api.allow_password_change)
            .with_exposed_credentials(config.api.expose_user_password)
            .with_mechanism(mechanism)
            .with_tls_verification(config.connect.tls_verify)
            .with_connection_timeout_secs(config.connect.connection_timeout_secs)
            .with_operation_timeout_secs(config.connect.operation_timeout_secs);
        if let Some(ca_cert) = &config.connect.ca_cert {
            directory = directory.with_ca_cert(ca_cert.clone());
        }
        Ok(directory)
    }
}
