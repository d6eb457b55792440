//! Gateway configuration.
//!
//! The configuration is read once at startup from an INI file (plus `DIRGATE__SECTION__KEY`
//! environment overrides), validated, and then shared read-only by every component.

use crate::error::{Error, Result};
use crate::policy::CREDENTIAL_ATTRIBUTE;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;
use validator::{Validate, ValidationError};

/// Directory endpoint used when `[connect] primary` is not set.
pub const DEFAULT_PRIMARY_URL: &str = "ldap://127.0.0.1:389";
/// Default plaintext listener port.
pub const DEFAULT_HTTP_PORT: u16 = 3269;
/// Default TLS listener port.
pub const DEFAULT_HTTPS_PORT: u16 = 3443;
/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default per-operation timeout (seconds). Zero disables the bound.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

const ENV_PREFIX: &str = "DIRGATE";

/// Complete gateway configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Directory endpoints and transport settings
    #[validate(nested)]
    pub connect: ConnectSection,

    /// Bind identities used against the directory
    pub bind: BindSection,

    /// Caller-facing policy
    #[serde(default)]
    pub api: ApiSection,

    /// Layout hints for the UI
    #[serde(default)]
    pub structure: StructureSection,

    /// HTTP listeners
    #[validate(nested)]
    #[serde(default)]
    pub listen: ListenSection,

    /// Credential change mechanism
    #[serde(default)]
    pub credential_change: CredentialChangeSection,
}

impl GatewayConfig {
    /// Loads the configuration from an INI file with environment overrides.
    ///
    /// A missing file is not fatal on its own: every value may come from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the sources cannot be parsed or fail validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut builder = config::Config::builder();

        if path.is_file() {
            builder = builder.add_source(File::from(path).format(FileFormat::Ini));
        } else {
            warn!(
                "configuration file {} not found, using environment only",
                path.display()
            );
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
        Self::try_from(builder)
    }

    fn check_consistency(&self) -> Result<()> {
        if self.credential_change.mechanism == CredentialMechanismKind::Command
            && self.credential_change.command_line().is_none()
        {
            return Err(Error::ConfigError(
                "credential_change.command is required when mechanism = command".to_string(),
            ));
        }

        if self.listen.tls_cert.is_some() != self.listen.tls_key.is_some() {
            return Err(Error::ConfigError(
                "listen.tls_cert and listen.tls_key must be set together".to_string(),
            ));
        }

        if self.api.allow_password_change
            && !self
                .api
                .mutable_attributes
                .iter()
                .any(|name| name.eq_ignore_ascii_case(CREDENTIAL_ATTRIBUTE))
        {
            warn!(
                "api.allow_password_change is set but {CREDENTIAL_ATTRIBUTE} is not in \
                 api.mutable_attributes; password changes will be rejected"
            );
        }

        if !self.api.anonymous_write && self.api.boundary_credential().is_none() {
            warn!("anonymous writes are disabled and no API credential is configured; all writes will be rejected");
        }

        Ok(())
    }
}

impl TryFrom<ConfigBuilder<DefaultState>> for GatewayConfig {
    type Error = Error;

    fn try_from(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder
            .set_default("connect.primary", DEFAULT_PRIMARY_URL)?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        config.check_consistency()?;
        Ok(config)
    }
}

/// `[connect]` section.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConnectSection {
    /// Primary directory URL
    #[validate(custom(function = "validate_ldap_url"))]
    pub primary: String,

    /// Fallback directory URL, tried when the primary cannot be reached
    #[validate(custom(function = "validate_ldap_url"))]
    #[serde(default, deserialize_with = "empty_as_none")]
    pub secondary: Option<String>,

    /// Root of the directory tree
    #[serde(default)]
    pub base_dn: String,

    /// Whether to verify the directory's TLS certificate
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// Optional CA certificate for `ldaps://` endpoints
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub ca_cert: Option<PathBuf>,

    /// Transport connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds (0 = wait indefinitely)
    #[validate(range(max = 3600))]
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

/// `[bind]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BindSection {
    /// DN used for searches
    pub read_only_dn: String,
    /// Password for the read-only DN
    pub read_only_password: SecretString,
    /// DN used for modifications
    pub read_write_dn: String,
    /// Password for the read-write DN
    pub read_write_password: SecretString,
}

/// `[api]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    /// Basic-auth user accepted at the gateway boundary
    #[serde(default, deserialize_with = "empty_as_none")]
    pub read_write_user: Option<String>,

    /// Basic-auth password accepted at the gateway boundary
    #[serde(default)]
    pub read_write_password: Option<SecretString>,

    /// Bearer token accepted at the gateway boundary (takes precedence over Basic)
    #[serde(default)]
    pub token: Option<SecretString>,

    /// Allow reads without a credential
    #[serde(default = "default_true")]
    pub anonymous_read: bool,

    /// Allow writes without a credential
    #[serde(default)]
    pub anonymous_write: bool,

    /// Attributes that may be modified
    #[serde(default = "default_mutable_attributes", deserialize_with = "csv")]
    pub mutable_attributes: Vec<String>,

    /// Allow `userPassword` changes through the credential-change path
    #[serde(default)]
    pub allow_password_change: bool,

    /// Include `userPassword` in entry reads
    #[serde(default)]
    pub expose_user_password: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            read_write_user: None,
            read_write_password: None,
            token: None,
            anonymous_read: true,
            anonymous_write: false,
            mutable_attributes: default_mutable_attributes(),
            allow_password_change: false,
            expose_user_password: false,
        }
    }
}

impl ApiSection {
    /// The exact `Authorization` header value callers must present, if any is configured.
    #[must_use]
    pub fn boundary_credential(&self) -> Option<SecretString> {
        let token = self
            .token
            .as_ref()
            .filter(|token| !token.expose_secret().is_empty());
        if let Some(token) = token {
            return Some(SecretString::from(format!(
                "Bearer {}",
                token.expose_secret()
            )));
        }

        match (&self.read_write_user, &self.read_write_password) {
            (Some(user), Some(password)) => {
                let encoded =
                    STANDARD.encode(format!("{user}:{}", password.expose_secret()).as_bytes());
                Some(SecretString::from(format!("Basic {encoded}")))
            }
            _ => None,
        }
    }
}

/// `[structure]` section, served verbatim to the UI.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct StructureSection {
    /// Tree root
    #[serde(default, rename(serialize = "baseDN"))]
    pub base_dn: String,
    /// Container holding user accounts
    #[serde(default, rename(serialize = "userDN"))]
    pub user_dn: String,
    /// Container holding groups
    #[serde(default, rename(serialize = "groupDN"))]
    pub group_dn: String,
}

/// `[listen]` section.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ListenSection {
    /// Bind address for both listeners
    #[serde(default = "default_address")]
    pub address: IpAddr,

    /// Plaintext port
    #[validate(range(min = 1))]
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// TLS port
    #[validate(range(min = 1))]
    #[serde(default = "default_https_port")]
    pub https_port: u16,

    /// PEM certificate chain for the TLS listener
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub tls_cert: Option<PathBuf>,

    /// PEM PKCS#8 private key for the TLS listener
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub tls_key: Option<PathBuf>,

    /// Directory holding the static UI
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ListenSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            http_port: DEFAULT_HTTP_PORT,
            https_port: DEFAULT_HTTPS_PORT,
            tls_cert: None,
            tls_key: None,
            static_dir: default_static_dir(),
        }
    }
}

impl ListenSection {
    /// Socket address of the plaintext listener.
    #[must_use]
    pub const fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.http_port)
    }

    /// Socket address of the TLS listener.
    #[must_use]
    pub const fn https_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.https_port)
    }

    /// Certificate and key paths, when both are configured.
    #[must_use]
    pub fn tls_material(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

/// How credential changes reach the directory.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialMechanismKind {
    /// LDAP Password Modify extended operation (RFC 3062)
    #[default]
    Exop,
    /// External administrative program
    Command,
}

/// `[credential_change]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialChangeSection {
    /// Mechanism selector
    #[serde(default)]
    pub mechanism: CredentialMechanismKind,

    /// Program and arguments for the `command` mechanism
    #[serde(default, deserialize_with = "empty_as_none")]
    pub command: Option<String>,
}

impl CredentialChangeSection {
    /// Splits `command` into the program and its leading arguments.
    #[must_use]
    pub fn command_line(&self) -> Option<(PathBuf, Vec<String>)> {
        let mut parts = self.command.as_deref()?.split_whitespace();
        let program = PathBuf::from(parts.next()?);
        Some((program, parts.map(str::to_owned).collect()))
    }
}

fn validate_ldap_url(value: &str) -> std::result::Result<(), ValidationError> {
    let url = Url::parse(value).map_err(|_| ValidationError::new("invalid_url"))?;
    match url.scheme() {
        "ldap" | "ldaps" | "ldapi" => Ok(()),
        _ => Err(ValidationError::new("unsupported_scheme")),
    }
}

/// Parses a comma-separated list, dropping blanks.
fn csv<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(String::deserialize(deserializer)?
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(Into::into)
        .collect())
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|value| !value.trim().is_empty()))
}

fn empty_path_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(empty_as_none(deserializer)?.map(PathBuf::from))
}

fn default_mutable_attributes() -> Vec<String> {
    [
        "description",
        "displayName",
        "givenName",
        "initials",
        "sn",
        "mail",
        "homeDirectory",
        "gidNumber",
        "memberUid",
        CREDENTIAL_ATTRIBUTE,
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

const fn default_true() -> bool {
    true
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

const fn default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

const fn default_https_port() -> u16 {
    DEFAULT_HTTPS_PORT
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("client")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIND: &str = r"
[bind]
read_only_dn = cn=readonly,dc=example,dc=com
read_only_password = ro-secret
read_write_dn = cn=admin,dc=example,dc=com
read_write_password = rw-secret
";

    const MINIMAL: &str = r"
[connect]
base_dn = dc=example,dc=com

[bind]
read_only_dn = cn=readonly,dc=example,dc=com
read_only_password = ro-secret
read_write_dn = cn=admin,dc=example,dc=com
read_write_password = rw-secret
";

    fn load(ini: &str) -> Result<GatewayConfig> {
        let builder = config::Config::builder().add_source(File::from_str(ini, FileFormat::Ini));
        GatewayConfig::try_from(builder)
    }

    #[test]
    fn test_defaults() {
        let config = load(MINIMAL).unwrap();
        assert_eq!(config.connect.primary, DEFAULT_PRIMARY_URL);
        assert!(config.connect.secondary.is_none());
        assert!(config.api.anonymous_read);
        assert!(!config.api.anonymous_write);
        assert!(!config.api.allow_password_change);
        assert!(!config.api.expose_user_password);
        assert!(config.api.boundary_credential().is_none());
        assert_eq!(config.listen.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.listen.https_port, DEFAULT_HTTPS_PORT);
        assert!(config.listen.tls_material().is_none());
        assert_eq!(config.connect.operation_timeout_secs, 30);
        assert_eq!(
            config.credential_change.mechanism,
            CredentialMechanismKind::Exop
        );
        assert!(!config
            .api
            .mutable_attributes
            .iter()
            .any(|name| name == "uidNumber"));
    }

    #[test]
    fn test_full_file() {
        let ini = format!(
            "{BIND}
[connect]
base_dn = dc=example,dc=com
primary = ldaps://ldap1.example.com
secondary = ldap://ldap2.example.com:389
tls_verify = false
operation_timeout_secs = 0

[api]
read_write_user = admin
read_write_password = s3cret
anonymous_read = false
anonymous_write = false
mutable_attributes = mail, homeDirectory ,description
allow_password_change = true

[structure]
base_dn = dc=example,dc=com
user_dn = ou=People,dc=example,dc=com
group_dn = ou=Groups,dc=example,dc=com

[listen]
http_port = 8080
https_port = 8443
tls_cert = /etc/dirgate/cert.pem
tls_key = /etc/dirgate/key.pem

[credential_change]
mechanism = command
command = /usr/local/sbin/setpass --quiet
"
        );
        let config = load(&ini).unwrap();

        assert_eq!(config.connect.primary, "ldaps://ldap1.example.com");
        assert_eq!(
            config.connect.secondary.as_deref(),
            Some("ldap://ldap2.example.com:389")
        );
        assert!(!config.connect.tls_verify);
        assert_eq!(config.connect.operation_timeout_secs, 0);
        assert_eq!(
            config.api.mutable_attributes,
            vec!["mail", "homeDirectory", "description"]
        );
        assert!(!config.api.anonymous_read);
        assert_eq!(config.structure.user_dn, "ou=People,dc=example,dc=com");
        assert_eq!(config.listen.http_addr().port(), 8080);
        assert!(config.listen.tls_material().is_some());

        let (program, args) = config.credential_change.command_line().unwrap();
        assert_eq!(program, PathBuf::from("/usr/local/sbin/setpass"));
        assert_eq!(args, vec!["--quiet".to_string()]);
    }

    #[test]
    fn test_basic_boundary_credential() {
        let ini = format!("{MINIMAL}\n[api]\nread_write_user = admin\nread_write_password = s3cret\n");
        let config = load(&ini).unwrap();
        let credential = config.api.boundary_credential().unwrap();
        // base64("admin:s3cret")
        assert_eq!(credential.expose_secret(), "Basic YWRtaW46czNjcmV0");
    }

    #[test]
    fn test_bearer_takes_precedence() {
        let ini = format!(
            "{MINIMAL}\n[api]\nread_write_user = admin\nread_write_password = s3cret\ntoken = abc123\n"
        );
        let config = load(&ini).unwrap();
        assert_eq!(
            config.api.boundary_credential().unwrap().expose_secret(),
            "Bearer abc123"
        );
    }

    #[test]
    fn test_rejects_non_ldap_url() {
        let ini = format!("{BIND}\n[connect]\nprimary = https://example.com\n");
        assert!(matches!(load(&ini), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_command_mechanism_requires_command() {
        let ini = format!("{MINIMAL}\n[credential_change]\nmechanism = command\n");
        assert!(matches!(load(&ini), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_tls_material_must_be_paired() {
        let ini = format!("{MINIMAL}\n[listen]\ntls_cert = /tmp/cert.pem\n");
        assert!(matches!(load(&ini), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_missing_bind_section() {
        let ini = "[connect]\nbase_dn = dc=example,dc=com\n";
        assert!(matches!(load(ini), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_structure_serializes_with_ui_keys() {
        let structure = StructureSection {
            base_dn: "dc=example,dc=com".into(),
            user_dn: "ou=People,dc=example,dc=com".into(),
            group_dn: "ou=Groups,dc=example,dc=com".into(),
        };
        let json = serde_json::to_value(&structure).unwrap();
        assert_eq!(json["baseDN"], "dc=example,dc=com");
        assert_eq!(json["userDN"], "ou=People,dc=example,dc=com");
        assert_eq!(json["groupDN"], "ou=Groups,dc=example,dc=com");
    }
}
