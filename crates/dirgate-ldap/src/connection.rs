//! Transport seam between the gateway and the directory server.
//!
//! [`LdapConnector`] opens a transport, [`LdapSession`] runs exactly one bind and the protocol
//! exchange on it. Both are traits so the broker and the operations above it can be exercised
//! without a live server.

use crate::config::DirectoryConfig;
use crate::Result;
use async_trait::async_trait;
use dirgate_core::error::Error;
use ldap3::exop::PasswordModify;
use ldap3::result::ExopResult;
use ldap3::{LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Result code the directory returns for a base DN that does not exist.
const NO_SUCH_OBJECT: u32 = 32;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
        }
    }
}

/// One attribute as delivered by the server: its type name and raw values in server order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    /// Attribute type name, spelled as the server spelled it.
    pub name: String,
    /// Values, binary ones stringified lossily.
    pub values: Vec<String>,
}

/// LDAP entry as returned by a search, before projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Raw attributes in delivery order. The same name may occur more than once.
    pub attributes: Vec<RawAttribute>,
}

impl LdapEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Appends a raw attribute.
    #[must_use]
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes.push(RawAttribute {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }
}

impl From<SearchEntry> for LdapEntry {
    fn from(entry: SearchEntry) -> Self {
        let text = entry
            .attrs
            .into_iter()
            .map(|(name, values)| RawAttribute { name, values });
        let binary = entry.bin_attrs.into_iter().map(|(name, values)| RawAttribute {
            name,
            values: values
                .iter()
                .map(|value| String::from_utf8_lossy(value).into_owned())
                .collect(),
        });
        Self {
            dn: entry.dn,
            attributes: text.chain(binary).collect(),
        }
    }
}

/// Single-attribute replace: create if absent, overwrite if present, clear if `values` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryModification {
    /// Attribute to replace.
    pub attribute: String,
    /// Replacement values.
    pub values: Vec<String>,
}

impl DirectoryModification {
    /// Replaces `attribute` with `value`, or clears it when `value` is `None`.
    #[must_use]
    pub fn replace(attribute: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            attribute: attribute.into(),
            values: value.map(str::to_owned).into_iter().collect(),
        }
    }
}

/// One live transport to the directory, owned by a single logical operation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapSession: Send {
    /// Authenticates the session.
    ///
    /// A transport failure is [`Error::ConnectError`]; a refused bind is
    /// [`Error::BindRejected`].
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Runs one search and collects every entry, or fails with [`Error::SearchError`].
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>>;

    /// Applies modifications to one entry, or fails with [`Error::MutationError`].
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;

    /// Sets a new credential through the Password Modify extended operation.
    async fn password_modify(&mut self, dn: &str, new_secret: &str) -> Result<()>;

    /// Graceful protocol unbind.
    async fn unbind(&mut self) -> Result<()>;

    /// Tears down the transport without a protocol exchange.
    fn close(&mut self);
}

/// Factory for [`LdapSession`]s.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Opens a transport to the first reachable configured endpoint.
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Real LDAP connector backed by `ldap3`.
pub struct RealLdapConnector {
    config: Arc<DirectoryConfig>,
}

impl RealLdapConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let config = Arc::clone(&self.config);
        let session = first_reachable(self.config.endpoints(), |url: &str| {
            let url = url.to_string();
            let config = Arc::clone(&config);
            async move {
                let settings = build_ldap_settings(&config)?;
                let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
                    .await
                    .map_err(|err| Error::ConnectError(format!("{url}: {err}")))?;
                let driver = tokio::spawn(async move {
                    if let Err(err) = conn.drive().await {
                        warn!("directory connection driver stopped: {err}");
                    }
                });
                debug!(endpoint = %url, "directory transport established");
                Ok(RealLdapSession {
                    inner: ldap,
                    driver: Some(driver),
                })
            }
        })
        .await?;
        Ok(Box::new(session))
    }
}

/// Dials `endpoints` in order and returns the first session that connects.
///
/// Only retryable failures move on to the next endpoint; anything else is returned at once.
async fn first_reachable<T, F, Fut>(endpoints: &[String], mut dial: F) -> Result<T>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;
    for endpoint in endpoints {
        match dial(endpoint).await {
            Ok(session) => return Ok(session),
            Err(err) if err.is_retryable() => {
                warn!(endpoint = %endpoint, "directory endpoint unreachable: {err}");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_error
        .unwrap_or_else(|| Error::ConnectError("no directory endpoint configured".to_string())))
}

/// Accumulates streamed search entries. The first error discards everything gathered.
#[derive(Default)]
struct EntryCollector {
    entries: Vec<LdapEntry>,
    failure: Option<Error>,
}

impl EntryCollector {
    /// Takes one step of the stream; returns false once it has ended or failed.
    fn accept<E: fmt::Display>(&mut self, step: std::result::Result<Option<LdapEntry>, E>) -> bool {
        match step {
            Ok(Some(entry)) => {
                self.entries.push(entry);
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.entries.clear();
                self.failure = Some(Error::SearchError(err.to_string()));
                false
            }
        }
    }

    fn finish(self) -> Result<Vec<LdapEntry>> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.entries),
        }
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    driver: Option<JoinHandle<()>>,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self
            .inner
            .simple_bind(dn, password)
            .await
            .map_err(|err| Error::ConnectError(err.to_string()))?;
        if result.rc != 0 {
            return Err(Error::BindRejected(format!(
                "{dn}: {} (rc={})",
                result.text, result.rc
            )));
        }
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>> {
        let mut stream = self
            .inner
            .streaming_search(base_dn, scope.into(), filter, attributes.to_vec())
            .await
            .map_err(|err| Error::SearchError(err.to_string()))?;

        let mut collector = EntryCollector::default();
        while collector.accept(
            stream
                .next()
                .await
                .map(|entry| entry.map(|entry| LdapEntry::from(SearchEntry::construct(entry)))),
        ) {}
        let result = stream.finish().await;
        let entries = collector.finish()?;

        check_result(base_dn, result.rc, &result.text, Error::SearchError)?;
        Ok(entries)
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|m| {
                Mod::Replace(
                    m.attribute.clone(),
                    m.values.iter().cloned().collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        let result = self
            .inner
            .modify(dn, mods)
            .await
            .map_err(|err| Error::MutationError(err.to_string()))?;
        check_result(dn, result.rc, &result.text, Error::MutationError)
    }

    async fn password_modify(&mut self, dn: &str, new_secret: &str) -> Result<()> {
        let exop = PasswordModify {
            user_id: Some(dn),
            old_pass: None,
            new_pass: Some(new_secret),
        };
        let ExopResult(_, result) = self
            .inner
            .extended(exop)
            .await
            .map_err(|err| Error::MutationError(err.to_string()))?;
        check_result(dn, result.rc, &result.text, Error::MutationError)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner
            .unbind()
            .await
            .map_err(|err| Error::ConnectError(format!("unbind failed: {err}")))
    }

    fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl Drop for RealLdapSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_result(dn: &str, rc: u32, text: &str, failure: fn(String) -> Error) -> Result<()> {
    match rc {
        0 => Ok(()),
        NO_SUCH_OBJECT => Err(Error::NotFound(dn.to_string())),
        _ => Err(failure(format!("{text} (rc={rc})"))),
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|err| {
            Error::ConfigError(format!("invalid directory CA certificate: {err}"))
        })?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}
