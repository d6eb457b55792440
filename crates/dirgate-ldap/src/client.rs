//! Directory operations: tree navigation, entry reads and single-attribute mutation.

use crate::broker::{BindIdentity, ConnectionBroker};
use crate::config::{CredentialMechanism, DirectoryConfig};
use crate::connection::{DirectoryModification, LdapConnector, RealLdapConnector, SearchScope};
use crate::credential::{CommandCredentialChanger, CredentialChangePort, PasswordModifyChanger};
use crate::dn::DistinguishedName;
use crate::entry::{DirectoryEntry, SubordinateSummary};
use crate::schema::{canonical_name, AttributeSchema};
use crate::Result;
use dirgate_core::error::Error;
use dirgate_core::CREDENTIAL_ATTRIBUTE;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::debug;

const ANY_ENTRY_FILTER: &str = "(objectClass=*)";

/// Gateway's view of the directory.
///
/// Every call opens its own session, runs one protocol exchange and releases the session before
/// returning, on success and failure alike.
pub struct DirectoryClient {
    broker: Arc<ConnectionBroker>,
    schema: AttributeSchema,
    credentials: Arc<dyn CredentialChangePort>,
}

impl DirectoryClient {
    /// Creates a client that uses the real LDAP connector.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        let connector: Arc<dyn LdapConnector> = Arc::new(RealLdapConnector::new(config.clone()));
        Self::from_parts(config, connector)
    }

    /// Creates a client over a custom connector.
    #[must_use]
    pub fn with_connector(config: DirectoryConfig, connector: Arc<dyn LdapConnector>) -> Self {
        Self::from_parts(Arc::new(config), connector)
    }

    fn from_parts(config: Arc<DirectoryConfig>, connector: Arc<dyn LdapConnector>) -> Self {
        let schema = AttributeSchema::new(config.expose_credentials());
        let broker = Arc::new(ConnectionBroker::new(config.clone(), connector));
        let credentials: Arc<dyn CredentialChangePort> = match config.mechanism() {
            CredentialMechanism::PasswordModify => {
                Arc::new(PasswordModifyChanger::new(broker.clone()))
            }
            CredentialMechanism::Command { program, args } => Arc::new(
                CommandCredentialChanger::new(program.clone(), args.clone())
                    .with_timeout(config.operation_timeout()),
            ),
        };
        Self {
            broker,
            schema,
            credentials,
        }
    }

    /// Replaces the credential change mechanism.
    #[must_use]
    pub fn with_credential_port(mut self, port: Arc<dyn CredentialChangePort>) -> Self {
        self.credentials = port;
        self
    }

    /// Directory configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        self.broker.config()
    }

    /// Lists the direct children of `base`, in the order the directory returns them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectError`] / [`Error::BindRejected`] if no session can be opened and
    /// [`Error::SearchError`] if the search fails; partial results are discarded.
    pub async fn list_children(&self, base: &DistinguishedName) -> Result<Vec<SubordinateSummary>> {
        let attributes = vec!["objectClass".to_string(), "description".to_string()];

        let mut session = self.broker.acquire(BindIdentity::ReadOnly).await?;
        let outcome = self
            .broker
            .bounded(
                "search",
                session.search(
                    base.as_str(),
                    SearchScope::OneLevel,
                    ANY_ENTRY_FILTER,
                    &attributes,
                ),
            )
            .await;
        self.broker.release(session).await;

        let entries = outcome?;
        debug!(base = %base, children = entries.len(), "listed subordinates");
        Ok(entries
            .iter()
            .map(|entry| self.schema.summarize(entry))
            .collect())
    }

    /// Reads one entry, optionally only if it carries `class` as an object class.
    ///
    /// Returns `Ok(None)` when the base-scope search yields nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the DN does not exist in the directory, plus the
    /// connection and search errors of [`DirectoryClient::list_children`].
    pub async fn read_entry(
        &self,
        dn: &DistinguishedName,
        class: Option<&str>,
    ) -> Result<Option<DirectoryEntry>> {
        let filter = class.map_or_else(
            || ANY_ENTRY_FILTER.to_string(),
            |class| format!("(objectClass={})", escape_filter_value(class)),
        );
        let attributes = self.schema.attribute_names();

        let mut session = self.broker.acquire(BindIdentity::ReadOnly).await?;
        let outcome = self
            .broker
            .bounded(
                "search",
                session.search(dn.as_str(), SearchScope::Base, &filter, &attributes),
            )
            .await;
        self.broker.release(session).await;

        Ok(outcome?
            .first()
            .map(|entry| self.schema.project(entry)))
    }

    /// Sets one attribute of `dn`, or clears it when `value` is `None` or empty.
    ///
    /// The credential attribute is routed to the credential change port and never replaced
    /// directly. Allow-list and credential-flag checks happen before any connection is opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AttributeNotAllowed`], [`Error::CredentialChangeForbidden`],
    /// [`Error::MutationError`] or a connection error.
    pub async fn set_attribute(
        &self,
        dn: &DistinguishedName,
        name: &str,
        value: Option<&str>,
    ) -> Result<DistinguishedName> {
        let config = self.broker.config();
        let attribute = canonical_name(name)
            .filter(|_| config.is_mutable(name))
            .ok_or_else(|| Error::AttributeNotAllowed(name.to_string()))?;
        let value = value.filter(|value| !value.is_empty());

        if attribute == CREDENTIAL_ATTRIBUTE {
            if !config.allow_credential_change() {
                return Err(Error::CredentialChangeForbidden(
                    "password changes are disabled".to_string(),
                ));
            }
            let secret = value.ok_or_else(|| {
                Error::InvalidRequest("a new password must not be empty".to_string())
            })?;
            self.credentials
                .change_credential(dn, &SecretString::from(secret.to_string()))
                .await?;
            return Ok(dn.clone());
        }

        let modification = DirectoryModification::replace(attribute, value);
        let mut session = self.broker.acquire(BindIdentity::ReadWrite).await?;
        let outcome = self
            .broker
            .bounded("modify", session.modify(dn.as_str(), &[modification]))
            .await;
        self.broker.release(session).await;

        outcome?;
        debug!(dn = %dn, attribute, cleared = value.is_none(), "attribute replaced");
        Ok(dn.clone())
    }
}

fn escape_filter_value(value: &str) -> String {
    value
        .chars()
        .flat_map(|ch| match ch {
            '*' => "\\2a".chars().collect::<Vec<_>>(),
            '(' => "\\28".chars().collect(),
            ')' => "\\29".chars().collect(),
            '\\' => "\\5c".chars().collect(),
            '\0' => "\\00".chars().collect(),
            _ => vec![ch],
        })
        .collect::<String>()
}
