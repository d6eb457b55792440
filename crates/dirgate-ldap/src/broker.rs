//! Connection broker: connect, bind, and release sessions.
//!
//! Callers follow one shape for every operation:
//!
//! ```text
//! let mut session = broker.acquire(identity).await?;
//! let outcome = broker.bounded("search", session.search(..)).await;
//! broker.release(session).await;
//! outcome
//! ```
//!
//! [`ConnectionBroker::release`] consumes the session, so a session cannot be released twice or
//! reused after release.

use crate::config::{BindCredentials, DirectoryConfig};
use crate::connection::{LdapConnector, LdapSession};
use crate::Result;
use dirgate_core::error::Error;
use secrecy::ExposeSecret;
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Which configured identity a session binds as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindIdentity {
    /// Searches
    ReadOnly,
    /// Modifications and credential changes
    ReadWrite,
}

/// Hands out bound sessions and tears them down.
pub struct ConnectionBroker {
    config: Arc<DirectoryConfig>,
    connector: Arc<dyn LdapConnector>,
}

impl ConnectionBroker {
    /// Creates a broker over `connector`.
    #[must_use]
    pub fn new(config: Arc<DirectoryConfig>, connector: Arc<dyn LdapConnector>) -> Self {
        Self { config, connector }
    }

    /// Directory configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn credentials(&self, identity: BindIdentity) -> &BindCredentials {
        match identity {
            BindIdentity::ReadOnly => self.config.read_only(),
            BindIdentity::ReadWrite => self.config.read_write(),
        }
    }

    /// Connects and binds as `identity`.
    ///
    /// If the bind fails the session is released before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectError`] when no endpoint is reachable and
    /// [`Error::BindRejected`] when the directory refuses the credentials.
    pub async fn acquire(&self, identity: BindIdentity) -> Result<Box<dyn LdapSession>> {
        let mut session = self.connector.connect().await?;
        let credentials = self.credentials(identity);

        let bound = self
            .bounded(
                "bind",
                session.simple_bind(credentials.dn(), credentials.password().expose_secret()),
            )
            .await;

        match bound {
            Ok(()) => {
                debug!(?identity, "directory session bound");
                Ok(session)
            }
            Err(err) => {
                self.release(session).await;
                Err(err)
            }
        }
    }

    /// Unbinds, falling back to a forced close when the unbind fails.
    pub async fn release(&self, mut session: Box<dyn LdapSession>) {
        if let Err(err) = self.bounded("unbind", session.unbind()).await {
            warn!("directory unbind failed, closing transport: {err}");
            session.close();
        }
    }

    /// Applies the configured operation timeout to `fut`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the bound expires, otherwise whatever `fut` returns.
    pub async fn bounded<F, T>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.operation_timeout() {
            Some(limit) => timeout(limit, fut).await.map_err(|_| {
                Error::Timeout(format!(
                    "directory {operation} exceeded {}s",
                    limit.as_secs()
                ))
            })?,
            None => fut.await,
        }
    }
}
