//! Out-of-band credential changes.
//!
//! Credentials are never written with a plain attribute replace. They go through a
//! [`CredentialChangePort`], which is either the Password Modify extended operation
//! ([`PasswordModifyChanger`]) or an administrative program ([`CommandCredentialChanger`]).

use crate::broker::{BindIdentity, ConnectionBroker};
use crate::dn::DistinguishedName;
use crate::Result;
use async_trait::async_trait;
use dirgate_core::error::Error;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

/// Changes the credential of one entry.
#[async_trait]
pub trait CredentialChangePort: Send + Sync {
    /// Sets `secret` as the new credential of `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutationError`] when the mechanism fails to run or reports failure.
    async fn change_credential(&self, dn: &DistinguishedName, secret: &SecretString)
        -> Result<()>;
}

/// Uses the Password Modify extended operation under the read-write identity.
pub struct PasswordModifyChanger {
    broker: Arc<ConnectionBroker>,
}

impl PasswordModifyChanger {
    /// Creates a changer that borrows sessions from `broker`.
    #[must_use]
    pub fn new(broker: Arc<ConnectionBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl CredentialChangePort for PasswordModifyChanger {
    async fn change_credential(
        &self,
        dn: &DistinguishedName,
        secret: &SecretString,
    ) -> Result<()> {
        let mut session = self.broker.acquire(BindIdentity::ReadWrite).await?;
        let outcome = self
            .broker
            .bounded(
                "password modify",
                session.password_modify(dn.as_str(), secret.expose_secret()),
            )
            .await;
        self.broker.release(session).await;

        if outcome.is_ok() {
            info!(dn = %dn, "credential changed via password modify");
        }
        outcome
    }
}

/// Runs an administrative program: `program args... -- <dn>`, new secret on stdin.
#[derive(Debug, Clone)]
pub struct CommandCredentialChanger {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandCredentialChanger {
    /// Creates a changer for `program` with leading `args`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Kills the program if it runs longer than `limit`.
    #[must_use]
    pub const fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    async fn run(&self, dn: &DistinguishedName, secret: &SecretString) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--")
            .arg(dn.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                Error::MutationError(format!(
                    "failed to start {}: {err}",
                    self.program.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut line = secret.expose_secret().as_bytes().to_vec();
            line.push(b'\n');
            stdin.write_all(&line).await.map_err(|err| {
                Error::MutationError(format!("failed to pass credential to program: {err}"))
            })?;
        }

        let output = child.wait_with_output().await.map_err(|err| {
            Error::MutationError(format!("credential program did not finish: {err}"))
        })?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::MutationError(format!(
            "credential program exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}

#[async_trait]
impl CredentialChangePort for CommandCredentialChanger {
    async fn change_credential(
        &self,
        dn: &DistinguishedName,
        secret: &SecretString,
    ) -> Result<()> {
        debug!(program = %self.program.display(), dn = %dn, "running credential program");
        match self.timeout {
            Some(limit) => timeout(limit, self.run(dn, secret)).await.map_err(|_| {
                Error::Timeout(format!(
                    "credential program exceeded {}s",
                    limit.as_secs()
                ))
            })?,
            None => self.run(dn, secret).await,
        }?;
        info!(dn = %dn, "credential changed via program");
        Ok(())
    }
}
