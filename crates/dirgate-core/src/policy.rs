//! Per-request access policy.
//!
//! [`AccessPolicy::decide`] is a pure function of the request shape and the startup
//! configuration. A denial is returned before any directory connection is opened.

use crate::config::ApiSection;
use crate::error::Error;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// Name of the directory's credential attribute.
pub const CREDENTIAL_ATTRIBUTE: &str = "userPassword";

/// Request classes the policy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// `GET` and other safe methods
    Read,
    /// `PUT` / `POST`
    Write,
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Credential missing or wrong
    Unauthorized,
    /// Attribute outside the mutable allow-list
    AttributeNotAllowed(String),
    /// Credential attribute targeted while credential changes are disabled
    CredentialChangeForbidden,
}

/// Outcome of [`AccessPolicy::decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed with the request
    Allow,
    /// Refuse the request
    Deny(DenyReason),
}

impl Decision {
    /// Converts a denial into the matching [`Error`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`], [`Error::AttributeNotAllowed`] or
    /// [`Error::CredentialChangeForbidden`] for the corresponding deny reason.
    pub fn into_result(self) -> crate::Result<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(DenyReason::Unauthorized) => Err(Error::Unauthorized(
                "Please log in to make changes.".to_string(),
            )),
            Self::Deny(DenyReason::AttributeNotAllowed(name)) => {
                Err(Error::AttributeNotAllowed(name))
            }
            Self::Deny(DenyReason::CredentialChangeForbidden) => Err(
                Error::CredentialChangeForbidden("password changes are disabled".to_string()),
            ),
        }
    }
}

/// Read/write authorization policy loaded once at startup.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    anonymous_read: bool,
    anonymous_write: bool,
    credential: Option<SecretString>,
    mutable_attributes: Vec<String>,
    allow_credential_change: bool,
}

impl AccessPolicy {
    /// Creates a policy that requires `credential` for every request.
    #[must_use]
    pub fn new(credential: Option<SecretString>) -> Self {
        Self {
            anonymous_read: false,
            anonymous_write: false,
            credential,
            mutable_attributes: Vec::new(),
            allow_credential_change: false,
        }
    }

    /// Builds the policy from the `[api]` configuration section.
    #[must_use]
    pub fn from_config(api: &ApiSection) -> Self {
        Self::new(api.boundary_credential())
            .with_anonymous_read(api.anonymous_read)
            .with_anonymous_write(api.anonymous_write)
            .with_mutable_attributes(api.mutable_attributes.iter().cloned())
            .with_credential_change(api.allow_password_change)
    }

    /// Allows or refuses reads without a credential.
    #[must_use]
    pub const fn with_anonymous_read(mut self, enabled: bool) -> Self {
        self.anonymous_read = enabled;
        self
    }

    /// Allows or refuses writes without a credential.
    #[must_use]
    pub const fn with_anonymous_write(mut self, enabled: bool) -> Self {
        self.anonymous_write = enabled;
        self
    }

    /// Replaces the mutable-attribute allow-list.
    #[must_use]
    pub fn with_mutable_attributes<I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.mutable_attributes = names.into_iter().collect();
        self
    }

    /// Enables or disables credential changes.
    #[must_use]
    pub const fn with_credential_change(mut self, allowed: bool) -> Self {
        self.allow_credential_change = allowed;
        self
    }

    /// Returns true if `name` is on the mutable allow-list (case-insensitive).
    #[must_use]
    pub fn is_mutable(&self, name: &str) -> bool {
        self.mutable_attributes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(name))
    }

    /// Decides whether a request may proceed.
    ///
    /// Rules, in order: the anonymous toggle for the verb or an exact credential match; for
    /// writes, allow-list membership of the target attribute; for credential-attribute writes,
    /// the credential-change flag.
    #[must_use]
    pub fn decide(&self, verb: Verb, target: Option<&str>, presented: Option<&str>) -> Decision {
        if let deny @ Decision::Deny(_) = self.authenticate(verb, presented) {
            return deny;
        }

        if verb == Verb::Write {
            let name = target.unwrap_or_default();
            if !self.is_mutable(name) {
                return Decision::Deny(DenyReason::AttributeNotAllowed(name.to_string()));
            }
            if name.eq_ignore_ascii_case(CREDENTIAL_ATTRIBUTE) && !self.allow_credential_change {
                return Decision::Deny(DenyReason::CredentialChangeForbidden);
            }
        }

        Decision::Allow
    }

    /// Applies only the first rule: the anonymous toggle for `verb` or a matching credential.
    ///
    /// Lets a caller refuse an unauthenticated request before looking at its body.
    #[must_use]
    pub fn authenticate(&self, verb: Verb, presented: Option<&str>) -> Decision {
        let anonymous = match verb {
            Verb::Read => self.anonymous_read,
            Verb::Write => self.anonymous_write,
        };
        if anonymous || self.credential_matches(presented) {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::Unauthorized)
        }
    }

    fn credential_matches(&self, presented: Option<&str>) -> bool {
        match (&self.credential, presented) {
            (Some(expected), Some(presented)) => bool::from(
                expected
                    .expose_secret()
                    .as_bytes()
                    .ct_eq(presented.as_bytes()),
            ),
            _ => false,
        }
    }
}
