//! LDAP side of the directory gateway.
//!
//! This crate owns the connect-bind-operate-unbind lifecycle against the backend directory and
//! the projection of raw entries into the gateway's fixed JSON shape.

#![deny(missing_docs)]

mod broker;
mod client;
mod config;
mod connection;
mod credential;
mod dn;
mod entry;
mod schema;

pub use broker::{BindIdentity, ConnectionBroker};
pub use client::DirectoryClient;
pub use config::{BindCredentials, CredentialMechanism, DirectoryConfig};
pub use connection::{
    DirectoryModification, LdapConnector, LdapEntry, LdapSession, RawAttribute,
    RealLdapConnector, SearchScope,
};
pub use credential::{CommandCredentialChanger, CredentialChangePort, PasswordModifyChanger};
pub use dn::{DistinguishedName, DistinguishedNameError};
pub use entry::{DirectoryEntry, EntryKind, SubordinateSummary};
pub use schema::{AttributeSchema, AttributeValue, Cardinality};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirgate_core::Result<T>;
