//! Shared request state.

use dirgate_core::config::StructureSection;
use dirgate_core::{AccessPolicy, GatewayConfig, Result};
use dirgate_ldap::{DirectoryClient, DirectoryConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// State handed to every handler. Built once at startup and never mutated.
pub struct AppState {
    /// Read/write policy
    pub policy: AccessPolicy,
    /// Directory operations
    pub directory: DirectoryClient,
    /// Container hints served to the UI
    pub structure: StructureSection,
    /// Root of the tree
    pub base_dn: String,
    /// Static UI assets
    pub static_dir: PathBuf,
}

/// Handle shared by the router.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Builds the state from the process configuration.
    ///
    /// # Errors
    ///
    /// Returns [`dirgate_core::Error::ConfigError`] if the directory settings are inconsistent,
    /// for example an allow-listed attribute the schema does not know.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let directory = DirectoryClient::new(DirectoryConfig::try_from(config)?);
        Ok(Self {
            policy: AccessPolicy::from_config(&config.api),
            directory,
            structure: config.structure.clone(),
            base_dn: config.connect.base_dn.clone(),
            static_dir: config.listen.static_dir.clone(),
        })
    }
}
