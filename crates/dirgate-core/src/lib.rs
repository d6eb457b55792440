//! # dirgate-core
//!
//! Core types shared by the directory gateway crates.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and HTTP status code mapping
//! - [`config`] - Process configuration loaded once at startup
//! - [`policy`] - Per-request read/write authorization decisions

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod policy;

// Re-export commonly used types
pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use policy::{AccessPolicy, Decision, DenyReason, Verb, CREDENTIAL_ATTRIBUTE};
