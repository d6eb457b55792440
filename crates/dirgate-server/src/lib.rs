//! # dirgate-server
//!
//! HTTP face of the directory gateway: the REST router, its policy gate, and the plaintext and
//! TLS listeners that serve it.
//!
//! ## Modules
//!
//! - [`api`] - Router, handlers and error rendering
//! - [`listener`] - Plaintext and TLS accept loops
//! - [`state`] - Shared, read-only request state

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod listener;
pub mod state;

pub use state::{AppState, SharedState};
