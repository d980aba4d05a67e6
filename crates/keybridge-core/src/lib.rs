//! Core logic for Keybridge, a credential broker invoked by Git to obtain,
//! store, and erase authentication material for remote repository hosts.
//!
//! The pipeline for one request: [`input::InputRequest`] →
//! [`registry::HostProviderRegistry`] (using [`settings::Settings`] over
//! [`scope`]-derived lookups) → a [`registry::HostProvider`] → the
//! [`coordinator::AuthenticationCoordinator`] driving either an interactive
//! basic prompt or one of the [`oauth`] flows.

pub mod auth;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod git;
pub mod input;
pub mod oauth;
pub mod providers;
pub mod registry;
pub mod scope;
pub mod settings;
pub mod store;
pub mod test_support;
pub mod utils;

pub use credential::Credential;
pub use error::{Error, Result};
