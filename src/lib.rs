//! SPID Service Provider core.
//!
//! Builds the multi-IdP trust configuration from SPID federation metadata and
//! runs the SAML Web Browser SSO exchange with SPID request rewriting and
//! anti-replay protection backed by a shared request cache.

pub mod cache;
pub mod cert;
pub mod config;
pub mod dsig;
pub mod error;
pub mod metadata;
pub mod saml;
pub mod spid;
pub mod trust;
pub mod xml;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AgentConfig;
pub use error::{SpidError, SpidResult};
