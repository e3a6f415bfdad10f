//! SPID SAML protocol client.
//!
//! A generic [`SamlEngine`] drafts requests and validates responses;
//! [`SpidSamlClient`] layers the SPID rules and anti-replay consumption on
//! top of it.

pub mod client;
pub mod engine;
pub mod observer;
pub mod prevalidate;
pub mod request;
pub mod tamper;
pub mod types;

pub use client::{decode_post_body, SpidSamlClient, SpidSamlClientBuilder};
pub use crate::dsig::{SignatureVerifier, XmlSigner};
pub use engine::{SamaelEngine, SamlEngine};
pub use observer::{Direction, RequestObserver, TracingObserver};
pub use prevalidate::{PreValidated, ResponsePreValidator, SpidPreValidator};
pub use request::AuthnRequest;
pub use tamper::{RequestTamperer, SpidTamperer};
pub use types::{RequestContext, SpidProfile};
