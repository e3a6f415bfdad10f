//! Error types for the SPID service-provider core.

use thiserror::Error;

/// Result type used throughout the crate.
pub type SpidResult<T> = Result<T, SpidError>;

/// Errors raised while building trust configuration or handling a
/// request/response exchange.
#[derive(Debug, Error)]
pub enum SpidError {
    /// Network failure reaching a metadata or validator endpoint.
    #[error("failed to fetch metadata from {url}")]
    Fetch {
        /// Metadata endpoint.
        url: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Metadata endpoint answered with a non-success status.
    #[error("metadata endpoint {url} returned status {status}")]
    FetchStatus {
        /// Metadata endpoint.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Malformed XML in metadata, requests or responses.
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// A metadata document contained no IdP entities.
    #[error("no IdP metadata found at {source_name}")]
    NoMetadata {
        /// URL or label of the metadata source.
        source_name: String,
    },

    /// The trust map would have been empty.
    #[error("no identity provider could be trusted")]
    EmptyTrust,

    /// AuthnRequest rewriting failed SPID rule enforcement.
    #[error("AuthnRequest tampering failed: {0}")]
    Tamper(String),

    /// The request cache backend failed.
    #[error("request cache unavailable")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The response refers to an unknown, expired or already consumed request.
    #[error("unknown or already used request")]
    ReplayOrUnknownRequest,

    /// No IdP is registered under the requested alias.
    #[error("unknown identity provider: {0}")]
    UnknownIdentityProvider(String),

    /// The SAML response failed validation.
    #[error("invalid SAML response: {0}")]
    InvalidResponse(String),

    /// Signature missing or rejected.
    #[error("signature validation failed: {0}")]
    Signature(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Certificate could not be decoded or parsed.
    #[error("certificate error: {0}")]
    Certificate(String),
}

impl From<quick_xml::Error> for SpidError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
