//! IdP metadata aggregation.
//!
//! Fetches SAML2 metadata from one or more federations, keeps only the
//! recognized entities and indexes them by alias.

pub mod config;
pub mod fetcher;
pub mod parser;
pub mod types;

pub use config::{default_recognized_idps, MetadataConfig, MetadataSource, VALIDATOR_ALIAS};
pub use fetcher::{import_metadata, AggregatedIdps, MetadataFetcher};
pub use parser::{filter_recognized, parse_idp_metadata};
pub use types::{IdentityProviderDescriptor, IdpMap, IdpMetadataRecord};
