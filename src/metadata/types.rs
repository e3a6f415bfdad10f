//! Identity Provider trust descriptors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trust material for a single Identity Provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProviderDescriptor {
    /// IdP entity ID (unique).
    pub entity_id: String,

    /// Signing certificates in PEM format. Any of them may verify a response.
    pub signing_certificates: Vec<String>,

    /// Single Sign-On endpoint.
    pub sso_url: String,

    /// Single Logout endpoint (empty when the IdP publishes none).
    pub slo_url: String,
}

/// Alias → descriptor map.
pub type IdpMap = BTreeMap<String, IdentityProviderDescriptor>;

/// Raw IdP entry parsed from a metadata document, before whitelisting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpMetadataRecord {
    pub entity_id: String,
    pub signing_certificates: Vec<String>,
    pub sso_url: Option<String>,
    pub slo_url: Option<String>,
}

impl IdpMetadataRecord {
    /// Convert to a descriptor. Records without certificates or SSO endpoint
    /// cannot be trusted and yield `None`.
    pub fn into_descriptor(self) -> Option<IdentityProviderDescriptor> {
        if self.signing_certificates.is_empty() {
            return None;
        }
        let sso_url = self.sso_url?;
        Some(IdentityProviderDescriptor {
            entity_id: self.entity_id,
            signing_certificates: self.signing_certificates,
            sso_url,
            slo_url: self.slo_url.unwrap_or_default(),
        })
    }
}
