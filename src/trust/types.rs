//! Trust configuration consumed by the SAML client.

use super::config::SpConfig;
use crate::error::{SpidError, SpidResult};
use crate::metadata::{IdentityProviderDescriptor, IdpMap};

/// Service Provider settings plus every trusted IdP, indexed by alias.
///
/// Built once per configuration load and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TrustConfiguration {
    service_provider: SpConfig,
    identity_providers: IdpMap,
}

impl TrustConfiguration {
    /// Create a trust configuration. An empty IdP map is rejected.
    pub fn new(service_provider: SpConfig, identity_providers: IdpMap) -> SpidResult<Self> {
        if identity_providers.is_empty() {
            return Err(SpidError::EmptyTrust);
        }

        Ok(Self {
            service_provider,
            identity_providers,
        })
    }

    pub fn service_provider(&self) -> &SpConfig {
        &self.service_provider
    }

    pub fn identity_providers(&self) -> &IdpMap {
        &self.identity_providers
    }

    /// Look up an IdP by alias.
    pub fn identity_provider(&self, alias: &str) -> SpidResult<&IdentityProviderDescriptor> {
        self.identity_providers
            .get(alias)
            .ok_or_else(|| SpidError::UnknownIdentityProvider(alias.to_string()))
    }

    /// Look up an IdP by entity ID, returning its alias too.
    pub fn find_by_entity_id(&self, entity_id: &str) -> Option<(&str, &IdentityProviderDescriptor)> {
        self.identity_providers
            .iter()
            .find(|(_, idp)| idp.entity_id == entity_id)
            .map(|(alias, idp)| (alias.as_str(), idp))
    }

    pub fn len(&self) -> usize {
        self.identity_providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identity_providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{descriptor, sp_config};

    #[test]
    fn test_empty_trust_is_rejected() {
        let result = TrustConfiguration::new(sp_config(), IdpMap::new());
        assert!(matches!(result, Err(SpidError::EmptyTrust)));
    }

    #[test]
    fn test_lookups() {
        let mut idps = IdpMap::new();
        idps.insert("posteid".to_string(), descriptor("https://posteid.poste.it"));
        let trust = TrustConfiguration::new(sp_config(), idps).unwrap();

        assert_eq!(trust.len(), 1);
        assert!(trust.identity_provider("posteid").is_ok());
        assert!(matches!(
            trust.identity_provider("arubaid"),
            Err(SpidError::UnknownIdentityProvider(_))
        ));

        let (alias, _) = trust.find_by_entity_id("https://posteid.poste.it").unwrap();
        assert_eq!(alias, "posteid");
        assert!(trust.find_by_entity_id("https://rogue.example.com").is_none());
    }
}
