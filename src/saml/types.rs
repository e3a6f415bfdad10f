//! Types exchanged with the SAML client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::spid::{SpidAttribute, SpidLevel};

/// Per-login parameters for AuthnRequest generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Alias of the target IdP in the trust configuration.
    pub idp_alias: String,
    /// Requested level; the SP default applies when unset.
    pub level: Option<SpidLevel>,
    /// Browser address, forwarded to the observer.
    pub client_ip: Option<String>,
}

impl RequestContext {
    pub fn new(idp_alias: impl Into<String>) -> Self {
        Self {
            idp_alias: idp_alias.into(),
            level: None,
            client_ip: None,
        }
    }

    pub fn with_level(mut self, level: SpidLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }
}

/// Identity asserted by a validated SPID response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpidProfile {
    /// Subject NameID (transient for SPID).
    pub name_id: String,
    pub name_id_format: Option<String>,
    /// Needed for single logout.
    pub session_index: Option<String>,
    /// IdP entity ID.
    pub issuer: String,
    /// ID of the AuthnRequest this response answers.
    pub in_response_to: Option<String>,
    pub level: Option<SpidLevel>,
    /// Attribute name -> values, as released by the IdP.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl SpidProfile {
    /// First value of a SPID attribute.
    pub fn attribute(&self, attribute: SpidAttribute) -> Option<&str> {
        self.attributes
            .get(attribute.saml_name())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Required attributes the IdP did not release.
    pub fn missing_attributes(&self, required: &[SpidAttribute]) -> Vec<SpidAttribute> {
        required
            .iter()
            .filter(|attr| self.attribute(**attr).is_none())
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_attributes() {
        let mut attributes = BTreeMap::new();
        attributes.insert("fiscalNumber".to_string(), vec!["TINIT-RSSMRA80A01H501U".to_string()]);
        let profile = SpidProfile {
            name_id: "_transient".to_string(),
            name_id_format: None,
            session_index: None,
            issuer: "https://posteid.poste.it".to_string(),
            in_response_to: None,
            level: Some(SpidLevel::L2),
            attributes,
        };

        assert_eq!(
            profile.attribute(SpidAttribute::FiscalNumber),
            Some("TINIT-RSSMRA80A01H501U")
        );
        assert_eq!(
            profile.missing_attributes(&[SpidAttribute::FiscalNumber, SpidAttribute::Email]),
            vec![SpidAttribute::Email]
        );
    }

    #[test]
    fn test_request_context() {
        let ctx = RequestContext::new("posteid")
            .with_level(SpidLevel::L3)
            .with_client_ip("10.0.0.1");
        assert_eq!(ctx.idp_alias, "posteid");
        assert_eq!(ctx.level, Some(SpidLevel::L3));
        assert_eq!(ctx.client_ip.as_deref(), Some("10.0.0.1"));
    }
}
