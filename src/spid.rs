//! SPID protocol vocabulary: authentication levels, attributes and the SAML
//! URIs the technical rules pin down.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SAMLP_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const MD_NS: &str = "urn:oasis:names:tc:SAML:2.0:metadata";
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

pub const HTTP_REDIRECT_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
pub const HTTP_POST_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";

pub const NAMEID_FORMAT_ENTITY: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:entity";
pub const NAMEID_FORMAT_TRANSIENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:transient";
pub const ATTRNAME_FORMAT_BASIC: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";

pub const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

/// SPID authentication level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpidLevel {
    #[serde(rename = "SpidL1")]
    L1,
    #[serde(rename = "SpidL2")]
    L2,
    #[serde(rename = "SpidL3")]
    L3,
}

impl SpidLevel {
    /// AuthnContextClassRef URI for this level.
    pub fn uri(&self) -> &'static str {
        match self {
            SpidLevel::L1 => "https://www.spid.gov.it/SpidL1",
            SpidLevel::L2 => "https://www.spid.gov.it/SpidL2",
            SpidLevel::L3 => "https://www.spid.gov.it/SpidL3",
        }
    }

    /// Parse an AuthnContextClassRef URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri.trim() {
            "https://www.spid.gov.it/SpidL1" => Some(SpidLevel::L1),
            "https://www.spid.gov.it/SpidL2" => Some(SpidLevel::L2),
            "https://www.spid.gov.it/SpidL3" => Some(SpidLevel::L3),
            _ => None,
        }
    }

    /// Levels above L1 must force a fresh authentication at the IdP.
    pub fn requires_force_authn(&self) -> bool {
        *self > SpidLevel::L1
    }
}

impl Default for SpidLevel {
    fn default() -> Self {
        SpidLevel::L2
    }
}

impl fmt::Display for SpidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Attributes an SPID service provider may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpidAttribute {
    FamilyName,
    Name,
    SpidCode,
    Gender,
    FiscalNumber,
    DateOfBirth,
    PlaceOfBirth,
    CompanyName,
    RegisteredOffice,
    IvaCode,
    IdCard,
    MobilePhone,
    Email,
    Address,
    DigitalAddress,
}

impl SpidAttribute {
    pub const ALL: [SpidAttribute; 15] = [
        SpidAttribute::FamilyName,
        SpidAttribute::Name,
        SpidAttribute::SpidCode,
        SpidAttribute::Gender,
        SpidAttribute::FiscalNumber,
        SpidAttribute::DateOfBirth,
        SpidAttribute::PlaceOfBirth,
        SpidAttribute::CompanyName,
        SpidAttribute::RegisteredOffice,
        SpidAttribute::IvaCode,
        SpidAttribute::IdCard,
        SpidAttribute::MobilePhone,
        SpidAttribute::Email,
        SpidAttribute::Address,
        SpidAttribute::DigitalAddress,
    ];

    /// Attribute name as it appears in SAML assertions and SP metadata.
    pub fn saml_name(&self) -> &'static str {
        match self {
            SpidAttribute::FamilyName => "familyName",
            SpidAttribute::Name => "name",
            SpidAttribute::SpidCode => "spidCode",
            SpidAttribute::Gender => "gender",
            SpidAttribute::FiscalNumber => "fiscalNumber",
            SpidAttribute::DateOfBirth => "dateOfBirth",
            SpidAttribute::PlaceOfBirth => "placeOfBirth",
            SpidAttribute::CompanyName => "companyName",
            SpidAttribute::RegisteredOffice => "registeredOffice",
            SpidAttribute::IvaCode => "ivaCode",
            SpidAttribute::IdCard => "idCard",
            SpidAttribute::MobilePhone => "mobilePhone",
            SpidAttribute::Email => "email",
            SpidAttribute::Address => "address",
            SpidAttribute::DigitalAddress => "digitalAddress",
        }
    }
}

impl FromStr for SpidAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpidAttribute::ALL
            .iter()
            .find(|attr| attr.saml_name() == s)
            .copied()
            .ok_or_else(|| format!("unknown SPID attribute: {}", s))
    }
}

impl fmt::Display for SpidAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.saml_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(SpidLevel::L1 < SpidLevel::L2);
        assert!(SpidLevel::L2 < SpidLevel::L3);
        assert!(!SpidLevel::L1.requires_force_authn());
        assert!(SpidLevel::L2.requires_force_authn());
    }

    #[test]
    fn test_level_uri() {
        for level in [SpidLevel::L1, SpidLevel::L2, SpidLevel::L3] {
            assert_eq!(SpidLevel::from_uri(level.uri()), Some(level));
        }
        assert_eq!(
            SpidLevel::from_uri("urn:oasis:names:tc:SAML:2.0:ac:classes:Password"),
            None
        );
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!(SpidAttribute::ALL.len(), 15);
        assert_eq!(
            "fiscalNumber".parse::<SpidAttribute>(),
            Ok(SpidAttribute::FiscalNumber)
        );
        assert!("nickname".parse::<SpidAttribute>().is_err());

        let json = serde_json::to_string(&SpidAttribute::DigitalAddress).unwrap();
        assert_eq!(json, "\"digitalAddress\"");
    }
}
