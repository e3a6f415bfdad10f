//! Metadata source configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cert::pem_to_der;
use crate::trust::pinned::{is_pinned_alias, PinnedCertificates};

/// Alias given to the entity published by the SPID validator.
pub const VALIDATOR_ALIAS: &str = "xx_validator";

/// A metadata document plus the entities to import from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataSource {
    /// Metadata URL.
    pub url: String,

    /// Recognized entity IDs mapped to their alias.
    pub recognized: BTreeMap<String, String>,
}

/// IdP metadata configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataConfig {
    /// Federation-wide IdP metadata (SPID registry).
    #[serde(default = "default_idp_metadata_url")]
    pub idp_metadata_url: String,

    /// Recognized production IdPs: entity ID -> alias.
    #[serde(default = "default_recognized_idps")]
    pub recognized_idps: BTreeMap<String, String>,

    /// SPID validator base URL (optional). Its metadata is read from
    /// `<validator_url>/metadata.xml`.
    #[serde(default)]
    pub validator_url: Option<String>,

    /// Entity ID published by the validator.
    #[serde(default = "default_validator_entity_id")]
    pub validator_entity_id: String,

    /// Base URL of the SPID test environment.
    #[serde(default = "default_testenv_url")]
    pub testenv_url: String,

    /// HTTP timeout for metadata fetches, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Signing certificates of the pinned test IdPs, replacing the built-in
    /// ones: alias -> PEM list.
    #[serde(default)]
    pub pinned_certificates: PinnedCertificates,
}

fn default_idp_metadata_url() -> String {
    "https://registry.spid.gov.it/metadata/idp/spid-entities-idps.xml".to_string()
}

fn default_validator_entity_id() -> String {
    "https://validator.spid.gov.it".to_string()
}

fn default_testenv_url() -> String {
    "https://spid-testenv2:8088".to_string()
}

fn default_fetch_timeout() -> u64 {
    10
}

/// The nine production SPID identity providers.
pub fn default_recognized_idps() -> BTreeMap<String, String> {
    [
        ("https://loginspid.aruba.it", "arubaid"),
        ("https://identity.infocert.it", "infocertid"),
        ("https://spid.intesa.it", "intesaid"),
        ("https://id.lepida.it/idp/shibboleth", "lepidaid"),
        ("https://idp.namirialtsp.com/idp", "namirialid"),
        ("https://posteid.poste.it", "posteid"),
        ("https://identity.sieltecloud.it", "sielteid"),
        ("https://spid.register.it", "spiditalia"),
        ("https://login.id.tim.it/affwebservices/public/saml2sso", "timid"),
    ]
    .into_iter()
    .map(|(entity_id, alias)| (entity_id.to_string(), alias.to_string()))
    .collect()
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            idp_metadata_url: default_idp_metadata_url(),
            recognized_idps: default_recognized_idps(),
            validator_url: None,
            validator_entity_id: default_validator_entity_id(),
            testenv_url: default_testenv_url(),
            fetch_timeout_secs: default_fetch_timeout(),
            pinned_certificates: PinnedCertificates::new(),
        }
    }
}

impl MetadataConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.idp_metadata_url.is_empty() {
            return Err("idp_metadata_url is required".to_string());
        }

        if self.recognized_idps.is_empty() {
            return Err("at least one recognized IdP is required".to_string());
        }

        let mut aliases: Vec<&String> = self.recognized_idps.values().collect();
        aliases.sort();
        aliases.dedup();
        if aliases.len() != self.recognized_idps.len() {
            return Err("recognized IdP aliases must be unique".to_string());
        }

        if let Some(ref url) = self.validator_url {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err("validator_url must be a valid HTTP(S) URL".to_string());
            }
        }

        for (alias, certificates) in &self.pinned_certificates {
            if !is_pinned_alias(alias) {
                return Err(format!("pinned_certificates: unknown pinned IdP '{}'", alias));
            }
            for pem in certificates {
                pem_to_der(pem).map_err(|e| format!("pinned_certificates.{}: {}", alias, e))?;
            }
        }

        Ok(())
    }

    /// Metadata sources in merge order: the federation first, then the
    /// validator so its entry wins on alias collisions.
    pub fn sources(&self) -> Vec<MetadataSource> {
        let mut sources = vec![MetadataSource {
            url: self.idp_metadata_url.clone(),
            recognized: self.recognized_idps.clone(),
        }];

        if let Some(ref validator_url) = self.validator_url {
            let mut recognized = BTreeMap::new();
            recognized.insert(
                self.validator_entity_id.clone(),
                VALIDATOR_ALIAS.to_string(),
            );
            sources.push(MetadataSource {
                url: format!("{}/metadata.xml", validator_url.trim_end_matches('/')),
                recognized,
            });
        }

        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetadataConfig::default();
        assert_eq!(config.recognized_idps.len(), 9);
        assert!(config.validate().is_ok());
        assert_eq!(config.sources().len(), 1);
    }

    #[test]
    fn test_validator_source() {
        let config = MetadataConfig {
            validator_url: Some("https://validator.spid.gov.it/".to_string()),
            ..Default::default()
        };

        let sources = config.sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].url, "https://validator.spid.gov.it/metadata.xml");
        assert_eq!(
            sources[1].recognized.get("https://validator.spid.gov.it"),
            Some(&VALIDATOR_ALIAS.to_string())
        );
    }

    #[test]
    fn test_validation() {
        let mut config = MetadataConfig::default();
        config.recognized_idps.insert(
            "https://other.example.it".to_string(),
            "posteid".to_string(),
        );
        assert!(config.validate().is_err()); // duplicate alias

        let config = MetadataConfig {
            validator_url: Some("validator.local".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pinned_certificate_validation() {
        let mut config = MetadataConfig::default();
        config
            .pinned_certificates
            .insert("xx_testenv2".to_string(), vec!["TUlJcmVhbA==".to_string()]);
        assert!(config.validate().is_ok());

        config
            .pinned_certificates
            .insert("posteid".to_string(), vec!["TUlJcmVhbA==".to_string()]);
        assert!(config.validate().is_err());

        let mut config = MetadataConfig::default();
        config
            .pinned_certificates
            .insert("xx_servizicie_test".to_string(), vec!["not base64!".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pinned_certificates_deserialize() {
        let config: MetadataConfig = serde_json::from_str(
            r#"{"pinned_certificates": {"xx_testenv2": ["TUlJcmVhbA=="]}}"#,
        )
        .unwrap();
        assert_eq!(
            config.pinned_certificates.get("xx_testenv2"),
            Some(&vec!["TUlJcmVhbA==".to_string()])
        );
    }
}
