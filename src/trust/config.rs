//! SPID Service Provider configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::spid::{SpidAttribute, SpidLevel};

/// SPID Service Provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpConfig {
    /// SP Entity ID, used as AuthnRequest issuer and expected audience.
    #[serde(default)]
    pub issuer: String,

    /// Assertion Consumer Service URL (where the IdP posts the response).
    #[serde(default)]
    pub callback_url: String,

    /// Single Logout Service URL (optional).
    #[serde(default)]
    pub logout_callback_url: Option<String>,

    /// SP private key (PEM), handed to the XML signer.
    #[serde(default)]
    pub private_key_pem: String,

    /// SP certificate (PEM), published in SP metadata.
    #[serde(default)]
    pub certificate_pem: String,

    /// Clock skew tolerance in milliseconds.
    #[serde(default = "default_clock_skew_ms")]
    pub accepted_clock_skew_ms: i64,

    /// Attributes requested on every authentication.
    #[serde(default)]
    pub required_attributes: RequiredAttributes,

    /// AttributeConsumingServiceIndex sent in AuthnRequests.
    #[serde(default)]
    pub attribute_consuming_service_index: u32,

    /// Level requested when the caller does not pick one.
    #[serde(default)]
    pub default_level: SpidLevel,

    /// Organization block of the SP metadata.
    #[serde(default)]
    pub organization: Organization,

    /// Autologin value for test IdPs. Empty means disabled.
    #[serde(default)]
    pub autologin: String,

    /// Extra query parameters appended to redirect-binding requests.
    #[serde(default)]
    pub additional_params: BTreeMap<String, String>,
}

/// Attribute consuming service declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequiredAttributes {
    /// ServiceName of the AttributeConsumingService.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Requested attributes.
    #[serde(default = "default_attributes")]
    pub attributes: Vec<SpidAttribute>,
}

/// Organization metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Organization {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
}

fn default_clock_skew_ms() -> i64 {
    5 * 60 * 1000 // 5 minutes
}

fn default_service_name() -> String {
    "Required attributes".to_string()
}

fn default_attributes() -> Vec<SpidAttribute> {
    vec![
        SpidAttribute::Name,
        SpidAttribute::FamilyName,
        SpidAttribute::FiscalNumber,
        SpidAttribute::Email,
    ]
}

impl Default for RequiredAttributes {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            attributes: default_attributes(),
        }
    }
}

impl Default for SpConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            callback_url: String::new(),
            logout_callback_url: None,
            private_key_pem: String::new(),
            certificate_pem: String::new(),
            accepted_clock_skew_ms: default_clock_skew_ms(),
            required_attributes: RequiredAttributes::default(),
            attribute_consuming_service_index: 0,
            default_level: SpidLevel::default(),
            organization: Organization::default(),
            autologin: String::new(),
            additional_params: BTreeMap::new(),
        }
    }
}

impl SpConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.issuer.is_empty() {
            return Err("SP issuer is required".to_string());
        }

        if self.callback_url.is_empty() {
            return Err("SP callback_url is required".to_string());
        }

        if !self.callback_url.starts_with("https://") && !self.callback_url.starts_with("http://")
        {
            return Err("SP callback_url must be a valid HTTP(S) URL".to_string());
        }

        if self.certificate_pem.is_empty() {
            return Err("SP certificate_pem is required".to_string());
        }

        if self.accepted_clock_skew_ms < 0 {
            return Err("accepted_clock_skew_ms must not be negative".to_string());
        }

        if self.required_attributes.attributes.is_empty() {
            return Err("at least one required attribute must be requested".to_string());
        }

        Ok(())
    }

    /// Clock skew tolerance as a chrono duration.
    pub fn clock_skew(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.accepted_clock_skew_ms)
    }

    /// Fold the autologin value into the additional request parameters.
    ///
    /// An empty value removes the parameter.
    pub fn apply_autologin(&mut self) {
        if self.autologin.is_empty() {
            self.additional_params.remove(AUTOLOGIN_PARAM);
        } else {
            self.additional_params
                .insert(AUTOLOGIN_PARAM.to_string(), self.autologin.clone());
        }
    }
}

/// Query parameter carrying the autologin value.
pub const AUTOLOGIN_PARAM: &str = "auth";
