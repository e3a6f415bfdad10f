//! SAML engine: draft AuthnRequests and generic response validation.

use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::request::AuthnRequest;
use super::types::{RequestContext, SpidProfile};
use crate::dsig::{OpensslSignatureVerifier, SignatureVerifier};
use crate::error::{SpidError, SpidResult};
use crate::spid::{SpidLevel, HTTP_POST_BINDING, SAML_NS, SAMLP_NS, STATUS_SUCCESS};
use crate::trust::TrustConfiguration;
use crate::xml::{element_texts, escape, first_element_text, root_attribute};

/// Generic SAML2 Web Browser SSO operations.
pub trait SamlEngine: Send + Sync {
    /// Build an AuthnRequest for the IdP named in `ctx`.
    fn generate_authn_request(
        &self,
        trust: &TrustConfiguration,
        ctx: &RequestContext,
        is_passive: bool,
    ) -> SpidResult<AuthnRequest>;

    /// Validate a response document and extract the asserted identity.
    fn validate_response(&self, trust: &TrustConfiguration, xml: &str) -> SpidResult<SpidProfile>;

    /// Whether the engine keeps its own record of issued request IDs.
    fn tracks_requests(&self) -> bool {
        false
    }
}

/// Engine backed by samael's SAML schema types.
///
/// Responses must carry a signature that [`OpensslSignatureVerifier`] (or
/// the verifier installed with [`SamaelEngine::with_verifier`]) accepts.
pub struct SamaelEngine {
    verifier: Arc<dyn SignatureVerifier>,
    allow_unsigned: bool,
    tracked: Option<Mutex<HashSet<String>>>,
}

impl Default for SamaelEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SamaelEngine {
    pub fn new() -> Self {
        Self {
            verifier: Arc::new(OpensslSignatureVerifier),
            allow_unsigned: false,
            tracked: None,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Skip signature verification entirely. Only for local test IdPs.
    pub fn allow_unsigned(mut self, allow: bool) -> Self {
        self.allow_unsigned = allow;
        self
    }

    /// Remember issued request IDs in process memory and accept each once.
    ///
    /// Only correct for a single instance; leave off when a shared request
    /// cache is used.
    pub fn track_requests(mut self, track: bool) -> Self {
        self.tracked = track.then(|| Mutex::new(HashSet::new()));
        self
    }

    fn remember(&self, request_id: &str) -> SpidResult<()> {
        if let Some(tracked) = &self.tracked {
            tracked
                .lock()
                .map_err(|_| SpidError::InvalidResponse("request tracker poisoned".to_string()))?
                .insert(request_id.to_string());
        }
        Ok(())
    }

    fn consume(&self, in_response_to: Option<&str>) -> SpidResult<()> {
        let Some(tracked) = &self.tracked else {
            return Ok(());
        };
        let id = in_response_to.ok_or(SpidError::ReplayOrUnknownRequest)?;
        let mut tracked = tracked
            .lock()
            .map_err(|_| SpidError::InvalidResponse("request tracker poisoned".to_string()))?;
        if tracked.remove(id) {
            Ok(())
        } else {
            Err(SpidError::ReplayOrUnknownRequest)
        }
    }
}

fn new_request_id() -> String {
    format!("_{}", hex::encode(rand::random::<[u8; 16]>()))
}

impl SamlEngine for SamaelEngine {
    fn generate_authn_request(
        &self,
        trust: &TrustConfiguration,
        ctx: &RequestContext,
        is_passive: bool,
    ) -> SpidResult<AuthnRequest> {
        let idp = trust.identity_provider(&ctx.idp_alias)?;
        let sp = trust.service_provider();
        let level = ctx.level.unwrap_or(sp.default_level);

        let id = new_request_id();
        let issue_instant = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let xml = format!(
            r#"<samlp:AuthnRequest xmlns:samlp="{}" xmlns:saml="{}" ID="{}" Version="2.0" IssueInstant="{}" Destination="{}" AssertionConsumerServiceURL="{}" ProtocolBinding="{}"{}><saml:Issuer>{}</saml:Issuer><samlp:RequestedAuthnContext><saml:AuthnContextClassRef>{}</saml:AuthnContextClassRef></samlp:RequestedAuthnContext></samlp:AuthnRequest>"#,
            SAMLP_NS,
            SAML_NS,
            id,
            issue_instant,
            escape(&idp.sso_url),
            escape(&sp.callback_url),
            HTTP_POST_BINDING,
            if is_passive { r#" IsPassive="true""# } else { "" },
            escape(&sp.issuer),
            level.uri()
        );

        self.remember(&id)?;

        debug!(request_id = %id, idp = %ctx.idp_alias, level = %level, "AuthnRequest drafted");

        Ok(AuthnRequest {
            id,
            xml,
            sso_url: idp.sso_url.clone(),
        })
    }

    fn validate_response(&self, trust: &TrustConfiguration, xml: &str) -> SpidResult<SpidProfile> {
        let sp = trust.service_provider();

        let response: samael::schema::Response = xml
            .parse()
            .map_err(|e| SpidError::Parse(format!("failed to parse SAML response: {}", e)))?;

        if let Some(ref status) = response.status {
            let status_value = status.status_code.value.as_deref();
            if status_value != Some(STATUS_SUCCESS) {
                let message = status
                    .status_message
                    .as_ref()
                    .and_then(|m| m.value.clone())
                    .unwrap_or_else(|| status_value.unwrap_or("unknown status").to_string());
                return Err(SpidError::InvalidResponse(format!(
                    "authentication failed: {}",
                    message
                )));
            }
        }

        let assertion = response
            .assertion
            .as_ref()
            .ok_or_else(|| SpidError::InvalidResponse("response contains no assertion".to_string()))?;

        let issuer = response
            .issuer
            .as_ref()
            .and_then(|i| i.value.clone())
            .or_else(|| assertion.issuer.value.clone())
            .ok_or_else(|| SpidError::InvalidResponse("response has no issuer".to_string()))?;

        let (idp_alias, idp) = trust
            .find_by_entity_id(&issuer)
            .ok_or_else(|| SpidError::UnknownIdentityProvider(issuer.clone()))?;

        if root_attribute(xml, "Destination")?.as_deref() != Some(sp.callback_url.as_str()) {
            return Err(SpidError::InvalidResponse(
                "response Destination does not match the ACS URL".to_string(),
            ));
        }

        if self.allow_unsigned {
            warn!(idp = %idp_alias, "Signature verification disabled, response accepted unchecked");
        } else {
            self.verifier.verify(xml, &idp.signing_certificates)?;
        }

        let now = Utc::now();
        let skew = sp.clock_skew();

        if let Some(ref conditions) = assertion.conditions {
            if let Some(not_before) = conditions.not_before {
                if now < not_before - skew {
                    return Err(SpidError::InvalidResponse("assertion not yet valid".to_string()));
                }
            }
            if let Some(not_on_or_after) = conditions.not_on_or_after {
                if now >= not_on_or_after + skew {
                    return Err(SpidError::InvalidResponse("assertion has expired".to_string()));
                }
            }
        }

        let audiences = element_texts(xml, "Audience")?;
        if !audiences.is_empty() && !audiences.iter().any(|a| a == &sp.issuer) {
            return Err(SpidError::InvalidResponse(
                "assertion audience does not include this SP".to_string(),
            ));
        }

        let name_id = assertion
            .subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .ok_or_else(|| SpidError::InvalidResponse("assertion missing NameID".to_string()))?;

        let session_index = assertion
            .authn_statements
            .as_ref()
            .and_then(|stmts| stmts.first())
            .and_then(|s| s.session_index.clone());

        let level = first_element_text(xml, "AuthnContextClassRef")?
            .as_deref()
            .and_then(SpidLevel::from_uri);

        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(ref attr_statements) = assertion.attribute_statements {
            for attr_statement in attr_statements {
                for attr in &attr_statement.attributes {
                    if let Some(ref name) = attr.name {
                        let values: Vec<String> =
                            attr.values.iter().filter_map(|v| v.value.clone()).collect();
                        if !values.is_empty() {
                            attributes.insert(name.clone(), values);
                        }
                    }
                }
            }
        }

        self.consume(response.in_response_to.as_deref())?;

        info!(
            idp = %idp_alias,
            attributes = attributes.len(),
            "SAML response validated"
        );

        Ok(SpidProfile {
            name_id: name_id.value.clone(),
            name_id_format: name_id.format.clone(),
            session_index,
            issuer,
            in_response_to: response.in_response_to.clone(),
            level,
            attributes,
        })
    }

    fn tracks_requests(&self) -> bool {
        self.tracked.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{other_signing_credentials, trust, ResponseFixture};

    fn engine() -> SamaelEngine {
        SamaelEngine::new().allow_unsigned(true)
    }

    #[test]
    fn test_generate_authn_request() {
        let trust = trust();
        let ctx = RequestContext::new("posteid").with_level(SpidLevel::L3);

        let request = engine().generate_authn_request(&trust, &ctx, false).unwrap();
        assert!(request.id.starts_with('_'));
        assert_eq!(request.id.len(), 33);
        assert_eq!(request.sso_url, "https://posteid.poste.it/sso-redirect");
        assert_eq!(
            root_attribute(&request.xml, "ID").unwrap().as_deref(),
            Some(request.id.as_str())
        );
        assert_eq!(
            first_element_text(&request.xml, "AuthnContextClassRef")
                .unwrap()
                .as_deref(),
            Some(SpidLevel::L3.uri())
        );
        assert_eq!(root_attribute(&request.xml, "IsPassive").unwrap(), None);

        let passive = engine().generate_authn_request(&trust, &ctx, true).unwrap();
        assert_eq!(
            root_attribute(&passive.xml, "IsPassive").unwrap().as_deref(),
            Some("true")
        );
        assert_ne!(passive.id, request.id);
    }

    #[test]
    fn test_unknown_idp_alias() {
        let result =
            engine().generate_authn_request(&trust(), &RequestContext::new("nope"), false);
        assert!(matches!(result, Err(SpidError::UnknownIdentityProvider(_))));
    }

    #[test]
    fn test_validate_response() {
        let trust = trust();
        let xml = ResponseFixture::new("_req1").to_xml();

        let profile = engine().validate_response(&trust, &xml).unwrap();
        assert_eq!(profile.issuer, "https://posteid.poste.it");
        assert_eq!(profile.in_response_to.as_deref(), Some("_req1"));
        assert_eq!(profile.level, Some(SpidLevel::L2));
        assert_eq!(profile.session_index.as_deref(), Some("_session1"));
        assert_eq!(
            profile.attribute(crate::spid::SpidAttribute::FiscalNumber),
            Some("TINIT-RSSMRA80A01H501U")
        );
    }

    #[test]
    fn test_rejects_untrusted_issuer() {
        let mut fixture = ResponseFixture::new("_req1");
        fixture.issuer = "https://rogue.example.com".to_string();

        let result = engine().validate_response(&trust(), &fixture.to_xml());
        assert!(matches!(result, Err(SpidError::UnknownIdentityProvider(_))));
    }

    #[test]
    fn test_rejects_wrong_destination() {
        let mut fixture = ResponseFixture::new("_req1");
        fixture.destination = "https://attacker.example.com/acs".to_string();

        let result = engine().validate_response(&trust(), &fixture.to_xml());
        assert!(matches!(result, Err(SpidError::InvalidResponse(_))));
    }

    #[test]
    fn test_rejects_failed_status() {
        let mut fixture = ResponseFixture::new("_req1");
        fixture.status = "urn:oasis:names:tc:SAML:2.0:status:Responder".to_string();

        let result = engine().validate_response(&trust(), &fixture.to_xml());
        assert!(matches!(result, Err(SpidError::InvalidResponse(_))));
    }

    #[test]
    fn test_rejects_expired_assertion() {
        let mut fixture = ResponseFixture::new("_req1");
        fixture.not_on_or_after = Utc::now() - chrono::Duration::hours(1);

        let result = engine().validate_response(&trust(), &fixture.to_xml());
        assert!(matches!(result, Err(SpidError::InvalidResponse(_))));
    }

    #[test]
    fn test_rejects_foreign_audience() {
        let mut fixture = ResponseFixture::new("_req1");
        fixture.audience = "https://other-sp.example.it".to_string();

        let result = engine().validate_response(&trust(), &fixture.to_xml());
        assert!(matches!(result, Err(SpidError::InvalidResponse(_))));
    }

    #[test]
    fn test_requires_signature_by_default() {
        let xml = ResponseFixture::new("_req1").to_xml();
        let result = SamaelEngine::new().validate_response(&trust(), &xml);
        assert!(matches!(result, Err(SpidError::Signature(_))));
    }

    #[test]
    fn test_accepts_signed_response() {
        let xml = ResponseFixture::new("_req1").to_signed_xml();
        let profile = SamaelEngine::new().validate_response(&trust(), &xml).unwrap();
        assert_eq!(profile.name_id, "_transient1");
        assert_eq!(profile.in_response_to.as_deref(), Some("_req1"));
    }

    #[test]
    fn test_rejects_forged_signature() {
        // a well-formed signature element whose value was never computed
        let xml = ResponseFixture::new("_req1").to_signed_xml();
        let start = xml.find("<ds:SignatureValue>").unwrap() + "<ds:SignatureValue>".len();
        let end = xml.find("</ds:SignatureValue>").unwrap();
        let forged = format!("{}Zm9yZ2Vk{}", &xml[..start], &xml[end..]);

        let result = SamaelEngine::new().validate_response(&trust(), &forged);
        assert!(matches!(result, Err(SpidError::Signature(_))));
    }

    #[test]
    fn test_rejects_signature_by_unlisted_key() {
        let (key, certificate) = other_signing_credentials();
        let rogue = crate::dsig::OpensslXmlSigner::from_pem(key, certificate).unwrap();
        let xml = ResponseFixture::new("_req1").sign_with(&rogue);

        let result = SamaelEngine::new().validate_response(&trust(), &xml);
        assert!(matches!(result, Err(SpidError::Signature(_))));
    }

    #[test]
    fn test_rejects_altered_signed_response() {
        let xml = ResponseFixture::new("_req1")
            .to_signed_xml()
            .replace("mario.rossi@example.it", "attacker@example.com");

        let result = SamaelEngine::new().validate_response(&trust(), &xml);
        assert!(matches!(result, Err(SpidError::Signature(_))));
    }

    struct RejectAll;

    impl SignatureVerifier for RejectAll {
        fn verify(&self, _xml: &str, certificates: &[String]) -> SpidResult<()> {
            assert!(!certificates.is_empty());
            Err(SpidError::Signature("bad signature".to_string()))
        }
    }

    #[test]
    fn test_verifier_is_consulted() {
        let xml = ResponseFixture::new("_req1").to_signed_xml();
        let engine = SamaelEngine::new().with_verifier(Arc::new(RejectAll));
        let result = engine.validate_response(&trust(), &xml);
        assert!(matches!(result, Err(SpidError::Signature(_))));
    }

    #[test]
    fn test_in_process_tracking() {
        let trust = trust();
        let engine = engine().track_requests(true);
        assert!(engine.tracks_requests());

        let request = engine
            .generate_authn_request(&trust, &RequestContext::new("posteid"), false)
            .unwrap();
        let xml = ResponseFixture::new(&request.id).to_xml();

        assert!(engine.validate_response(&trust, &xml).is_ok());
        assert!(matches!(
            engine.validate_response(&trust, &xml),
            Err(SpidError::ReplayOrUnknownRequest)
        ));
    }
}
