//! Shared fixtures for unit tests.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509NameBuilder, X509};
use std::sync::{Arc, OnceLock};

use crate::dsig::{OpensslXmlSigner, XmlSigner};
use crate::metadata::{IdentityProviderDescriptor, IdpMap};
use crate::spid::{
    SpidLevel, DS_NS, HTTP_POST_BINDING, HTTP_REDIRECT_BINDING, MD_NS, NAMEID_FORMAT_ENTITY,
    NAMEID_FORMAT_TRANSIENT, SAML_NS, SAMLP_NS, STATUS_SUCCESS,
};
use crate::trust::{SharedTrust, SpConfig, TrustConfiguration};

pub(crate) const SP_ISSUER: &str = "https://sp.example.it";
pub(crate) const SP_ACS_URL: &str = "https://sp.example.it/acs";
pub(crate) const IDP_ENTITY_ID: &str = "https://posteid.poste.it";

/// Self-signed RSA key pair as (private key PEM, certificate PEM).
fn generate_credentials(common_name: &str) -> (String, String) {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (
        String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap(),
        String::from_utf8(builder.build().to_pem().unwrap()).unwrap(),
    )
}

fn signing_credentials() -> &'static (String, String) {
    static CREDENTIALS: OnceLock<(String, String)> = OnceLock::new();
    CREDENTIALS.get_or_init(|| generate_credentials("sp.example.it"))
}

/// Key pair shared by the test SP and the test IdPs.
pub(crate) fn signing_key_pem() -> &'static str {
    &signing_credentials().0
}

pub(crate) fn signing_certificate_pem() -> &'static str {
    &signing_credentials().1
}

/// A key pair nobody trusts.
pub(crate) fn other_signing_credentials() -> (&'static str, &'static str) {
    static CREDENTIALS: OnceLock<(String, String)> = OnceLock::new();
    let (key, certificate) = CREDENTIALS.get_or_init(|| generate_credentials("rogue.example.com"));
    (key.as_str(), certificate.as_str())
}

pub(crate) fn test_signer() -> OpensslXmlSigner {
    OpensslXmlSigner::from_pem(signing_key_pem(), signing_certificate_pem()).unwrap()
}

fn instant(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn sp_config() -> SpConfig {
    SpConfig {
        issuer: SP_ISSUER.to_string(),
        callback_url: SP_ACS_URL.to_string(),
        private_key_pem: signing_key_pem().to_string(),
        certificate_pem: signing_certificate_pem().to_string(),
        ..Default::default()
    }
}

pub(crate) fn descriptor(entity_id: &str) -> IdentityProviderDescriptor {
    IdentityProviderDescriptor {
        entity_id: entity_id.to_string(),
        signing_certificates: vec![signing_certificate_pem().to_string()],
        sso_url: format!("{}/sso-redirect", entity_id),
        slo_url: format!("{}/slo-redirect", entity_id),
    }
}

/// Trust configuration with PosteID as `posteid`.
pub(crate) fn trust() -> TrustConfiguration {
    let mut idps = IdpMap::new();
    idps.insert("posteid".to_string(), descriptor(IDP_ENTITY_ID));
    TrustConfiguration::new(sp_config(), idps).unwrap()
}

pub(crate) fn shared_trust() -> Arc<SharedTrust> {
    Arc::new(SharedTrust::new(trust()))
}

/// IdP `EntityDescriptor` with two signing keys, redirect and POST SSO and a
/// redirect SLO endpoint.
pub(crate) fn idp_entity(entity_id: &str) -> String {
    format!(
        r#"<md:EntityDescriptor xmlns:md="{MD_NS}" xmlns:ds="{DS_NS}" entityID="{entity_id}">
    <md:IDPSSODescriptor protocolSupportEnumeration="{SAMLP_NS}" WantAuthnRequestsSigned="true">
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo><ds:X509Data><ds:X509Certificate>U0lHTklOR0tFWU9ORQ==</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
        </md:KeyDescriptor>
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo><ds:X509Data><ds:X509Certificate>U0lHTklOR0tFWVRXTw==</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
        </md:KeyDescriptor>
        <md:SingleLogoutService Binding="{HTTP_REDIRECT_BINDING}" Location="{entity_id}/slo-redirect"/>
        <md:SingleSignOnService Binding="{HTTP_POST_BINDING}" Location="{entity_id}/sso-post"/>
        <md:SingleSignOnService Binding="{HTTP_REDIRECT_BINDING}" Location="{entity_id}/sso-redirect"/>
    </md:IDPSSODescriptor>
</md:EntityDescriptor>"#
    )
}

pub(crate) fn entities_descriptor(entities: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntitiesDescriptor xmlns:md="{MD_NS}" xmlns:ds="{DS_NS}" Name="https://registry.spid.gov.it">
{}
</md:EntitiesDescriptor>"#,
        entities.join("\n")
    )
}

/// Drafted AuthnRequest for PosteID.
pub(crate) fn request_xml(id: &str) -> String {
    request_xml_at(id, Utc::now(), SpidLevel::L2)
}

pub(crate) fn request_xml_at(id: &str, issued_at: DateTime<Utc>, level: SpidLevel) -> String {
    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{id}" Version="2.0" IssueInstant="{}" Destination="{IDP_ENTITY_ID}/sso-redirect" AssertionConsumerServiceURL="{SP_ACS_URL}" ProtocolBinding="{HTTP_POST_BINDING}"><saml:Issuer>{SP_ISSUER}</saml:Issuer><samlp:RequestedAuthnContext><saml:AuthnContextClassRef>{}</saml:AuthnContextClassRef></samlp:RequestedAuthnContext></samlp:AuthnRequest>"#,
        instant(issued_at),
        level.uri()
    )
}

/// IdP response, valid for the SP of [`sp_config`] by default.
pub(crate) struct ResponseFixture {
    pub in_response_to: Option<String>,
    pub issuer: String,
    pub destination: String,
    pub status: String,
    pub issue_instant: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
    pub audience: String,
    pub level: SpidLevel,
}

impl ResponseFixture {
    pub fn new(in_response_to: &str) -> Self {
        Self {
            in_response_to: Some(in_response_to.to_string()),
            issuer: IDP_ENTITY_ID.to_string(),
            destination: SP_ACS_URL.to_string(),
            status: STATUS_SUCCESS.to_string(),
            issue_instant: Utc::now(),
            not_on_or_after: Utc::now() + Duration::minutes(5),
            audience: SP_ISSUER.to_string(),
            level: SpidLevel::L2,
        }
    }

    /// The response with its assertion signed by the test IdP key.
    pub fn to_signed_xml(&self) -> String {
        self.sign_with(&test_signer())
    }

    pub fn sign_with(&self, signer: &dyn XmlSigner) -> String {
        signer.sign(&self.to_xml(), "_assert1").unwrap()
    }

    pub fn to_xml(&self) -> String {
        let issued = instant(self.issue_instant);
        let not_before = instant(self.issue_instant - Duration::minutes(1));
        let not_on_or_after = instant(self.not_on_or_after);
        let in_response_to = self
            .in_response_to
            .as_ref()
            .map(|id| format!(r#" InResponseTo="{}""#, id))
            .unwrap_or_default();
        let issuer = &self.issuer;

        format!(
            r#"<samlp:Response xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="_resp1" Version="2.0" IssueInstant="{issued}" Destination="{destination}"{in_response_to}>
    <saml:Issuer Format="{NAMEID_FORMAT_ENTITY}">{issuer}</saml:Issuer>
    <samlp:Status><samlp:StatusCode Value="{status}"/></samlp:Status>
    <saml:Assertion ID="_assert1" Version="2.0" IssueInstant="{issued}">
        <saml:Issuer Format="{NAMEID_FORMAT_ENTITY}">{issuer}</saml:Issuer>
        <saml:Subject>
            <saml:NameID Format="{NAMEID_FORMAT_TRANSIENT}" NameQualifier="{issuer}">_transient1</saml:NameID>
            <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
                <saml:SubjectConfirmationData{in_response_to} NotOnOrAfter="{not_on_or_after}" Recipient="{destination}"/>
            </saml:SubjectConfirmation>
        </saml:Subject>
        <saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}">
            <saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction>
        </saml:Conditions>
        <saml:AuthnStatement AuthnInstant="{issued}" SessionIndex="_session1">
            <saml:AuthnContext><saml:AuthnContextClassRef>{level}</saml:AuthnContextClassRef></saml:AuthnContext>
        </saml:AuthnStatement>
        <saml:AttributeStatement>
            <saml:Attribute Name="fiscalNumber"><saml:AttributeValue>TINIT-RSSMRA80A01H501U</saml:AttributeValue></saml:Attribute>
            <saml:Attribute Name="email"><saml:AttributeValue>mario.rossi@example.it</saml:AttributeValue></saml:Attribute>
        </saml:AttributeStatement>
    </saml:Assertion>
</samlp:Response>"#,
            destination = self.destination,
            status = self.status,
            audience = self.audience,
            level = self.level.uri(),
        )
    }
}

/// ACS form body carrying `xml`.
pub(crate) fn post_body(xml: &str) -> String {
    format!(
        "RelayState=%2F&SAMLResponse={}",
        urlencoding::encode(&BASE64.encode(xml))
    )
}
