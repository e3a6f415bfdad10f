//! SPID rewriting of drafted AuthnRequests.
//!
//! A generic SAML draft lacks several elements SPID IdPs insist on. The
//! tamperer reads the draft and writes a new request carrying the SPID shape:
//! qualified `Issuer`, transient `NameIDPolicy`, minimum-comparison
//! `RequestedAuthnContext`, `ForceAuthn` above level 1 and the attribute
//! consuming service index.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

use crate::dsig::XmlSigner;
use crate::error::{SpidError, SpidResult};
use crate::spid::{SpidLevel, NAMEID_FORMAT_ENTITY, NAMEID_FORMAT_TRANSIENT, SAML_NS, SAMLP_NS};
use crate::trust::TrustConfiguration;
use crate::xml::{attribute, is_element};

/// Rewrites a drafted AuthnRequest before it leaves the SP.
pub trait RequestTamperer: Send + Sync {
    fn tamper(&self, trust: &TrustConfiguration, xml: &str) -> SpidResult<String>;
}

/// Default SPID tamperer.
#[derive(Default)]
pub struct SpidTamperer {
    signer: Option<Arc<dyn XmlSigner>>,
}

impl SpidTamperer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signer(mut self, signer: Arc<dyn XmlSigner>) -> Self {
        self.signer = Some(signer);
        self
    }
}

#[derive(Default)]
struct Draft {
    id: Option<String>,
    issue_instant: Option<String>,
    destination: Option<String>,
    acs_url: Option<String>,
    protocol_binding: Option<String>,
    is_passive: bool,
    issuer: Option<String>,
    level: Option<SpidLevel>,
}

fn read_draft(xml: &str) -> SpidResult<Draft> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut draft = Draft::default();
    let mut seen_root = false;
    let mut text_target: Option<&'static str> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SpidError::Tamper(format!("malformed AuthnRequest: {}", e)))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if !seen_root {
                    if !is_element(e, "AuthnRequest") {
                        return Err(SpidError::Tamper("root element is not AuthnRequest".to_string()));
                    }
                    seen_root = true;
                    draft.id = attribute(e, "ID")?;
                    draft.issue_instant = attribute(e, "IssueInstant")?;
                    draft.destination = attribute(e, "Destination")?;
                    draft.acs_url = attribute(e, "AssertionConsumerServiceURL")?;
                    draft.protocol_binding = attribute(e, "ProtocolBinding")?;
                    draft.is_passive = attribute(e, "IsPassive")?.as_deref() == Some("true");
                } else if is_element(e, "Issuer") {
                    text_target = Some("Issuer");
                } else if is_element(e, "AuthnContextClassRef") {
                    text_target = Some("AuthnContextClassRef");
                }
            }
            Event::Text(ref t) => {
                if let Some(target) = text_target.take() {
                    let text = t
                        .unescape()
                        .map_err(|e| SpidError::Tamper(format!("bad text in {}: {}", target, e)))?;
                    match target {
                        "Issuer" => draft.issuer = Some(text.trim().to_string()),
                        _ => draft.level = SpidLevel::from_uri(&text),
                    }
                }
            }
            Event::End(_) => text_target = None,
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(SpidError::Tamper("empty AuthnRequest".to_string()));
    }

    Ok(draft)
}

fn required(value: Option<String>, name: &str) -> SpidResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SpidError::Tamper(format!("AuthnRequest has no {}", name)))
}

fn write_err(e: impl std::fmt::Display) -> SpidError {
    SpidError::Tamper(format!("failed to write AuthnRequest: {}", e))
}

impl RequestTamperer for SpidTamperer {
    fn tamper(&self, trust: &TrustConfiguration, xml: &str) -> SpidResult<String> {
        let draft = read_draft(xml)?;
        let sp = trust.service_provider();

        let id = required(draft.id, "ID")?;
        let issue_instant = required(draft.issue_instant, "IssueInstant")?;
        let destination = required(draft.destination, "Destination")?;
        let issuer = required(draft.issuer, "Issuer")?;
        let level = draft
            .level
            .ok_or_else(|| SpidError::Tamper("AuthnRequest has no SPID level".to_string()))?;
        let acs_url = draft.acs_url.unwrap_or_else(|| sp.callback_url.clone());
        let acs_index = sp.attribute_consuming_service_index.to_string();

        let mut root = BytesStart::new("samlp:AuthnRequest");
        root.push_attribute(("xmlns:samlp", SAMLP_NS));
        root.push_attribute(("xmlns:saml", SAML_NS));
        root.push_attribute(("ID", id.as_str()));
        root.push_attribute(("Version", "2.0"));
        root.push_attribute(("IssueInstant", issue_instant.as_str()));
        root.push_attribute(("Destination", destination.as_str()));
        root.push_attribute(("AssertionConsumerServiceURL", acs_url.as_str()));
        if let Some(binding) = &draft.protocol_binding {
            root.push_attribute(("ProtocolBinding", binding.as_str()));
        }
        root.push_attribute(("AttributeConsumingServiceIndex", acs_index.as_str()));
        if level.requires_force_authn() {
            root.push_attribute(("ForceAuthn", "true"));
        }
        if draft.is_passive {
            root.push_attribute(("IsPassive", "true"));
        }

        let mut issuer_elem = BytesStart::new("saml:Issuer");
        issuer_elem.push_attribute(("NameQualifier", issuer.as_str()));
        issuer_elem.push_attribute(("Format", NAMEID_FORMAT_ENTITY));

        let mut name_id_policy = BytesStart::new("samlp:NameIDPolicy");
        name_id_policy.push_attribute(("Format", NAMEID_FORMAT_TRANSIENT));

        let mut authn_context = BytesStart::new("samlp:RequestedAuthnContext");
        authn_context.push_attribute(("Comparison", "minimum"));

        let mut writer = Writer::new(Cursor::new(Vec::new()));
        let events = [
            Event::Start(root),
            Event::Start(issuer_elem),
            Event::Text(BytesText::new(&issuer)),
            Event::End(BytesEnd::new("saml:Issuer")),
            Event::Empty(name_id_policy),
            Event::Start(authn_context),
            Event::Start(BytesStart::new("saml:AuthnContextClassRef")),
            Event::Text(BytesText::new(level.uri())),
            Event::End(BytesEnd::new("saml:AuthnContextClassRef")),
            Event::End(BytesEnd::new("samlp:RequestedAuthnContext")),
            Event::End(BytesEnd::new("samlp:AuthnRequest")),
        ];
        for event in events {
            writer.write_event(event).map_err(write_err)?;
        }

        let tampered = String::from_utf8(writer.into_inner().into_inner()).map_err(write_err)?;

        debug!(request_id = %id, level = %level, "AuthnRequest rewritten for SPID");

        match &self.signer {
            Some(signer) => signer.sign(&tampered, &id),
            None => Ok(tampered),
        }
    }
}
