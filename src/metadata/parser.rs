//! SAML2 metadata parsing.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::types::{IdpMap, IdpMetadataRecord};
use crate::cert::to_pem;
use crate::error::{SpidError, SpidResult};
use crate::spid::{HTTP_POST_BINDING, HTTP_REDIRECT_BINDING};
use crate::xml::{attribute, is_element};

/// Parse an `EntitiesDescriptor` or `EntityDescriptor` document into the IdP
/// records it contains. Entities without an `IDPSSODescriptor` are ignored.
pub fn parse_idp_metadata(xml: &str) -> SpidResult<Vec<IdpMetadataRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut entity: Option<EntityState> = None;
    let mut in_idp = false;
    let mut signing_key: Option<bool> = None;
    let mut in_certificate = false;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| {
            SpidError::Parse(format!(
                "malformed metadata at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(ref e) => {
                depth += 1;
                handle_start(e, &mut entity, &mut in_idp, &mut signing_key)?;
                if signing_key.is_some() && is_element(e, "X509Certificate") {
                    in_certificate = true;
                }
            }
            Event::Empty(ref e) => {
                // empty containers carry no children worth tracking
                if !is_element(e, "EntityDescriptor")
                    && !is_element(e, "IDPSSODescriptor")
                    && !is_element(e, "KeyDescriptor")
                {
                    handle_start(e, &mut entity, &mut in_idp, &mut signing_key)?;
                }
            }
            Event::Text(ref t) if in_certificate => {
                let text = t
                    .unescape()
                    .map_err(|e| SpidError::Parse(format!("bad certificate text: {}", e)))?;
                if signing_key == Some(true) && in_idp {
                    if let Some(state) = entity.as_mut() {
                        let pem = to_pem(&text);
                        if !state.certificates.contains(&pem) {
                            state.certificates.push(pem);
                        }
                    }
                }
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                let name = e.local_name();
                match name.as_ref() {
                    b"X509Certificate" => in_certificate = false,
                    b"KeyDescriptor" => signing_key = None,
                    b"IDPSSODescriptor" => in_idp = false,
                    b"EntityDescriptor" => {
                        if let Some(state) = entity.take() {
                            if state.is_idp {
                                records.push(state.into_record());
                            } else {
                                debug!(entity_id = %state.entity_id, "Skipping non-IdP entity");
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => {
                if depth > 0 || entity.is_some() {
                    return Err(SpidError::Parse(format!(
                        "metadata truncated with {} unclosed element(s)",
                        depth
                    )));
                }
                break;
            }
            _ => {}
        }
    }

    Ok(records)
}

/// Keep only records whose entity ID is recognized, keyed by alias.
///
/// Returns the map and the recognized entity IDs that were not found.
pub fn filter_recognized(
    records: Vec<IdpMetadataRecord>,
    recognized: &BTreeMap<String, String>,
) -> (IdpMap, Vec<String>) {
    let mut providers = IdpMap::new();

    for record in records {
        let Some(alias) = recognized.get(&record.entity_id) else {
            debug!(entity_id = %record.entity_id, "Ignoring unrecognized IdP");
            continue;
        };

        let entity_id = record.entity_id.clone();
        match record.into_descriptor() {
            Some(descriptor) => {
                providers.insert(alias.clone(), descriptor);
            }
            None => {
                warn!(
                    entity_id = %entity_id,
                    "IdP metadata lacks signing certificate or SSO endpoint, skipping"
                );
            }
        }
    }

    let missing = recognized
        .iter()
        .filter(|(_, alias)| !providers.contains_key(*alias))
        .map(|(entity_id, _)| entity_id.clone())
        .collect();

    (providers, missing)
}

struct EntityState {
    entity_id: String,
    is_idp: bool,
    certificates: Vec<String>,
    sso_redirect: Option<String>,
    sso_post: Option<String>,
    slo_redirect: Option<String>,
}

impl EntityState {
    fn into_record(self) -> IdpMetadataRecord {
        IdpMetadataRecord {
            entity_id: self.entity_id,
            signing_certificates: self.certificates,
            sso_url: self.sso_redirect.or(self.sso_post),
            slo_url: self.slo_redirect,
        }
    }
}

fn handle_start(
    e: &BytesStart<'_>,
    entity: &mut Option<EntityState>,
    in_idp: &mut bool,
    signing_key: &mut Option<bool>,
) -> SpidResult<()> {
    if is_element(e, "EntityDescriptor") {
        let entity_id = attribute(e, "entityID")?
            .ok_or_else(|| SpidError::Parse("EntityDescriptor without entityID".to_string()))?;
        *entity = Some(EntityState {
            entity_id,
            is_idp: false,
            certificates: Vec::new(),
            sso_redirect: None,
            sso_post: None,
            slo_redirect: None,
        });
        return Ok(());
    }

    let Some(state) = entity.as_mut() else {
        return Ok(());
    };

    if is_element(e, "IDPSSODescriptor") {
        state.is_idp = true;
        *in_idp = true;
    } else if *in_idp && is_element(e, "KeyDescriptor") {
        let key_use = attribute(e, "use")?;
        *signing_key = Some(matches!(key_use.as_deref(), None | Some("signing")));
    } else if *in_idp && is_element(e, "SingleSignOnService") {
        let binding = attribute(e, "Binding")?;
        let location = attribute(e, "Location")?;
        match binding.as_deref() {
            Some(HTTP_REDIRECT_BINDING) => state.sso_redirect = location,
            Some(HTTP_POST_BINDING) => state.sso_post = location,
            _ => {}
        }
    } else if *in_idp && is_element(e, "SingleLogoutService") {
        if attribute(e, "Binding")?.as_deref() == Some(HTTP_REDIRECT_BINDING) {
            state.slo_redirect = attribute(e, "Location")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entities_descriptor, idp_entity};

    #[test]
    fn test_parse_entities_descriptor() {
        let xml = entities_descriptor(&[
            idp_entity("https://posteid.poste.it"),
            idp_entity("https://identity.infocert.it"),
        ]);

        let records = parse_idp_metadata(&xml).unwrap();
        assert_eq!(records.len(), 2);

        let poste = &records[0];
        assert_eq!(poste.entity_id, "https://posteid.poste.it");
        assert_eq!(poste.signing_certificates.len(), 2);
        assert!(poste.signing_certificates[0].starts_with("-----BEGIN CERTIFICATE-----"));
        assert_eq!(
            poste.sso_url.as_deref(),
            Some("https://posteid.poste.it/sso-redirect")
        );
        assert_eq!(
            poste.slo_url.as_deref(),
            Some("https://posteid.poste.it/slo-redirect")
        );
    }

    #[test]
    fn test_parse_single_entity_descriptor() {
        let xml = idp_entity("https://validator.spid.gov.it");
        let records = parse_idp_metadata(&xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_id, "https://validator.spid.gov.it");
    }

    #[test]
    fn test_skips_encryption_keys_and_sp_entities() {
        let xml = format!(
            r#"<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
                <md:EntityDescriptor entityID="https://sp.example.it">
                    <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/>
                </md:EntityDescriptor>
                <md:EntityDescriptor entityID="https://idp.example.it">
                    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
                        <md:KeyDescriptor use="encryption">
                            <ds:KeyInfo><ds:X509Data><ds:X509Certificate>RU5D</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
                        </md:KeyDescriptor>
                        <md:KeyDescriptor>
                            <ds:KeyInfo><ds:X509Data><ds:X509Certificate>U0lH</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
                        </md:KeyDescriptor>
                        <md:SingleSignOnService Binding="{}" Location="https://idp.example.it/post"/>
                    </md:IDPSSODescriptor>
                </md:EntityDescriptor>
            </md:EntitiesDescriptor>"#,
            HTTP_POST_BINDING
        );

        let records = parse_idp_metadata(&xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].signing_certificates.len(), 1);
        assert!(records[0].signing_certificates[0].contains("U0lH"));
        // POST binding is used when no redirect endpoint exists
        assert_eq!(
            records[0].sso_url.as_deref(),
            Some("https://idp.example.it/post")
        );
        assert_eq!(records[0].slo_url, None);
    }

    #[test]
    fn test_malformed_metadata() {
        let result = parse_idp_metadata("<md:EntitiesDescriptor><md:EntityDescriptor>");
        assert!(matches!(result, Err(SpidError::Parse(_)))); // no entityID

        let result = parse_idp_metadata("<a><b></a>");
        assert!(matches!(result, Err(SpidError::Parse(_))));
    }

    #[test]
    fn test_truncated_metadata_is_rejected() {
        let xml = entities_descriptor(&[
            idp_entity("https://posteid.poste.it"),
            idp_entity("https://spid.intesa.it"),
        ]);
        let cut = xml.rfind("</md:KeyDescriptor>").unwrap() + "</md:KeyDescriptor>".len();
        let truncated = &xml[..cut];

        let result = parse_idp_metadata(truncated);
        assert!(matches!(result, Err(SpidError::Parse(_))));
    }

    #[test]
    fn test_filter_recognized() {
        let xml = entities_descriptor(&[
            idp_entity("https://posteid.poste.it"),
            idp_entity("https://rogue.example.com"),
        ]);
        let records = parse_idp_metadata(&xml).unwrap();

        let mut recognized = BTreeMap::new();
        recognized.insert("https://posteid.poste.it".to_string(), "posteid".to_string());
        recognized.insert("https://spid.intesa.it".to_string(), "intesaid".to_string());

        let (providers, missing) = filter_recognized(records, &recognized);
        assert_eq!(providers.len(), 1);
        assert!(providers.contains_key("posteid"));
        assert!(providers
            .values()
            .all(|p| p.entity_id != "https://rogue.example.com"));
        assert_eq!(missing, vec!["https://spid.intesa.it".to_string()]);
    }
}
