//! Verification of IdP signatures on SAML responses.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use openssl::hash::hash;
use openssl::memcmp;
use openssl::pkey::{PKey, Public};
use openssl::sign::Verifier;
use openssl::x509::X509;
use tracing::{debug, warn};

use super::c14n::canonicalize;
use super::document::Document;
use super::{
    crypto_err, digest_method, signature_method, SignatureVerifier, ENVELOPED_SIGNATURE, EXC_C14N,
};
use crate::cert::pem_to_der;
use crate::error::{SpidError, SpidResult};
use crate::spid::{DS_NS, SAML_NS, SAMLP_NS};

/// Enveloped-signature verifier accepting any of the IdP certificates.
///
/// For a `samlp:Response` the single assertion must carry a valid signature;
/// a signature on the response itself is checked too when present. Any
/// other document must be signed at the root.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpensslSignatureVerifier;

impl SignatureVerifier for OpensslSignatureVerifier {
    fn verify(&self, xml: &str, certificates: &[String]) -> SpidResult<()> {
        let keys = public_keys(certificates)?;
        let doc = Document::parse(xml)?;

        if doc.element(0).is(SAMLP_NS, "Response") {
            let assertions: Vec<usize> = doc
                .elements()
                .filter(|(_, e)| e.is(SAML_NS, "Assertion"))
                .map(|(i, _)| i)
                .collect();
            let assertion = match assertions.as_slice() {
                [only] if doc.element(*only).parent == Some(0) => *only,
                [] => {
                    return Err(SpidError::Signature(
                        "response carries no assertion".to_string(),
                    ))
                }
                _ => {
                    return Err(SpidError::Signature(
                        "response must carry exactly one top-level assertion".to_string(),
                    ))
                }
            };

            verify_enveloped(&doc, assertion, &keys)?;
            if doc.child(0, DS_NS, "Signature").is_some() {
                verify_enveloped(&doc, 0, &keys)?;
            }
        } else {
            verify_enveloped(&doc, 0, &keys)?;
        }

        Ok(())
    }
}

fn public_keys(certificates: &[String]) -> SpidResult<Vec<PKey<Public>>> {
    let keys: Vec<PKey<Public>> = certificates
        .iter()
        .filter_map(|pem| {
            let key = pem_to_der(pem).and_then(|der| {
                X509::from_der(&der)
                    .and_then(|cert| cert.public_key())
                    .map_err(|e| SpidError::Certificate(e.to_string()))
            });
            match key {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable IdP certificate");
                    None
                }
            }
        })
        .collect();

    if keys.is_empty() {
        return Err(SpidError::Signature(
            "no usable IdP signing certificate".to_string(),
        ));
    }
    Ok(keys)
}

/// Check the `ds:Signature` child of `target` and the reference it makes
/// back to `target`.
fn verify_enveloped(doc: &Document<'_>, target: usize, keys: &[PKey<Public>]) -> SpidResult<()> {
    let element = doc.element(target);
    let id = element
        .attribute("ID")
        .ok_or_else(|| SpidError::Signature(format!("signed {} has no ID", element.name)))?;

    let mut signatures = doc.children(target, DS_NS, "Signature");
    let signature = match (signatures.next(), signatures.next()) {
        (Some(signature), None) => signature,
        (None, _) => {
            return Err(SpidError::Signature(format!("{} is not signed", element.name)))
        }
        _ => {
            return Err(SpidError::Signature(format!(
                "{} carries more than one signature",
                element.name
            )))
        }
    };

    let signed_info = required(doc, signature, "SignedInfo")?;

    let c14n = required(doc, signed_info, "CanonicalizationMethod")?;
    if doc.element(c14n).attribute("Algorithm") != Some(EXC_C14N) {
        return Err(SpidError::Signature(
            "unsupported canonicalization method".to_string(),
        ));
    }
    let signed_info_prefixes = inclusive_prefixes(doc, c14n);

    let method = required(doc, signed_info, "SignatureMethod")?;
    let signature_digest = signature_method(algorithm(doc, method)?)?;

    let mut references = doc.children(signed_info, DS_NS, "Reference");
    let reference = match (references.next(), references.next()) {
        (Some(reference), None) => reference,
        _ => {
            return Err(SpidError::Signature(
                "signature must carry exactly one reference".to_string(),
            ))
        }
    };
    let uri = doc.element(reference).attribute("URI").unwrap_or("");
    if uri.strip_prefix('#') != Some(id) {
        return Err(SpidError::Signature(format!(
            "signature references {:?} instead of #{}",
            uri, id
        )));
    }
    // the referenced element must be unambiguous
    doc.by_id(id)?;

    let mut reference_prefixes = Vec::new();
    if let Some(transforms) = doc.child(reference, DS_NS, "Transforms") {
        for transform in doc.children(transforms, DS_NS, "Transform") {
            match algorithm(doc, transform)? {
                ENVELOPED_SIGNATURE => {}
                EXC_C14N => reference_prefixes = inclusive_prefixes(doc, transform),
                other => {
                    return Err(SpidError::Signature(format!(
                        "unsupported transform: {}",
                        other
                    )))
                }
            }
        }
    }

    let digest_alg = digest_method(algorithm(doc, required(doc, reference, "DigestMethod")?)?)?;
    let expected_digest = decode(doc, required(doc, reference, "DigestValue")?)?;
    let canonical = canonicalize(doc, target, Some(signature), &reference_prefixes)?;
    let digest = hash(digest_alg, canonical.as_bytes()).map_err(crypto_err("digest"))?;
    if digest.len() != expected_digest.len() || !memcmp::eq(&digest, &expected_digest) {
        return Err(SpidError::Signature(format!(
            "digest mismatch for {}",
            element.name
        )));
    }

    let signature_value = decode(doc, required(doc, signature, "SignatureValue")?)?;
    let signed = canonicalize(doc, signed_info, None, &signed_info_prefixes)?;
    for key in keys {
        let mut verifier =
            Verifier::new(signature_digest, key).map_err(crypto_err("verifier setup"))?;
        verifier
            .update(signed.as_bytes())
            .map_err(crypto_err("verification"))?;
        // a key of the wrong type fails here; try the next one
        if verifier.verify(&signature_value).unwrap_or(false) {
            debug!(element = %element.name, id = %id, "XML signature verified");
            return Ok(());
        }
    }

    Err(SpidError::Signature(format!(
        "signature on {} does not match any IdP certificate",
        element.name
    )))
}

fn required(doc: &Document<'_>, parent: usize, local_name: &str) -> SpidResult<usize> {
    doc.child(parent, DS_NS, local_name)
        .ok_or_else(|| SpidError::Signature(format!("signature is missing ds:{}", local_name)))
}

fn algorithm<'d>(doc: &'d Document<'_>, index: usize) -> SpidResult<&'d str> {
    let element = doc.element(index);
    element
        .attribute("Algorithm")
        .ok_or_else(|| SpidError::Signature(format!("{} has no Algorithm", element.name)))
}

fn decode(doc: &Document<'_>, index: usize) -> SpidResult<Vec<u8>> {
    STANDARD
        .decode(doc.compact_text(index))
        .map_err(|e| SpidError::Signature(format!("bad base64 in signature: {}", e)))
}

fn inclusive_prefixes(doc: &Document<'_>, method: usize) -> Vec<String> {
    doc.child(method, EXC_C14N, "InclusiveNamespaces")
        .and_then(|i| doc.element(i).attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
