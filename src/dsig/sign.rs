//! SP-side signing of AuthnRequests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use openssl::hash::{hash, MessageDigest};
use openssl::pkey::{Id, PKey, Private};
use openssl::sign::Signer;
use openssl::x509::X509;
use tracing::debug;

use super::c14n::canonicalize;
use super::document::Document;
use super::{crypto_err, XmlSigner, ENVELOPED_SIGNATURE, EXC_C14N, RSA_SHA256, SHA256};
use crate::cert::{pem_body, pem_to_der};
use crate::error::{SpidError, SpidResult};
use crate::spid::{DS_NS, SAML_NS};
use crate::trust::SpConfig;
use crate::xml::escape;

/// RSA-SHA256 signer holding the SP key pair.
pub struct OpensslXmlSigner {
    key: PKey<Private>,
    certificate: String,
}

impl std::fmt::Debug for OpensslXmlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpensslXmlSigner")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl OpensslXmlSigner {
    /// Load an RSA private key and the certificate published for it.
    pub fn from_pem(private_key_pem: &str, certificate_pem: &str) -> SpidResult<Self> {
        let key = PKey::private_key_from_pem(private_key_pem.as_bytes())
            .map_err(|e| SpidError::Certificate(format!("failed to load SP private key: {}", e)))?;
        if key.id() != Id::RSA {
            return Err(SpidError::Certificate(
                "SP private key must be an RSA key".to_string(),
            ));
        }

        let certificate = X509::from_der(&pem_to_der(certificate_pem)?)
            .map_err(|e| SpidError::Certificate(format!("failed to load SP certificate: {}", e)))?;
        let public = certificate
            .public_key()
            .map_err(|e| SpidError::Certificate(format!("bad SP certificate key: {}", e)))?;
        if !public.public_eq(&key) {
            return Err(SpidError::Certificate(
                "SP private key does not match the SP certificate".to_string(),
            ));
        }

        Ok(Self {
            key,
            certificate: pem_body(certificate_pem),
        })
    }

    pub fn from_sp_config(sp: &SpConfig) -> SpidResult<Self> {
        if sp.private_key_pem.trim().is_empty() {
            return Err(SpidError::Config(
                "SP private_key_pem is required to sign requests".to_string(),
            ));
        }
        Self::from_pem(&sp.private_key_pem, &sp.certificate_pem)
    }

    fn raw_signature(&self, data: &[u8]) -> SpidResult<Vec<u8>> {
        let mut signer =
            Signer::new(MessageDigest::sha256(), &self.key).map_err(crypto_err("signer setup"))?;
        signer.update(data).map_err(crypto_err("signing"))?;
        signer.sign_to_vec().map_err(crypto_err("signing"))
    }

    fn signature_template(&self, reference_id: &str, digest: &str) -> String {
        format!(
            concat!(
                r#"<ds:Signature xmlns:ds="{ds}"><ds:SignedInfo>"#,
                r#"<ds:CanonicalizationMethod Algorithm="{c14n}"/>"#,
                r#"<ds:SignatureMethod Algorithm="{alg}"/>"#,
                r##"<ds:Reference URI="#{id}"><ds:Transforms>"##,
                r#"<ds:Transform Algorithm="{enveloped}"/><ds:Transform Algorithm="{c14n}"/>"#,
                r#"</ds:Transforms><ds:DigestMethod Algorithm="{digest_alg}"/>"#,
                r#"<ds:DigestValue>{digest}</ds:DigestValue></ds:Reference></ds:SignedInfo>"#,
                r#"<ds:SignatureValue></ds:SignatureValue><ds:KeyInfo><ds:X509Data>"#,
                r#"<ds:X509Certificate>{cert}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>"#,
                r#"</ds:Signature>"#
            ),
            ds = DS_NS,
            c14n = EXC_C14N,
            alg = RSA_SHA256,
            id = escape(reference_id),
            enveloped = ENVELOPED_SIGNATURE,
            digest_alg = SHA256,
            digest = digest,
            cert = self.certificate,
        )
    }
}

impl XmlSigner for OpensslXmlSigner {
    fn sign(&self, xml: &str, reference_id: &str) -> SpidResult<String> {
        let doc = Document::parse(xml)?;
        let target = doc.by_id(reference_id)?;
        let element = doc.element(target);
        if element.start_tag_end == element.end {
            return Err(SpidError::Signature(format!(
                "element {} has no content to hold a signature",
                reference_id
            )));
        }
        if doc.child(target, DS_NS, "Signature").is_some() {
            return Err(SpidError::Signature(format!(
                "element {} is already signed",
                reference_id
            )));
        }

        let canonical = canonicalize(&doc, target, None, &[])?;
        let digest =
            hash(MessageDigest::sha256(), canonical.as_bytes()).map_err(crypto_err("digest"))?;

        // the signature follows the Issuer when there is one
        let insert_at = doc
            .child(target, SAML_NS, "Issuer")
            .map(|issuer| doc.element(issuer).end)
            .unwrap_or(element.start_tag_end);

        let mut signed = String::with_capacity(xml.len() + 2048);
        signed.push_str(&xml[..insert_at]);
        signed.push_str(&self.signature_template(reference_id, &STANDARD.encode(digest)));
        signed.push_str(&xml[insert_at..]);

        let value_at = {
            let doc = Document::parse(&signed)?;
            let target = doc.by_id(reference_id)?;
            let signature = doc
                .child(target, DS_NS, "Signature")
                .ok_or_else(|| SpidError::Signature("signature template lost".to_string()))?;
            let signed_info = doc
                .child(signature, DS_NS, "SignedInfo")
                .ok_or_else(|| SpidError::Signature("signature template lost".to_string()))?;
            let value = doc
                .child(signature, DS_NS, "SignatureValue")
                .ok_or_else(|| SpidError::Signature("signature template lost".to_string()))?;

            let canonical = canonicalize(&doc, signed_info, None, &[])?;
            let signature_value = STANDARD.encode(self.raw_signature(canonical.as_bytes())?);
            (doc.element(value).start_tag_end, signature_value)
        };
        signed.insert_str(value_at.0, &value_at.1);

        debug!(reference = %reference_id, "XML document signed");
        Ok(signed)
    }

    fn sign_query(&self, query: &str) -> SpidResult<String> {
        Ok(STANDARD.encode(self.raw_signature(query.as_bytes())?))
    }
}

/// Drop the enveloped signature of the root element, if any.
///
/// The HTTP-Redirect binding carries the signature in the query string
/// instead.
pub fn remove_enveloped_signature(xml: &str) -> SpidResult<String> {
    let doc = Document::parse(xml)?;
    match doc.child(0, DS_NS, "Signature") {
        Some(signature) => {
            let element = doc.element(signature);
            let mut stripped = String::with_capacity(xml.len());
            stripped.push_str(&xml[..element.start]);
            stripped.push_str(&xml[element.end..]);
            Ok(stripped)
        }
        None => Ok(xml.to_string()),
    }
}
