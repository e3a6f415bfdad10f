//! AuthnRequest and its HTTP bindings.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Write;

use crate::dsig::{remove_enveloped_signature, XmlSigner};
use crate::error::{SpidError, SpidResult};

/// An AuthnRequest ready to be sent to an IdP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnRequest {
    /// Request `ID`, echoed back as `InResponseTo`.
    pub id: String,
    /// Request XML.
    pub xml: String,
    /// IdP SSO endpoint.
    pub sso_url: String,
}

impl AuthnRequest {
    /// HTTP-Redirect binding URL.
    ///
    /// With a signer, the enveloped XML signature is dropped and the query
    /// is signed instead (`SigAlg` and `Signature`). `additional_params` are
    /// appended last and are not covered by the signature.
    pub fn redirect_url(
        &self,
        relay_state: Option<&str>,
        additional_params: &BTreeMap<String, String>,
        signer: Option<&dyn XmlSigner>,
    ) -> SpidResult<String> {
        let xml = match signer {
            Some(_) => Cow::Owned(remove_enveloped_signature(&self.xml)?),
            None => Cow::Borrowed(self.xml.as_str()),
        };
        let encoded = deflate_and_encode(&xml)?;

        let mut query = format!("SAMLRequest={}", urlencoding::encode(&encoded));

        if let Some(state) = relay_state {
            query.push_str(&format!("&RelayState={}", urlencoding::encode(state)));
        }

        if let Some(signer) = signer {
            query.push_str(&format!(
                "&SigAlg={}",
                urlencoding::encode(signer.signature_algorithm())
            ));
            let signature = signer.sign_query(&query)?;
            query.push_str(&format!("&Signature={}", urlencoding::encode(&signature)));
        }

        for (key, value) in additional_params {
            query.push_str(&format!(
                "&{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            ));
        }

        let separator = if self.sso_url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}", self.sso_url, separator, query))
    }

    /// `SAMLRequest` form value for the HTTP-POST binding.
    pub fn post_form_value(&self) -> String {
        BASE64.encode(self.xml.as_bytes())
    }
}

/// Deflate and base64 encode for SAML redirect binding.
fn deflate_and_encode(xml: &str) -> SpidResult<String> {
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .and_then(|_| encoder.finish())
        .map(|compressed| BASE64.encode(compressed))
        .map_err(|e| SpidError::Parse(format!("failed to deflate AuthnRequest: {}", e)))
}
