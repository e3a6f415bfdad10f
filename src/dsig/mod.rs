//! XML digital signatures over SAML messages.
//!
//! Enveloped RSA signatures with exclusive canonicalization, as SPID
//! requires for assertions and POST-bound requests, plus the query-string
//! signature of the HTTP-Redirect binding.

mod c14n;
mod document;
pub mod sign;
pub mod verify;

use openssl::hash::MessageDigest;

use crate::error::{SpidError, SpidResult};

pub use sign::{remove_enveloped_signature, OpensslXmlSigner};
pub use verify::OpensslSignatureVerifier;

pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

/// Signs outgoing SAML messages with the SP key.
pub trait XmlSigner: Send + Sync {
    /// Return `xml` with an enveloped signature referencing `reference_id`.
    fn sign(&self, xml: &str, reference_id: &str) -> SpidResult<String>;

    /// Sign an HTTP-Redirect query (`SAMLRequest=..[&RelayState=..]&SigAlg=..`),
    /// returning the base64 signature.
    fn sign_query(&self, query: &str) -> SpidResult<String>;

    /// `SigAlg` URI announced next to query signatures.
    fn signature_algorithm(&self) -> &'static str {
        RSA_SHA256
    }
}

/// Verifies an XML signature against the issuer's certificates.
pub trait SignatureVerifier: Send + Sync {
    /// Accept if any of `certificates` (PEM) verifies the document.
    fn verify(&self, xml: &str, certificates: &[String]) -> SpidResult<()>;
}

fn digest_method(algorithm: &str) -> SpidResult<MessageDigest> {
    match algorithm {
        SHA256 => Ok(MessageDigest::sha256()),
        SHA384 => Ok(MessageDigest::sha384()),
        SHA512 => Ok(MessageDigest::sha512()),
        other => Err(SpidError::Signature(format!(
            "unsupported digest algorithm: {}",
            other
        ))),
    }
}

fn signature_method(algorithm: &str) -> SpidResult<MessageDigest> {
    match algorithm {
        RSA_SHA256 => Ok(MessageDigest::sha256()),
        RSA_SHA384 => Ok(MessageDigest::sha384()),
        RSA_SHA512 => Ok(MessageDigest::sha512()),
        other => Err(SpidError::Signature(format!(
            "unsupported signature algorithm: {}",
            other
        ))),
    }
}

fn crypto_err(context: &str) -> impl Fn(openssl::error::ErrorStack) -> SpidError + '_ {
    move |e| SpidError::Signature(format!("{}: {}", context, e))
}
