//! Certificate helpers and the SP certificate expiry monitor.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::{error, info, warn};
use x509_parser::prelude::*;

use crate::error::{SpidError, SpidResult};

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// Remaining validity below which the certificate is reported as a warning.
pub const EXPIRY_WARNING_DAYS: i64 = 60;

/// Classification of the SP certificate's remaining validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateExpiry {
    /// More than [`EXPIRY_WARNING_DAYS`] left.
    Valid {
        not_after: DateTime<Utc>,
        days_left: i64,
    },
    /// Within [`EXPIRY_WARNING_DAYS`] of expiry.
    ExpiringSoon {
        not_after: DateTime<Utc>,
        days_left: i64,
    },
    /// Already expired.
    Expired { not_after: DateTime<Utc> },
    /// The certificate carries no usable expiry date.
    MissingExpiry,
}

/// Classify an expiry date relative to `now`.
pub fn classify_expiry(not_after: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CertificateExpiry {
    let not_after = match not_after {
        // 99991231235959Z means "no well-defined expiration date"
        Some(t) if t.year() < 9999 => t,
        _ => return CertificateExpiry::MissingExpiry,
    };

    if now >= not_after {
        return CertificateExpiry::Expired { not_after };
    }

    let days_left = (not_after - now).num_days();
    if days_left > EXPIRY_WARNING_DAYS {
        CertificateExpiry::Valid {
            not_after,
            days_left,
        }
    } else {
        CertificateExpiry::ExpiringSoon {
            not_after,
            days_left,
        }
    }
}

/// Parse a PEM certificate and classify its expiry.
pub fn check_certificate_expiry(pem: &str, now: DateTime<Utc>) -> SpidResult<CertificateExpiry> {
    let der = pem_to_der(pem)?;
    let not_after = certificate_not_after(&der)?;
    Ok(classify_expiry(not_after, now))
}

/// Check the SP certificate and log the outcome.
///
/// Advisory only: parse failures are logged and never returned.
pub fn log_certificate_expiry(pem: &str) -> Option<CertificateExpiry> {
    match check_certificate_expiry(pem, Utc::now()) {
        Ok(status) => {
            match &status {
                CertificateExpiry::Valid {
                    not_after,
                    days_left,
                } => {
                    info!(%not_after, days_left, "SP certificate is valid");
                }
                CertificateExpiry::ExpiringSoon {
                    not_after,
                    days_left,
                } => {
                    warn!(%not_after, days_left, "SP certificate is about to expire");
                }
                CertificateExpiry::Expired { not_after } => {
                    error!(%not_after, "SP certificate expired");
                }
                CertificateExpiry::MissingExpiry => {
                    warn!("SP certificate has no expiration date");
                }
            }
            Some(status)
        }
        Err(e) => {
            warn!(error = %e, "Unable to check SP certificate expiry");
            None
        }
    }
}

/// Read `notAfter` from a DER certificate.
fn certificate_not_after(der: &[u8]) -> SpidResult<Option<DateTime<Utc>>> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| SpidError::Certificate(format!("failed to parse X.509 certificate: {:?}", e)))?;

    let timestamp = cert.validity().not_after.timestamp();
    Ok(Utc.timestamp_opt(timestamp, 0).single())
}

/// Decode a PEM certificate (or bare base64 DER) into DER bytes.
pub fn pem_to_der(pem: &str) -> SpidResult<Vec<u8>> {
    STANDARD
        .decode(pem_body(pem))
        .map_err(|e| SpidError::Certificate(format!("failed to decode certificate base64: {}", e)))
}

/// Base64 body of a PEM certificate with markers and whitespace removed.
pub fn pem_body(pem: &str) -> String {
    let inner = match (pem.find(PEM_BEGIN), pem.find(PEM_END)) {
        (Some(start), Some(end)) if end > start => &pem[start + PEM_BEGIN.len()..end],
        _ => pem,
    };
    inner.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Wrap a base64 certificate body (as found in `ds:X509Certificate`) in PEM markers.
pub fn to_pem(body: &str) -> String {
    let body: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pem = String::with_capacity(body.len() + 64);
    pem.push_str(PEM_BEGIN);
    pem.push('\n');
    for chunk in body.as_bytes().chunks(64) {
        // base64 is ASCII
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(PEM_END);
    pem
}
