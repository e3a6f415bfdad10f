//! SPID checks that need the stored AuthnRequest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::cache::{AuthnRequestRecord, RequestCache};
use crate::error::{SpidError, SpidResult};
use crate::spid::{SpidLevel, STATUS_SUCCESS};
use crate::trust::TrustConfiguration;
use crate::xml::{first_element_attribute, first_element_text, root_attribute};

/// Outcome of a successful pre-validation.
#[derive(Debug, Clone)]
pub struct PreValidated {
    /// ID to consume once the response is fully validated.
    pub request_id: String,
    pub record: AuthnRequestRecord,
}

/// Runs before the engine validates a response.
#[async_trait]
pub trait ResponsePreValidator: Send + Sync {
    async fn pre_validate(
        &self,
        trust: &TrustConfiguration,
        response_xml: &str,
    ) -> SpidResult<PreValidated>;
}

/// Correlates a response with its cached request and applies the SPID
/// ordering, destination and level rules.
pub struct SpidPreValidator {
    cache: Arc<dyn RequestCache>,
}

impl SpidPreValidator {
    pub fn new(cache: Arc<dyn RequestCache>) -> Self {
        Self { cache }
    }
}

fn instant(xml: &str, what: &str) -> SpidResult<DateTime<Utc>> {
    let raw = root_attribute(xml, "IssueInstant")?
        .ok_or_else(|| SpidError::InvalidResponse(format!("{} has no IssueInstant", what)))?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SpidError::InvalidResponse(format!("{} IssueInstant is invalid: {}", what, e)))
}

#[async_trait]
impl ResponsePreValidator for SpidPreValidator {
    async fn pre_validate(
        &self,
        trust: &TrustConfiguration,
        response_xml: &str,
    ) -> SpidResult<PreValidated> {
        let request_id = root_attribute(response_xml, "InResponseTo")?
            .filter(|id| !id.is_empty())
            .ok_or(SpidError::ReplayOrUnknownRequest)?;

        let record = self
            .cache
            .get(&request_id)
            .await?
            .ok_or(SpidError::ReplayOrUnknownRequest)?;

        let request_xml = &record.request_xml;
        let skew = trust.service_provider().clock_skew();

        let requested_at = instant(request_xml, "request")?;
        let responded_at = instant(response_xml, "response")?;
        if responded_at < requested_at - skew {
            return Err(SpidError::InvalidResponse(
                "response IssueInstant precedes the request".to_string(),
            ));
        }

        let acs_url = root_attribute(request_xml, "AssertionConsumerServiceURL")?
            .unwrap_or_else(|| trust.service_provider().callback_url.clone());
        if root_attribute(response_xml, "Destination")?.as_deref() != Some(acs_url.as_str()) {
            return Err(SpidError::InvalidResponse(
                "response Destination does not match the request".to_string(),
            ));
        }

        // error responses carry no assertion, the engine reports their status
        let status = first_element_attribute(response_xml, "StatusCode", "Value")?;
        if status.as_deref() == Some(STATUS_SUCCESS) {
            let requested = first_element_text(request_xml, "AuthnContextClassRef")?
                .as_deref()
                .and_then(SpidLevel::from_uri);
            let granted = first_element_text(response_xml, "AuthnContextClassRef")?
                .as_deref()
                .and_then(SpidLevel::from_uri);

            match (requested, granted) {
                (_, None) => {
                    return Err(SpidError::InvalidResponse(
                        "response has no SPID level".to_string(),
                    ))
                }
                (Some(requested), Some(granted)) if granted < requested => {
                    return Err(SpidError::InvalidResponse(format!(
                        "SPID level {} is below the requested {}",
                        granted, requested
                    )))
                }
                _ => {}
            }
        }

        debug!(request_id = %request_id, "Response correlated with cached request");

        Ok(PreValidated { request_id, record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryRequestCache;
    use crate::test_support::{request_xml_at, trust, ResponseFixture};
    use chrono::Duration;

    async fn setup(level: SpidLevel) -> (SpidPreValidator, Arc<MemoryRequestCache>) {
        let cache = Arc::new(MemoryRequestCache::new(Duration::minutes(15)));
        cache
            .save(&request_xml_at("_req1", Utc::now(), level))
            .await
            .unwrap();
        (SpidPreValidator::new(cache.clone()), cache)
    }

    #[tokio::test]
    async fn test_correlated_response_passes() {
        let (validator, _cache) = setup(SpidLevel::L2).await;
        let xml = ResponseFixture::new("_req1").to_xml();

        let pre = validator.pre_validate(&trust(), &xml).await.unwrap();
        assert_eq!(pre.request_id, "_req1");
    }

    #[tokio::test]
    async fn test_unknown_or_missing_request() {
        let (validator, _cache) = setup(SpidLevel::L2).await;

        let xml = ResponseFixture::new("_never_issued").to_xml();
        assert!(matches!(
            validator.pre_validate(&trust(), &xml).await,
            Err(SpidError::ReplayOrUnknownRequest)
        ));

        let mut fixture = ResponseFixture::new("_req1");
        fixture.in_response_to = None;
        assert!(matches!(
            validator.pre_validate(&trust(), &fixture.to_xml()).await,
            Err(SpidError::ReplayOrUnknownRequest)
        ));
    }

    #[tokio::test]
    async fn test_response_older_than_request() {
        let (validator, _cache) = setup(SpidLevel::L2).await;
        let mut fixture = ResponseFixture::new("_req1");
        fixture.issue_instant = Utc::now() - Duration::hours(1);

        assert!(matches!(
            validator.pre_validate(&trust(), &fixture.to_xml()).await,
            Err(SpidError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_destination_mismatch() {
        let (validator, _cache) = setup(SpidLevel::L2).await;
        let mut fixture = ResponseFixture::new("_req1");
        fixture.destination = "https://attacker.example.com/acs".to_string();

        assert!(matches!(
            validator.pre_validate(&trust(), &fixture.to_xml()).await,
            Err(SpidError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_level_below_requested() {
        let (validator, _cache) = setup(SpidLevel::L3).await;
        let xml = ResponseFixture::new("_req1").to_xml();

        assert!(matches!(
            validator.pre_validate(&trust(), &xml).await,
            Err(SpidError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_error_status_skips_level_check() {
        let (validator, _cache) = setup(SpidLevel::L3).await;
        let mut fixture = ResponseFixture::new("_req1");
        fixture.status = "urn:oasis:names:tc:SAML:2.0:status:Responder".to_string();

        assert!(validator.pre_validate(&trust(), &fixture.to_xml()).await.is_ok());
    }
}
