//! Cached AuthnRequest records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SpidError, SpidResult};
use crate::xml::root_attribute;

/// An issued AuthnRequest awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequestRecord {
    /// `ID` attribute of the request, matched against `InResponseTo`.
    pub request_id: String,

    /// Request XML as sent to the IdP.
    pub request_xml: String,

    /// When the record was stored.
    pub created_at: DateTime<Utc>,

    /// After this instant the record no longer validates anything.
    pub expires_at: DateTime<Utc>,
}

impl AuthnRequestRecord {
    /// Build a record from request XML, reading the request `ID`.
    pub fn from_request(request_xml: &str, ttl: Duration) -> SpidResult<Self> {
        let request_id = root_attribute(request_xml, "ID")?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SpidError::Parse("AuthnRequest has no ID attribute".to_string()))?;

        let created_at = Utc::now();
        Ok(Self {
            request_id,
            request_xml: request_xml.to_string(),
            created_at,
            expires_at: created_at + ttl,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
