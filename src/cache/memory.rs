//! In-memory request cache.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::types::AuthnRequestRecord;
use super::RequestCache;
use crate::error::{SpidError, SpidResult};

/// Process-local cache. Only suitable when a single instance serves both the
/// request and its response.
pub struct MemoryRequestCache {
    records: Mutex<HashMap<String, AuthnRequestRecord>>,
    ttl: Duration,
}

impl MemoryRequestCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn records(&self) -> SpidResult<MutexGuard<'_, HashMap<String, AuthnRequestRecord>>> {
        self.records
            .lock()
            .map_err(|_| SpidError::Store("request cache lock poisoned".into()))
    }

    /// Insert a record as is, e.g. one with a chosen expiry.
    pub fn insert(&self, record: AuthnRequestRecord) -> SpidResult<()> {
        self.records()?.insert(record.request_id.clone(), record);
        Ok(())
    }

    pub fn len(&self) -> SpidResult<usize> {
        Ok(self.records()?.len())
    }
}

#[async_trait]
impl RequestCache for MemoryRequestCache {
    async fn save(&self, request_xml: &str) -> SpidResult<AuthnRequestRecord> {
        let record = AuthnRequestRecord::from_request(request_xml, self.ttl)?;
        self.insert(record.clone())?;
        debug!(request_id = %record.request_id, "AuthnRequest cached");
        Ok(record)
    }

    async fn get(&self, request_id: &str) -> SpidResult<Option<AuthnRequestRecord>> {
        let records = self.records()?;
        Ok(records
            .get(request_id)
            .filter(|record| !record.is_expired())
            .cloned())
    }

    async fn remove(&self, request_id: &str) -> SpidResult<bool> {
        let removed = self.records()?.remove(request_id);
        Ok(removed.is_some_and(|record| !record.is_expired()))
    }

    async fn evict_expired(&self) -> SpidResult<usize> {
        let now = Utc::now();
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        Ok(before - records.len())
    }
}
