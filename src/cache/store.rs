//! Request cache backed by the redb embedded database.
//!
//! redb serializes write transactions, so the read-check-delete in `remove`
//! cannot interleave with another removal of the same ID.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use tracing::{debug, warn};

use super::types::AuthnRequestRecord;
use super::RequestCache;
use crate::error::{SpidError, SpidResult};

/// redb table for issued requests (key: request ID, value: MessagePack record).
const REQUESTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("spid_authn_requests");

type BackendResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Persistent request cache.
pub struct RedbRequestCache {
    db: Database,
    ttl: Duration,
}

impl RedbRequestCache {
    /// Open or create the cache at the given path.
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> SpidResult<Self> {
        Self::open_inner(path.as_ref(), ttl).map_err(SpidError::Store)
    }

    fn open_inner(path: &Path, ttl: Duration) -> BackendResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(REQUESTS_TABLE)?;
        }
        write_txn.commit()?;

        debug!(path = ?path, "Request cache opened");

        Ok(Self { db, ttl })
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> SpidResult<usize> {
        self.len_inner().map_err(SpidError::Store)
    }

    fn len_inner(&self) -> BackendResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REQUESTS_TABLE)?;
        Ok(table.len()? as usize)
    }

    /// Persist a record as is.
    pub fn insert(&self, record: &AuthnRequestRecord) -> SpidResult<()> {
        self.insert_inner(record).map_err(SpidError::Store)
    }

    fn insert_inner(&self, record: &AuthnRequestRecord) -> BackendResult<()> {
        let data = rmp_serde::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(REQUESTS_TABLE)?;
            table.insert(record.request_id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_inner(&self, request_id: &str) -> BackendResult<Option<AuthnRequestRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REQUESTS_TABLE)?;

        match table.get(request_id)? {
            Some(value) => {
                let record: AuthnRequestRecord = rmp_serde::from_slice(value.value())?;
                Ok(Some(record).filter(|r| !r.is_expired()))
            }
            None => Ok(None),
        }
    }

    fn remove_inner(&self, request_id: &str) -> BackendResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(REQUESTS_TABLE)?;
            let old = table.remove(request_id)?;
            match old {
                Some(value) => Some(rmp_serde::from_slice::<AuthnRequestRecord>(value.value())),
                None => None,
            }
        };
        write_txn.commit()?;

        match removed {
            Some(Ok(record)) => Ok(!record.is_expired()),
            Some(Err(e)) => {
                warn!(request_id = %request_id, error = %e, "Undecodable request record removed");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn evict_inner(&self) -> BackendResult<usize> {
        let now = Utc::now();

        let expired: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(REQUESTS_TABLE)?;

            let mut ids = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                match rmp_serde::from_slice::<AuthnRequestRecord>(value.value()) {
                    Ok(record) if record.is_expired_at(now) => {
                        ids.push(key.value().to_string());
                    }
                    Err(e) => {
                        warn!(key = key.value(), error = %e, "Failed to deserialize request record, marking for deletion");
                        ids.push(key.value().to_string());
                    }
                    _ => {}
                }
            }
            ids
        };

        if expired.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        let mut evicted = 0;
        {
            let mut table = write_txn.open_table(REQUESTS_TABLE)?;
            for id in &expired {
                if table.remove(id.as_str())?.is_some() {
                    evicted += 1;
                }
            }
        }
        write_txn.commit()?;

        Ok(evicted)
    }
}

#[async_trait]
impl RequestCache for RedbRequestCache {
    async fn save(&self, request_xml: &str) -> SpidResult<AuthnRequestRecord> {
        let record = AuthnRequestRecord::from_request(request_xml, self.ttl)?;
        self.insert(&record)?;
        debug!(request_id = %record.request_id, expires_at = %record.expires_at, "AuthnRequest cached");
        Ok(record)
    }

    async fn get(&self, request_id: &str) -> SpidResult<Option<AuthnRequestRecord>> {
        self.get_inner(request_id).map_err(SpidError::Store)
    }

    async fn remove(&self, request_id: &str) -> SpidResult<bool> {
        self.remove_inner(request_id).map_err(SpidError::Store)
    }

    async fn evict_expired(&self) -> SpidResult<usize> {
        self.evict_inner().map_err(SpidError::Store)
    }
}
