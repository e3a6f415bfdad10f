//! Anti-replay request cache.
//!
//! Every issued AuthnRequest is stored until its response is consumed or the
//! record expires. A request ID validates at most one response.

pub mod cleanup;
pub mod config;
pub mod memory;
pub mod store;
pub mod types;

use async_trait::async_trait;

use crate::error::SpidResult;

pub use cleanup::spawn_cleanup_task;
pub use config::{CacheBackend, ReplayConfig};
pub use memory::MemoryRequestCache;
pub use store::RedbRequestCache;
pub use types::AuthnRequestRecord;

/// Storage for issued AuthnRequests.
///
/// Implementations must make `remove` atomic: when several callers remove the
/// same live ID concurrently, exactly one of them observes `true`.
#[async_trait]
pub trait RequestCache: Send + Sync {
    /// Store request XML under its `ID` attribute.
    async fn save(&self, request_xml: &str) -> SpidResult<AuthnRequestRecord>;

    /// Fetch a live record. Expired records are reported as absent.
    async fn get(&self, request_id: &str) -> SpidResult<Option<AuthnRequestRecord>>;

    /// Delete a record. Returns whether a live record was removed.
    async fn remove(&self, request_id: &str) -> SpidResult<bool>;

    /// Drop expired records, returning how many were removed.
    async fn evict_expired(&self) -> SpidResult<usize>;
}
