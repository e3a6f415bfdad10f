//! Background eviction of expired request records.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::RequestCache;

/// Spawn a task that periodically evicts expired records.
///
/// Returns a `JoinHandle` that can be used to abort the task.
pub fn spawn_cleanup_task(
    cache: Arc<dyn RequestCache>,
    cleanup_interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(cleanup_interval_secs));

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match cache.evict_expired().await {
                Ok(0) => debug!("Request cache cleanup: nothing expired"),
                Ok(count) => info!(evicted = count, "Request cache cleanup completed"),
                Err(e) => warn!(error = %e, "Request cache cleanup failed"),
            }
        }
    })
}
