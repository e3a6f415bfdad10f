//! Request cache configuration.

use serde::{Deserialize, Serialize};

/// Cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Embedded redb database, survives restarts.
    #[default]
    Redb,
    /// Process-local map, for tests and single-instance setups.
    Memory,
}

/// Anti-replay cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Path to the redb file.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Maximum accepted delay between request and response, in seconds.
    #[serde(default = "default_request_ttl")]
    pub request_ttl_secs: u64,

    /// Eviction interval in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_store_path() -> String {
    "/var/lib/zentinel-spid/requests.redb".to_string()
}

fn default_request_ttl() -> u64 {
    15 * 60 // 15 minutes
}

fn default_cleanup_interval() -> u64 {
    300 // 5 minutes
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            store_path: default_store_path(),
            request_ttl_secs: default_request_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == CacheBackend::Redb && self.store_path.is_empty() {
            return Err("replay store_path is required for the redb backend".to_string());
        }

        if self.request_ttl_secs == 0 {
            return Err("request_ttl_secs must be greater than zero".to_string());
        }

        if self.cleanup_interval_secs == 0 {
            return Err("cleanup_interval_secs must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Record lifetime: the configured TTL, but never shorter than twice the
    /// accepted clock skew.
    pub fn record_ttl(&self, clock_skew: chrono::Duration) -> chrono::Duration {
        let configured = chrono::Duration::seconds(self.request_ttl_secs as i64);
        configured.max(clock_skew * 2)
    }
}
