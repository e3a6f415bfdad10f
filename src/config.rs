//! Agent configuration file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::ReplayConfig;
use crate::error::{SpidError, SpidResult};
use crate::metadata::MetadataConfig;
use crate::trust::SpConfig;

/// Top-level configuration, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub service_provider: SpConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub replay: ReplayConfig,

    /// How often IdP metadata is fetched again, in seconds. Zero disables
    /// refreshing.
    #[serde(default = "default_refresh_interval")]
    pub metadata_refresh_secs: u64,
}

fn default_refresh_interval() -> u64 {
    24 * 60 * 60 // daily
}

impl AgentConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> SpidResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SpidError::Config(format!("failed to read {:?}: {}", path, e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> SpidResult<Self> {
        let config: AgentConfig = serde_json::from_str(raw)
            .map_err(|e| SpidError::Config(format!("invalid configuration: {}", e)))?;
        config.validate().map_err(SpidError::Config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.service_provider.validate()?;
        self.metadata.validate()?;
        self.replay.validate()?;
        Ok(())
    }
}
