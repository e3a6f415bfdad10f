//! Hot-swappable trust configuration.

use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use super::builder::TrustConfigurationBuilder;
use super::types::TrustConfiguration;
use crate::error::SpidResult;

/// Holds the active [`TrustConfiguration`].
///
/// Readers get an `Arc` snapshot; in-flight exchanges keep the configuration
/// they started with while a reload swaps in a new one.
pub struct SharedTrust {
    current: RwLock<Arc<TrustConfiguration>>,
}

impl SharedTrust {
    pub fn new(trust: TrustConfiguration) -> Self {
        Self {
            current: RwLock::new(Arc::new(trust)),
        }
    }

    /// Snapshot of the active configuration.
    pub fn current(&self) -> Arc<TrustConfiguration> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a new configuration, returning the previous one.
    pub fn replace(&self, trust: TrustConfiguration) -> Arc<TrustConfiguration> {
        let next = Arc::new(trust);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }

    /// Rebuild and swap. On failure the active configuration stays in place.
    pub async fn reload(&self, builder: TrustConfigurationBuilder) -> SpidResult<()> {
        match builder.build().await {
            Ok(trust) => {
                let idp_count = trust.len();
                self.replace(trust);
                info!(idp_count, "Trust configuration reloaded");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Trust configuration reload failed, keeping current");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{default_recognized_idps, IdpMap};
    use crate::test_support::{descriptor, entities_descriptor, idp_entity, sp_config};

    fn trust_with(alias: &str) -> TrustConfiguration {
        let mut idps = IdpMap::new();
        idps.insert(alias.to_string(), descriptor("https://posteid.poste.it"));
        TrustConfiguration::new(sp_config(), idps).unwrap()
    }

    #[test]
    fn test_replace_keeps_old_snapshot() {
        let shared = SharedTrust::new(trust_with("first"));
        let before = shared.current();

        let previous = shared.replace(trust_with("second"));

        assert!(before.identity_provider("first").is_ok());
        assert!(previous.identity_provider("first").is_ok());
        assert!(shared.current().identity_provider("second").is_ok());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current() {
        let shared = SharedTrust::new(trust_with("first"));

        let builder = TrustConfigurationBuilder::new(sp_config()).with_inline_metadata(
            "inline",
            entities_descriptor(&[]),
            default_recognized_idps(),
        );
        assert!(shared.reload(builder).await.is_err());
        assert!(shared.current().identity_provider("first").is_ok());

        let builder = TrustConfigurationBuilder::new(sp_config()).with_inline_metadata(
            "inline",
            entities_descriptor(&[idp_entity("https://posteid.poste.it")]),
            default_recognized_idps(),
        );
        shared.reload(builder).await.unwrap();
        assert!(shared.current().identity_provider("posteid").is_ok());
    }
}
