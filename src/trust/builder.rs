//! Trust configuration builder.

use std::collections::BTreeMap;
use tracing::{info, warn};

use super::config::SpConfig;
use super::pinned::{pinned_identity_providers, PinnedCertificates};
use super::types::TrustConfiguration;
use crate::cert::{log_certificate_expiry, CertificateExpiry};
use crate::error::{SpidError, SpidResult};
use crate::metadata::{import_metadata, AggregatedIdps, MetadataConfig, MetadataFetcher, MetadataSource};

/// Side observations collected while building.
#[derive(Debug, Clone, Default)]
pub struct TrustBuildReport {
    /// Recognized entity IDs missing from their metadata source.
    pub missing_entities: Vec<String>,
    /// SP certificate expiry, when the certificate could be parsed.
    pub certificate: Option<CertificateExpiry>,
}

enum Source {
    Remote(MetadataSource),
    Inline {
        name: String,
        xml: String,
        recognized: BTreeMap<String, String>,
    },
}

/// Builds a [`TrustConfiguration`] from SP settings and IdP metadata.
pub struct TrustConfigurationBuilder {
    service_provider: SpConfig,
    sources: Vec<Source>,
    testenv_url: String,
    pinned_certificates: PinnedCertificates,
    fetch_timeout_secs: u64,
}

impl TrustConfigurationBuilder {
    pub fn new(service_provider: SpConfig) -> Self {
        let defaults = MetadataConfig::default();
        Self {
            service_provider,
            sources: Vec::new(),
            testenv_url: defaults.testenv_url,
            pinned_certificates: defaults.pinned_certificates,
            fetch_timeout_secs: defaults.fetch_timeout_secs,
        }
    }

    /// Builder preloaded with every source of `metadata`.
    pub fn from_config(service_provider: SpConfig, metadata: &MetadataConfig) -> Self {
        let mut builder = Self::new(service_provider)
            .with_testenv_url(&metadata.testenv_url)
            .with_pinned_certificates(metadata.pinned_certificates.clone())
            .with_fetch_timeout(metadata.fetch_timeout_secs);
        for source in metadata.sources() {
            builder = builder.with_source(source);
        }
        builder
    }

    /// Add a remote metadata source. Sources merge in insertion order.
    pub fn with_source(mut self, source: MetadataSource) -> Self {
        self.sources.push(Source::Remote(source));
        self
    }

    /// Add an already downloaded metadata document.
    pub fn with_inline_metadata(
        mut self,
        name: impl Into<String>,
        xml: impl Into<String>,
        recognized: BTreeMap<String, String>,
    ) -> Self {
        self.sources.push(Source::Inline {
            name: name.into(),
            xml: xml.into(),
            recognized,
        });
        self
    }

    pub fn with_testenv_url(mut self, testenv_url: &str) -> Self {
        self.testenv_url = testenv_url.to_string();
        self
    }

    /// Replace the built-in signing certificates of pinned IdPs.
    pub fn with_pinned_certificates(mut self, certificates: PinnedCertificates) -> Self {
        self.pinned_certificates = certificates;
        self
    }

    pub fn with_fetch_timeout(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = secs;
        self
    }

    /// Build the trust configuration.
    pub async fn build(self) -> SpidResult<TrustConfiguration> {
        self.build_with_report().await.map(|(trust, _)| trust)
    }

    /// Build the trust configuration and return what was observed on the way.
    ///
    /// Fails if any source fails or if no recognized IdP was imported.
    pub async fn build_with_report(self) -> SpidResult<(TrustConfiguration, TrustBuildReport)> {
        let Self {
            mut service_provider,
            sources,
            testenv_url,
            pinned_certificates,
            fetch_timeout_secs,
        } = self;

        service_provider.validate().map_err(SpidError::Config)?;

        let certificate = log_certificate_expiry(&service_provider.certificate_pem);

        service_provider.apply_autologin();

        let fetcher = MetadataFetcher::new(fetch_timeout_secs)?;
        let mut aggregated = AggregatedIdps::default();
        let mut remote: Vec<MetadataSource> = Vec::new();

        // consecutive remote sources are fetched as one batch; order is kept
        for source in sources {
            match source {
                Source::Remote(source) => remote.push(source),
                Source::Inline {
                    name,
                    xml,
                    recognized,
                } => {
                    aggregated.merge(fetcher.aggregate(&std::mem::take(&mut remote)).await?);
                    aggregated.merge(import_metadata(&xml, &name, &recognized)?);
                }
            }
        }
        aggregated.merge(fetcher.aggregate(&remote).await?);

        if aggregated.providers.is_empty() {
            warn!("No recognized IdP found in any metadata source");
            return Err(SpidError::EmptyTrust);
        }

        let mut identity_providers = aggregated.providers;
        for (alias, descriptor) in pinned_identity_providers(&testenv_url, &pinned_certificates) {
            identity_providers.insert(alias.to_string(), descriptor);
        }

        let trust = TrustConfiguration::new(service_provider, identity_providers)?;

        info!(
            idp_count = trust.len(),
            missing = aggregated.missing.len(),
            "Trust configuration built"
        );

        Ok((
            trust,
            TrustBuildReport {
                missing_entities: aggregated.missing,
                certificate,
            },
        ))
    }
}
