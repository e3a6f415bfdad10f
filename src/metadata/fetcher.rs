//! IdP metadata fetching and aggregation.

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::MetadataSource;
use super::parser::{filter_recognized, parse_idp_metadata};
use super::types::IdpMap;
use crate::error::{SpidError, SpidResult};

/// IdPs imported from one or more metadata sources.
#[derive(Debug, Clone, Default)]
pub struct AggregatedIdps {
    /// Alias -> descriptor.
    pub providers: IdpMap,
    /// Recognized entity IDs that no source published.
    pub missing: Vec<String>,
}

impl AggregatedIdps {
    /// Fold another import into this one. Later imports overwrite aliases.
    pub fn merge(&mut self, other: AggregatedIdps) {
        for (alias, descriptor) in other.providers {
            if self.providers.insert(alias.clone(), descriptor).is_some() {
                debug!(alias = %alias, "IdP overridden by later metadata source");
            }
        }
        self.missing.extend(other.missing);
    }
}

/// Fetches metadata documents over HTTP(S).
pub struct MetadataFetcher {
    http_client: reqwest::Client,
}

impl MetadataFetcher {
    /// Create a fetcher with the given request timeout.
    pub fn new(timeout_secs: u64) -> SpidResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SpidError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    /// Download a metadata document.
    pub async fn fetch(&self, url: &str) -> SpidResult<String> {
        debug!(url = %url, "Fetching IdP metadata");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|source| SpidError::Fetch {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(SpidError::FetchStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(|source| SpidError::Fetch {
            url: url.to_string(),
            source,
        })
    }

    /// Fetch, parse and whitelist one source.
    pub async fn fetch_source(&self, source: &MetadataSource) -> SpidResult<AggregatedIdps> {
        let xml = self.fetch(&source.url).await?;
        import_metadata(&xml, &source.url, &source.recognized)
    }

    /// Fetch every source and merge the results in order. Any failing source
    /// fails the whole aggregation.
    pub async fn aggregate(&self, sources: &[MetadataSource]) -> SpidResult<AggregatedIdps> {
        let mut aggregated = AggregatedIdps::default();

        for source in sources {
            let imported = self.fetch_source(source).await?;
            aggregated.merge(imported);
        }

        Ok(aggregated)
    }
}

/// Parse and whitelist an already downloaded metadata document.
pub fn import_metadata(
    xml: &str,
    source_name: &str,
    recognized: &BTreeMap<String, String>,
) -> SpidResult<AggregatedIdps> {
    let records = parse_idp_metadata(xml)?;
    if records.is_empty() {
        return Err(SpidError::NoMetadata {
            source_name: source_name.to_string(),
        });
    }

    let (providers, missing) = filter_recognized(records, recognized);

    if !missing.is_empty() {
        warn!(
            source = %source_name,
            expected = recognized.len(),
            found = providers.len(),
            missing = ?missing,
            "Missing SPID metadata for recognized IdPs"
        );
    }

    info!(
        source = %source_name,
        idp_count = providers.len(),
        "IdP metadata imported"
    );

    Ok(AggregatedIdps { providers, missing })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entities_descriptor, idp_entity};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recognized(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(id, alias)| (id.to_string(), alias.to_string()))
            .collect()
    }

    async fn serve(server: &MockServer, route: &str, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_source() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/idps.xml",
            200,
            entities_descriptor(&[
                idp_entity("https://posteid.poste.it"),
                idp_entity("https://unknown.example.com"),
            ]),
        )
        .await;

        let fetcher = MetadataFetcher::new(5).unwrap();
        let source = MetadataSource {
            url: format!("{}/idps.xml", server.uri()),
            recognized: recognized(&[("https://posteid.poste.it", "posteid")]),
        };

        let imported = fetcher.fetch_source(&source).await.unwrap();
        assert_eq!(imported.providers.len(), 1);
        assert_eq!(
            imported.providers["posteid"].entity_id,
            "https://posteid.poste.it"
        );
        assert!(imported.missing.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_status_error() {
        let server = MockServer::start().await;
        serve(&server, "/idps.xml", 503, String::new()).await;

        let fetcher = MetadataFetcher::new(5).unwrap();
        let result = fetcher.fetch(&format!("{}/idps.xml", server.uri())).await;
        assert!(matches!(
            result,
            Err(SpidError::FetchStatus { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_transport_error() {
        let fetcher = MetadataFetcher::new(1).unwrap();
        // port 9 (discard) is closed on test hosts
        let result = fetcher.fetch("http://127.0.0.1:9/idps.xml").await;
        assert!(matches!(result, Err(SpidError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_empty_metadata() {
        let server = MockServer::start().await;
        serve(&server, "/idps.xml", 200, entities_descriptor(&[])).await;

        let fetcher = MetadataFetcher::new(5).unwrap();
        let source = MetadataSource {
            url: format!("{}/idps.xml", server.uri()),
            recognized: recognized(&[("https://posteid.poste.it", "posteid")]),
        };

        let result = fetcher.fetch_source(&source).await;
        assert!(matches!(result, Err(SpidError::NoMetadata { .. })));
    }

    #[tokio::test]
    async fn test_later_source_wins() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/registry.xml",
            200,
            entities_descriptor(&[idp_entity("https://posteid.poste.it")]),
        )
        .await;
        serve(
            &server,
            "/validator.xml",
            200,
            idp_entity("https://validator.spid.gov.it"),
        )
        .await;

        let fetcher = MetadataFetcher::new(5).unwrap();
        let sources = vec![
            MetadataSource {
                url: format!("{}/registry.xml", server.uri()),
                recognized: recognized(&[("https://posteid.poste.it", "posteid")]),
            },
            MetadataSource {
                url: format!("{}/validator.xml", server.uri()),
                recognized: recognized(&[("https://validator.spid.gov.it", "posteid")]),
            },
        ];

        let aggregated = fetcher.aggregate(&sources).await.unwrap();
        assert_eq!(aggregated.providers.len(), 1);
        assert_eq!(
            aggregated.providers["posteid"].entity_id,
            "https://validator.spid.gov.it"
        );
    }

    #[test]
    fn test_import_reports_missing() {
        let xml = entities_descriptor(&[idp_entity("https://posteid.poste.it")]);
        let imported = import_metadata(
            &xml,
            "inline",
            &recognized(&[
                ("https://posteid.poste.it", "posteid"),
                ("https://spid.intesa.it", "intesaid"),
            ]),
        )
        .unwrap();

        assert_eq!(imported.providers.len(), 1);
        assert_eq!(imported.missing, vec!["https://spid.intesa.it".to_string()]);
    }
}
