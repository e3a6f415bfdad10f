//! SPID SAML client.
//!
//! Wraps a [`SamlEngine`] with SPID request rewriting, response
//! pre-validation and single-use request consumption through a shared
//! [`RequestCache`], so any instance of a fleet can validate a response to a
//! request issued by any other instance, exactly once.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::engine::SamlEngine;
use super::observer::{Direction, RequestObserver, TracingObserver};
use super::prevalidate::{ResponsePreValidator, SpidPreValidator};
use super::request::AuthnRequest;
use super::tamper::{RequestTamperer, SpidTamperer};
use super::types::{RequestContext, SpidProfile};
use crate::cache::RequestCache;
use crate::dsig::XmlSigner;
use crate::error::{SpidError, SpidResult};
use crate::trust::SharedTrust;
use crate::xml::root_attribute;

/// SPID-aware SAML client.
pub struct SpidSamlClient {
    engine: Arc<dyn SamlEngine>,
    trust: Arc<SharedTrust>,
    tamperer: Option<Arc<dyn RequestTamperer>>,
    cache: Option<Arc<dyn RequestCache>>,
    pre_validator: Option<Arc<dyn ResponsePreValidator>>,
    observer: Option<Arc<dyn RequestObserver>>,
    signer: Option<Arc<dyn XmlSigner>>,
}

/// Builder for [`SpidSamlClient`].
pub struct SpidSamlClientBuilder {
    engine: Arc<dyn SamlEngine>,
    trust: Arc<SharedTrust>,
    tamperer: Option<Arc<dyn RequestTamperer>>,
    cache: Option<Arc<dyn RequestCache>>,
    pre_validator: Option<Arc<dyn ResponsePreValidator>>,
    observer: Option<Arc<dyn RequestObserver>>,
    signer: Option<Arc<dyn XmlSigner>>,
}

impl SpidSamlClientBuilder {
    pub fn new(engine: Arc<dyn SamlEngine>, trust: Arc<SharedTrust>) -> Self {
        Self {
            engine,
            trust,
            tamperer: None,
            cache: None,
            pre_validator: None,
            observer: None,
            signer: None,
        }
    }

    /// Full SPID setup: [`SpidTamperer`], [`SpidPreValidator`] over `cache`
    /// and a [`TracingObserver`]. With a signer, rewritten requests carry an
    /// enveloped signature and redirect URLs a query signature.
    pub fn spid(self, cache: Arc<dyn RequestCache>, signer: Option<Arc<dyn XmlSigner>>) -> Self {
        let (tamperer, builder) = match signer {
            Some(signer) => (
                SpidTamperer::new().with_signer(Arc::clone(&signer)),
                self.signer(signer),
            ),
            None => (SpidTamperer::new(), self),
        };
        builder
            .tamperer(Arc::new(tamperer))
            .pre_validator(Arc::new(SpidPreValidator::new(Arc::clone(&cache))))
            .cache(cache)
            .observer(Arc::new(TracingObserver::default()))
    }

    /// Signer for HTTP-Redirect query strings.
    pub fn signer(mut self, signer: Arc<dyn XmlSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn tamperer(mut self, tamperer: Arc<dyn RequestTamperer>) -> Self {
        self.tamperer = Some(tamperer);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn RequestCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn pre_validator(mut self, pre_validator: Arc<dyn ResponsePreValidator>) -> Self {
        self.pre_validator = Some(pre_validator);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> SpidResult<SpidSamlClient> {
        if self.cache.is_none() && (self.tamperer.is_some() || self.pre_validator.is_some()) {
            return Err(SpidError::Config(
                "a request cache is required with a tamperer or pre-validator".to_string(),
            ));
        }

        // the pre-validator only knows IDs the tamperer cached
        if self.pre_validator.is_some() && self.tamperer.is_none() {
            return Err(SpidError::Config(
                "a pre-validator requires a tamperer to cache issued requests".to_string(),
            ));
        }

        if self.cache.is_some() && self.engine.tracks_requests() {
            return Err(SpidError::Config(
                "engine request tracking must be disabled when a shared cache is used".to_string(),
            ));
        }

        if self.tamperer.is_none() || self.pre_validator.is_none() {
            warn!(
                tamperer = self.tamperer.is_some(),
                pre_validator = self.pre_validator.is_some(),
                "SAML client built without SPID request rewriting or replay protection"
            );
        }

        Ok(SpidSamlClient {
            engine: self.engine,
            trust: self.trust,
            tamperer: self.tamperer,
            cache: self.cache,
            pre_validator: self.pre_validator,
            observer: self.observer,
            signer: self.signer,
        })
    }
}

impl SpidSamlClient {
    pub fn builder(engine: Arc<dyn SamlEngine>, trust: Arc<SharedTrust>) -> SpidSamlClientBuilder {
        SpidSamlClientBuilder::new(engine, trust)
    }

    pub fn trust(&self) -> &Arc<SharedTrust> {
        &self.trust
    }

    /// Generate, rewrite and cache an AuthnRequest.
    ///
    /// The request is cached before it is returned; a cache failure aborts
    /// the login.
    pub async fn generate_authorize_request(
        &self,
        ctx: &RequestContext,
        is_passive: bool,
    ) -> SpidResult<AuthnRequest> {
        let trust = self.trust.current();
        let mut request = self
            .engine
            .generate_authn_request(&trust, ctx, is_passive)?;

        if let (Some(tamperer), Some(cache)) = (&self.tamperer, &self.cache) {
            let tampered = tamperer.tamper(&trust, &request.xml)?;

            let tampered_id = root_attribute(&tampered, "ID")?;
            if tampered_id.as_deref() != Some(request.id.as_str()) {
                return Err(SpidError::Tamper(format!(
                    "rewritten request ID {:?} differs from {}",
                    tampered_id, request.id
                )));
            }

            cache.save(&tampered).await?;
            request.xml = tampered;
        }

        debug!(request_id = %request.id, idp = %ctx.idp_alias, "AuthnRequest issued");

        self.notify(ctx.client_ip.clone(), &request.xml, Direction::Request);
        Ok(request)
    }

    /// HTTP-Redirect URL for a new AuthnRequest, carrying the SP's additional
    /// parameters.
    pub async fn authorize_redirect_url(
        &self,
        ctx: &RequestContext,
        is_passive: bool,
        relay_state: Option<&str>,
    ) -> SpidResult<String> {
        let request = self.generate_authorize_request(ctx, is_passive).await?;
        let trust = self.trust.current();
        request.redirect_url(
            relay_state,
            &trust.service_provider().additional_params,
            self.signer.as_deref(),
        )
    }

    /// Validate the URL-encoded form posted to the ACS endpoint.
    pub async fn validate_post_response(
        &self,
        body: &str,
        client_ip: Option<&str>,
    ) -> SpidResult<SpidProfile> {
        let xml = decode_post_body(body)?;
        self.validate_response_xml(&xml, client_ip).await
    }

    /// Validate a decoded response document.
    ///
    /// The cached request is consumed only after every check passed; any
    /// earlier failure leaves it in place and is returned unchanged.
    pub async fn validate_response_xml(
        &self,
        xml: &str,
        client_ip: Option<&str>,
    ) -> SpidResult<SpidProfile> {
        let trust = self.trust.current();

        let pre_validated = match &self.pre_validator {
            Some(pre_validator) => Some(pre_validator.pre_validate(&trust, xml).await?),
            None => None,
        };

        let profile = self.engine.validate_response(&trust, xml)?;

        if let (Some(pre), Some(cache)) = (pre_validated, &self.cache) {
            if !cache.remove(&pre.request_id).await? {
                warn!(request_id = %pre.request_id, "Request already consumed");
                return Err(SpidError::ReplayOrUnknownRequest);
            }
            debug!(request_id = %pre.request_id, "Cached request consumed");
        }

        info!(
            issuer = %profile.issuer,
            level = ?profile.level,
            "SPID response accepted"
        );

        self.notify(client_ip.map(str::to_string), xml, Direction::Response);
        Ok(profile)
    }

    fn notify(&self, client_ip: Option<String>, xml: &str, direction: Direction) {
        if let Some(observer) = &self.observer {
            let observer = Arc::clone(observer);
            let xml = xml.to_string();
            tokio::spawn(async move {
                observer.observe(client_ip, xml, direction).await;
            });
        }
    }
}

/// Extract and decode `SAMLResponse` from an ACS form body.
pub fn decode_post_body(body: &str) -> SpidResult<String> {
    let encoded = body
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "SAMLResponse")
        .map(|(_, value)| value)
        .ok_or_else(|| SpidError::InvalidResponse("form has no SAMLResponse".to_string()))?;

    let spaced = encoded.replace('+', " ");
    let value = urlencoding::decode(&spaced)
        .map_err(|e| SpidError::InvalidResponse(format!("bad form encoding: {}", e)))?;
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();

    let decoded = BASE64
        .decode(compact)
        .map_err(|e| SpidError::InvalidResponse(format!("failed to decode SAMLResponse: {}", e)))?;

    String::from_utf8(decoded)
        .map_err(|_| SpidError::InvalidResponse("SAMLResponse is not valid UTF-8".to_string()))
}
