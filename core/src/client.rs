//! Client facade: configuration, credential lifecycle and JSON fetches.
//!
//! # Design
//! `BcxClient` owns one `Credential` and one `ConditionalFetcher`. The cache
//! and transport are injected (defaults: a private `MemoryCache` and a
//! `UreqTransport`); pass the same cache handle to several clients to share
//! it. Resource-specific URL construction lives with callers, which hand a
//! complete `.json` URL to [`BcxClient::get_json`].

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{MemoryCache, ResponseCache};
use crate::config::ClientConfig;
use crate::credential::Credential;
use crate::error::{check_status, ConfigError, FetchError};
use crate::fetch::{ConditionalFetcher, Fetched};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};

pub struct BcxClient {
    config: ClientConfig,
    credential: Credential,
    cache: Arc<dyn ResponseCache>,
    transport: Arc<dyn Transport>,
    fetcher: ConditionalFetcher,
}

impl BcxClient {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache: Arc<dyn ResponseCache> = Arc::new(MemoryCache::new());
        let transport: Arc<dyn Transport> = Arc::new(UreqTransport::new());
        let fetcher = ConditionalFetcher::new(transport.clone(), cache.clone(), config.user_agent.clone());
        Ok(Self {
            config,
            credential: Credential::default(),
            cache,
            transport,
            fetcher,
        })
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self.rebuild_fetcher();
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self.rebuild_fetcher();
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    fn rebuild_fetcher(&mut self) {
        self.fetcher = ConditionalFetcher::new(
            self.transport.clone(),
            self.cache.clone(),
            self.config.user_agent.clone(),
        );
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Replace the credential wholesale. Cached entries written under the
    /// old token become unreachable because the token is part of the key.
    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = credential;
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_authenticated()
    }

    /// Fetch a `.json` resource through the conditional cache.
    pub fn get_json(&self, url: &str) -> Result<Fetched, FetchError> {
        self.fetcher.fetch(&self.credential, url)
    }

    /// Like [`get_json`](Self::get_json) but discards where the value came from.
    pub fn get_value(&self, url: &str) -> Result<Value, FetchError> {
        self.get_json(url).map(Fetched::into_value)
    }

    /// POST request exchanging an authorization code for a token.
    pub fn build_token_request(&self, code: &str) -> Result<HttpRequest, FetchError> {
        let url = Url::parse_with_params(
            &self.config.token_url,
            &[
                ("type", "web_server"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
            ],
        )
        .map_err(|_| FetchError::Unauthorized)?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("User-Agent".to_string(), self.config.user_agent.clone())],
            body: None,
        })
    }

    /// Interpret the token endpoint's reply. Any non-2xx or non-JSON body is
    /// `Unauthorized`.
    pub fn parse_token_response(&self, response: HttpResponse) -> Result<Credential, FetchError> {
        check_status(response.status, &response.headers).map_err(|_| FetchError::Unauthorized)?;
        let payload: Value = serde_json::from_str(&response.body).map_err(|_| FetchError::Unauthorized)?;
        Ok(Credential::from_json(payload))
    }

    /// Exchange an authorization code for a credential and adopt it.
    ///
    /// One POST, no retry. On any failure the current credential is left
    /// exactly as it was.
    pub fn exchange_code(&mut self, code: &str) -> Result<&Credential, FetchError> {
        let request = self.build_token_request(code)?;
        // Transport errors may echo the URL, which carries the secret and code.
        let response = self.transport.execute(&request).map_err(|_| {
            warn!("token exchange request failed");
            FetchError::Unauthorized
        })?;
        let credential = self.parse_token_response(response).map_err(|e| {
            warn!("token endpoint rejected the authorization code");
            e
        })?;
        debug!(authenticated = credential.is_authenticated(), "token exchange succeeded");
        self.credential = credential;
        Ok(&self.credential)
    }
}
