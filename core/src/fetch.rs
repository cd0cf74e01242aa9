//! Conditional-cache GET pipeline.
//!
//! # Design
//! Every fetch goes through two phases:
//!
//! 1. **Revalidation.** If the cache holds an entry for the derived key, a
//!    HEAD request carrying `If-None-Match` / `If-Modified-Since` asks the
//!    server whether it changed. A 304 serves the cached body. Anything else,
//!    including a failure to even build or send the HEAD, is logged and
//!    treated as a miss.
//! 2. **Full fetch.** A plain GET. A 200 is decoded and, when it carries a
//!    validator, written back to the cache as one entry. Every other outcome
//!    is mapped by [`check_status`] and returned to the caller.
//!
//! At most two round-trips happen per call, sequentially, on the caller's
//! thread. There is no retry, no backoff and no request coalescing.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey, ResponseCache};
use crate::credential::Credential;
use crate::error::{check_status, FetchError, TransportError};
use crate::http::{HttpMethod, HttpRequest};
use crate::transport::Transport;

/// A decoded JSON document and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// Downloaded by a full GET.
    Network(Value),
    /// Confirmed unchanged by a 304 and served from the cache.
    Cache(Value),
}

impl Fetched {
    pub fn value(&self) -> &Value {
        match self {
            Fetched::Network(value) | Fetched::Cache(value) => value,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Fetched::Network(value) | Fetched::Cache(value) => value,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Fetched::Cache(_))
    }
}

/// Why a revalidation attempt was abandoned. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum RevalidationError {
    #[error("stored Last-Modified {0:?} is not an HTTP date")]
    BadLastModified(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected status {0} from conditional request")]
    UnexpectedStatus(u16),
}

pub struct ConditionalFetcher {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn ResponseCache>,
    user_agent: String,
}

impl ConditionalFetcher {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<dyn ResponseCache>, user_agent: impl Into<String>) -> Self {
        Self {
            transport,
            cache,
            user_agent: user_agent.into(),
        }
    }

    /// Fetch `url` as JSON on behalf of `credential`.
    ///
    /// Fails with `Unauthorized` or `MalformedUrl` before any I/O.
    pub fn fetch(&self, credential: &Credential, url: &str) -> Result<Fetched, FetchError> {
        let token = credential.bearer().ok_or(FetchError::Unauthorized)?;
        validate_url(url)?;

        let key = CacheKey::derive(token, url);
        if let Some(value) = self.revalidate(token, url, &key) {
            return Ok(Fetched::Cache(value));
        }
        self.fetch_fresh(token, url, &key).map(Fetched::Network)
    }

    fn revalidate(&self, token: &str, url: &str, key: &CacheKey) -> Option<Value> {
        let Some(entry) = self.cache.get(key) else {
            debug!(url, cache_key = %key, "cache miss");
            return None;
        };
        if !entry.has_validators() {
            debug!(url, cache_key = %key, "cached entry has no validators");
            return None;
        }

        match self.is_not_modified(token, url, &entry) {
            Ok(true) => match serde_json::from_str(&entry.body) {
                Ok(value) => {
                    debug!(url, cache_key = %key, "not modified, serving cached body");
                    Some(value)
                }
                Err(e) => {
                    warn!(url, cache_key = %key, error = %e, "cached body is not valid JSON, discarding");
                    self.cache.remove(key);
                    None
                }
            },
            Ok(false) => {
                debug!(url, cache_key = %key, "cached body is stale");
                None
            }
            Err(e) => {
                warn!(url, cache_key = %key, error = %e, "revalidation failed, falling back to full fetch");
                None
            }
        }
    }

    fn is_not_modified(&self, token: &str, url: &str, entry: &CacheEntry) -> Result<bool, RevalidationError> {
        let request = build_validation_request(token, url, &self.user_agent, entry)?;
        let response = self.transport.execute(&request)?;
        match response.status {
            304 => Ok(true),
            200..=299 => Ok(false),
            status => Err(RevalidationError::UnexpectedStatus(status)),
        }
    }

    fn fetch_fresh(&self, token: &str, url: &str, key: &CacheKey) -> Result<Value, FetchError> {
        let request = build_fetch_request(token, url, &self.user_agent);
        let response = self.transport.execute(&request).map_err(|e| {
            warn!(url, error = %e, "full fetch failed");
            e
        })?;

        check_status(response.status, &response.headers)?;
        if response.status != 200 {
            return Err(FetchError::api(response.status));
        }

        let value: Value = serde_json::from_str(&response.body).map_err(|e| FetchError::Decode(e.to_string()))?;

        let entry = CacheEntry {
            etag: non_blank(response.header("etag")),
            last_modified: non_blank(response.header("last-modified")),
            body: response.body,
        };
        if entry.has_validators() && !entry.body.trim().is_empty() {
            let stored = self.cache.set(key, entry);
            debug!(url, cache_key = %key, stored, "cached response");
        } else if self.cache.remove(key).is_some() {
            debug!(url, cache_key = %key, "response has no validators, dropped previous entry");
        } else {
            debug!(url, "response has no validators, not caching");
        }

        Ok(value)
    }
}

/// Accept `*.json` or `*.json?query`, case-insensitively.
pub fn validate_url(url: &str) -> Result<(), FetchError> {
    let path = url.split_once('?').map_or(url, |(path, _)| path);
    if path.to_ascii_lowercase().ends_with(".json") {
        Ok(())
    } else {
        Err(FetchError::MalformedUrl(url.to_string()))
    }
}

/// HEAD request asking whether `entry` is still current.
///
/// An unreadable `Last-Modified` is left out when an `ETag` can still carry
/// the condition. With nothing left to send, the request is not built.
pub fn build_validation_request(
    token: &str,
    url: &str,
    user_agent: &str,
    entry: &CacheEntry,
) -> Result<HttpRequest, RevalidationError> {
    let mut headers = base_headers(token, user_agent);
    if let Some(last_modified) = &entry.last_modified {
        match to_http_date(last_modified) {
            Ok(date) => headers.push(("If-Modified-Since".to_string(), date)),
            Err(e) if entry.etag.is_some() => {
                debug!(url, error = %e, "dropping If-Modified-Since, revalidating by ETag only");
            }
            Err(e) => return Err(e),
        }
    }
    if let Some(etag) = &entry.etag {
        headers.push(("If-None-Match".to_string(), etag.clone()));
    }
    Ok(HttpRequest {
        method: HttpMethod::Head,
        url: url.to_string(),
        headers,
        body: None,
    })
}

/// Unconditional GET.
pub fn build_fetch_request(token: &str, url: &str, user_agent: &str) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Get,
        url: url.to_string(),
        headers: base_headers(token, user_agent),
        body: None,
    }
}

fn base_headers(token: &str, user_agent: &str) -> Vec<(String, String)> {
    vec![
        ("Authorization".to_string(), format!("Bearer {token}")),
        ("User-Agent".to_string(), user_agent.to_string()),
    ]
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Obsolete HTTP date forms that recipients still have to accept: RFC 850
/// and C `asctime()`. Both are implicitly GMT.
const OBSOLETE_DATE_FORMATS: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];

/// Normalise a stored `Last-Modified` value to IMF-fixdate.
fn to_http_date(raw: &str) -> Result<String, RevalidationError> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|date| date.with_timezone(&Utc))
        .or_else(|_| {
            OBSOLETE_DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|naive| naive.and_utc())
                .ok_or_else(|| RevalidationError::BadLastModified(raw.to_string()))
        })?;
    Ok(parsed.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}
