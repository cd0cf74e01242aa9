//! Error types for the fetch pipeline.
//!
//! # Design
//! `FetchError` is the outcome taxonomy callers branch on. `Unauthorized` and
//! `MalformedUrl` are raised before any I/O; `RateLimited` and `Api` come from
//! [`check_status`]; `Transport` and `Decode` come from the full-fetch phase.
//! Nothing here is retried internally.

use thiserror::Error;

use crate::http::find_header;

/// A failure to complete a round-trip at all (DNS, connect, IO).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Errors returned by `ConditionalFetcher::fetch` and `BcxClient`.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No usable credential, a 401, or a failed token exchange.
    #[error("you cannot be authenticated with the remote API")]
    Unauthorized,

    /// The URL does not name a `.json` resource. Raised before any I/O.
    #[error("invalid URL {0:?}: URLs must end in .json")]
    MalformedUrl(String),

    /// The server returned 429. `retry_after` is the `Retry-After` header in
    /// seconds, when present and numeric.
    #[error("rate limit exceeded, try again in {}", format_retry(.retry_after))]
    RateLimited { retry_after: Option<u64> },

    /// Any other non-2xx status.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A 200 response whose body is not valid JSON.
    #[error("deserialization failed: {0}")]
    Decode(String),
}

impl FetchError {
    /// The HTTP status this error corresponds to, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Unauthorized => Some(401),
            FetchError::RateLimited { .. } => Some(429),
            FetchError::Api { status, .. } => Some(*status),
            FetchError::MalformedUrl(_) | FetchError::Transport(_) | FetchError::Decode(_) => None,
        }
    }

    pub(crate) fn api(status: u16) -> Self {
        FetchError::Api {
            status,
            message: format!("Try again later. Status code returned was {status}"),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

fn format_retry(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!("{secs} seconds"),
        None => "a moment".to_string(),
    }
}

/// Errors from validating a `ClientConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid token URL {url:?}: {reason}")]
    InvalidTokenUrl { url: String, reason: String },
}

/// Map a response status and headers to the error taxonomy.
///
/// 2xx passes. 401 is `Unauthorized`, 429 is `RateLimited` carrying the
/// parsed `Retry-After` seconds, anything else is `Api`.
pub fn check_status(status: u16, headers: &[(String, String)]) -> Result<(), FetchError> {
    match status {
        200..=299 => Ok(()),
        401 => Err(FetchError::Unauthorized),
        429 => {
            let retry_after = find_header(headers, "retry-after").and_then(|v| v.trim().parse::<u64>().ok());
            Err(FetchError::RateLimited { retry_after })
        }
        _ => Err(FetchError::api(status)),
    }
}
