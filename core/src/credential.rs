//! The bearer credential presented on every request.
//!
//! A `Credential` carries the complete JSON object returned by the token
//! endpoint. Only `access_token` is interpreted; every other field rides
//! along untouched so callers can persist and restore the whole payload.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential {
    payload: Value,
}

impl Credential {
    pub fn from_access_token(token: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("access_token".to_string(), Value::String(token.into()));
        Self {
            payload: Value::Object(payload),
        }
    }

    /// Wrap a token-endpoint response as-is. Any shape is accepted; a payload
    /// without a usable `access_token` is simply not authenticated.
    pub fn from_json(payload: Value) -> Self {
        Self { payload }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.payload.get("access_token").and_then(Value::as_str)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.payload.get("refresh_token").and_then(Value::as_str)
    }

    pub fn expires_in(&self) -> Option<u64> {
        self.payload.get("expires_in").and_then(Value::as_u64)
    }

    /// True iff `access_token` is a non-blank string. Never fails.
    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some_and(|token| !token.trim().is_empty())
    }

    /// The access token, only when authenticated.
    pub(crate) fn bearer(&self) -> Option<&str> {
        self.access_token().filter(|token| !token.trim().is_empty())
    }

    pub fn as_json(&self) -> &Value {
        &self.payload
    }

    pub fn into_json(self) -> Value {
        self.payload
    }
}

impl Default for Credential {
    fn default() -> Self {
        Self { payload: Value::Null }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("authenticated", &self.is_authenticated())
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}
