//! In-process stand-in for the remote project-management API.
//!
//! Serves `.json` resources with `ETag` / `Last-Modified` validators, answers
//! conditional requests with 304, and emulates the authorization-code token
//! endpoint. Every request is counted per method so tests can assert exactly
//! which round-trips a client made.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub use axum::http::Method;

pub const CLIENT_ID: &str = "mock-client";
pub const CLIENT_SECRET: &str = "mock-secret";
pub const AUTH_CODE: &str = "mock-code";
pub const ACCESS_TOKEN: &str = "mock-token";

pub const PROJECTS_PATH: &str = "/999/api/v1/projects.json";
pub const PEOPLE_PATH: &str = "/999/api/v1/people.json";
pub const CALENDARS_PATH: &str = "/999/api/v1/calendars.json";
pub const THROTTLED_PATH: &str = "/999/api/v1/throttled.json";
pub const BROKEN_PATH: &str = "/999/api/v1/broken.json";

/// A JSON document and the validators served with it.
#[derive(Clone, Debug)]
pub struct Resource {
    pub body: Value,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Resource {
    /// True if the request's conditional headers match the current version.
    /// `If-None-Match` takes precedence over `If-Modified-Since`.
    fn matches(&self, headers: &HeaderMap) -> bool {
        if let Some(if_none_match) = header_str(headers, header::IF_NONE_MATCH) {
            return self
                .etag
                .as_deref()
                .is_some_and(|etag| if_none_match == "*" || if_none_match.split(',').any(|t| t.trim() == etag));
        }
        match (header_str(headers, header::IF_MODIFIED_SINCE), &self.last_modified) {
            (Some(since), Some(last_modified)) => since == last_modified,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Endpoint {
    Resource(Resource),
    RateLimited { retry_after: u64 },
    Status(u16),
}

#[derive(Default)]
struct Hits {
    get: AtomicUsize,
    head: AtomicUsize,
    post: AtomicUsize,
}

struct Inner {
    endpoints: RwLock<HashMap<String, Endpoint>>,
    tokens: RwLock<HashSet<String>>,
    codes: RwLock<HashMap<String, String>>,
    hits: Hits,
}

/// Shared handle onto the mock's state. Clones see the same endpoints and
/// counters, so a test can keep one while the server runs another.
#[derive(Clone)]
pub struct MockApi {
    inner: Arc<Inner>,
}

impl MockApi {
    /// An API with no endpoints, tokens or codes.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoints: RwLock::new(HashMap::new()),
                tokens: RwLock::new(HashSet::new()),
                codes: RwLock::new(HashMap::new()),
                hits: Hits::default(),
            }),
        }
    }

    pub fn put_endpoint(&self, path: &str, endpoint: Endpoint) {
        self.inner.endpoints.write().insert(path.to_string(), endpoint);
    }

    pub fn put_resource(&self, path: &str, body: Value, etag: Option<&str>, last_modified: Option<&str>) {
        self.put_endpoint(
            path,
            Endpoint::Resource(Resource {
                body,
                etag: etag.map(str::to_string),
                last_modified: last_modified.map(str::to_string),
            }),
        );
    }

    pub fn authorize_token(&self, token: &str) {
        self.inner.tokens.write().insert(token.to_string());
    }

    pub fn revoke_token(&self, token: &str) {
        self.inner.tokens.write().remove(token);
    }

    /// Make `code` exchangeable for `token`.
    pub fn grant_code(&self, code: &str, token: &str) {
        self.inner.codes.write().insert(code.to_string(), token.to_string());
    }

    pub fn hits(&self, method: &Method) -> usize {
        let counter = match *method {
            Method::GET => &self.inner.hits.get,
            Method::HEAD => &self.inner.hits.head,
            Method::POST => &self.inner.hits.post,
            _ => return 0,
        };
        counter.load(Ordering::SeqCst)
    }

    pub fn reset_hits(&self) {
        for counter in [&self.inner.hits.get, &self.inner.hits.head, &self.inner.hits.post] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    fn record(&self, method: &Method) {
        let counter = match *method {
            Method::GET => &self.inner.hits.get,
            Method::HEAD => &self.inner.hits.head,
            Method::POST => &self.inner.hits.post,
            _ => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        header_str(headers, header::AUTHORIZATION)
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| self.inner.tokens.read().contains(token))
    }
}

impl Default for MockApi {
    /// Seeded with one client registration, one grantable code and one
    /// endpoint per interesting server behavior.
    fn default() -> Self {
        let api = Self::empty();
        api.authorize_token(ACCESS_TOKEN);
        api.grant_code(AUTH_CODE, ACCESS_TOKEN);
        api.put_resource(
            PROJECTS_PATH,
            json!([{"id": 1, "name": "Launch"}, {"id": 2, "name": "Hiring"}]),
            Some("\"projects-v1\""),
            Some("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        api.put_resource(PEOPLE_PATH, json!([{"id": 7, "name": "Jason"}]), None, None);
        api.put_resource(
            CALENDARS_PATH,
            json!([{"id": 3, "name": "Releases"}]),
            None,
            Some("Thu, 22 Oct 2015 07:28:00 GMT"),
        );
        api.put_endpoint(THROTTLED_PATH, Endpoint::RateLimited { retry_after: 30 });
        api.put_endpoint(BROKEN_PATH, Endpoint::Status(500));
        api
    }
}

pub fn app(api: MockApi) -> Router {
    Router::new()
        .route("/authorization/token", post(exchange_token))
        .route("/{*path}", get(serve_resource))
        .with_state(api)
}

pub async fn run(listener: TcpListener, api: MockApi) -> Result<(), std::io::Error> {
    axum::serve(listener, app(api)).await
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

// GET routes also answer HEAD; axum strips the body.
async fn serve_resource(State(api): State<MockApi>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    api.record(&method);
    tracing::debug!(%method, path = uri.path(), "request");

    if !api.is_authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let endpoint = api.inner.endpoints.read().get(uri.path()).cloned();
    match endpoint {
        None => StatusCode::NOT_FOUND.into_response(),
        Some(Endpoint::RateLimited { retry_after }) => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            "rate limit exceeded",
        )
            .into_response(),
        Some(Endpoint::Status(status)) => StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Some(Endpoint::Resource(resource)) => {
            let status = if resource.matches(&headers) {
                StatusCode::NOT_MODIFIED
            } else {
                StatusCode::OK
            };
            let mut response = if status == StatusCode::OK {
                Json(resource.body).into_response()
            } else {
                status.into_response()
            };
            let validators = [
                (header::ETAG, resource.etag),
                (header::LAST_MODIFIED, resource.last_modified),
            ];
            for (name, value) in validators {
                if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
                    response.headers_mut().insert(name, value);
                }
            }
            response
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenParams {
    #[serde(rename = "type")]
    pub kind: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub client_secret: String,
    pub code: String,
}

async fn exchange_token(State(api): State<MockApi>, Query(params): Query<TokenParams>) -> Response {
    api.record(&Method::POST);

    let registered = params.kind == "web_server"
        && params.client_id == CLIENT_ID
        && params.client_secret == CLIENT_SECRET
        && !params.redirect_uri.is_empty();
    let token = api.inner.codes.write().remove(&params.code);
    match token {
        Some(token) if registered => (
            StatusCode::OK,
            Json(json!({
                "access_token": token,
                "expires_in": 1_209_600,
                "refresh_token": format!("refresh-{token}"),
            })),
        )
            .into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "authorization_expired"})),
        )
            .into_response(),
    }
}
