//! Blocking client core for the Basecamp-style project-management API.
//!
//! # Overview
//! Turns a bearer credential and a `.json` resource URL into a decoded JSON
//! document, revalidating cached responses with `ETag` / `Last-Modified`
//! instead of downloading bodies again.
//!
//! # Design
//! - `ConditionalFetcher` is the whole protocol: auth gate, URL check,
//!   conditional HEAD, full GET, cache write-back, status mapping.
//! - Requests and responses are plain data (`HttpRequest` / `HttpResponse`);
//!   a `Transport` executes them, so tests can count round-trips.
//! - The `ResponseCache` is injected, never global. A cached body and its
//!   validators are stored as one `CacheEntry`.
//! - Failures are values: `FetchError` separates auth, rate limiting, API
//!   errors, transport failures and bad payloads.

pub mod cache;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod fetch;
pub mod http;
pub mod transport;

pub use cache::{CacheEntry, CacheKey, MemoryCache, NullCache, ResponseCache};
pub use client::BcxClient;
pub use config::ClientConfig;
pub use credential::Credential;
pub use error::{check_status, ConfigError, FetchError, TransportError};
pub use fetch::{ConditionalFetcher, Fetched};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
