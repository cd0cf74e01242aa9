//! Response cache: pluggable storage for bodies and their validators.
//!
//! # Design
//! A cached response is one [`CacheEntry`] holding the body together with the
//! `ETag` and `Last-Modified` values that describe it. Storing the three
//! facets as a single record means a reader can never observe a body paired
//! with another write's validators, even when fetches for the same key race.
//!
//! The store is injected into the fetcher as `Arc<dyn ResponseCache>`.
//! Implementations may drop entries at any time; the fetcher treats a missing
//! entry as a plain cache miss.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lookup key for a cached response.
///
/// Derived from the access token and the lower-cased URL, so a new token
/// never sees entries written under an old one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(token: &str, url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hasher.update(url.to_lowercase().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A previously fetched body plus the validators the server sent with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub body: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheEntry {
    pub fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// Key/value store for cached responses.
///
/// No operation fails on a missing key. No eviction, TTL or cross-call
/// atomicity is promised beyond each single `get`/`set`/`remove`.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Store `entry`, overwriting any existing value. Returns whether the
    /// entry was kept.
    fn set(&self, key: &CacheKey, entry: CacheEntry) -> bool;

    /// Remove and return the entry, if any.
    fn remove(&self, key: &CacheKey) -> Option<CacheEntry>;
}

/// Unbounded in-process cache.
///
/// Clones share the same underlying map, so one `MemoryCache` can be handed
/// to several clients explicitly.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &CacheKey, entry: CacheEntry) -> bool {
        self.entries.write().insert(key.clone(), entry);
        true
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.write().remove(key)
    }
}

/// A cache that keeps nothing. Every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl ResponseCache for NullCache {
    fn get(&self, _: &CacheKey) -> Option<CacheEntry> {
        None
    }

    fn set(&self, _: &CacheKey, _: CacheEntry) -> bool {
        false
    }

    fn remove(&self, _: &CacheKey) -> Option<CacheEntry> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(body: &str) -> CacheEntry {
        CacheEntry {
            body: body.to_string(),
            etag: Some("\"v1\"".to_string()),
            last_modified: None,
        }
    }

    #[test]
    fn key_is_stable_and_case_insensitive_in_url() {
        let a = CacheKey::derive("token", "https://example.com/1/api/v1/Projects.json");
        let b = CacheKey::derive("token", "https://EXAMPLE.com/1/api/v1/projects.JSON");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn key_differs_per_token() {
        let url = "https://example.com/1/api/v1/projects.json";
        assert_ne!(CacheKey::derive("alice", url), CacheKey::derive("bob", url));
    }

    #[test]
    fn token_case_is_significant() {
        let url = "https://example.com/1/api/v1/projects.json";
        assert_ne!(CacheKey::derive("Token", url), CacheKey::derive("token", url));
    }

    #[test]
    fn memory_cache_set_get_remove() {
        let cache = MemoryCache::new();
        let key = CacheKey::derive("t", "u.json");
        assert!(cache.get(&key).is_none());
        assert!(cache.remove(&key).is_none());

        assert!(cache.set(&key, entry("[1]")));
        assert_eq!(cache.get(&key), Some(entry("[1]")));
        assert_eq!(cache.len(), 1);

        assert!(cache.set(&key, entry("[2]")));
        assert_eq!(cache.get(&key).map(|e| e.body), Some("[2]".to_string()));
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.remove(&key), Some(entry("[2]")));
        assert!(cache.is_empty());
    }

    #[test]
    fn memory_cache_clones_share_storage() {
        let cache = MemoryCache::new();
        let handle = cache.clone();
        let key = CacheKey::derive("t", "u.json");
        handle.set(&key, entry("{}"));
        assert!(cache.get(&key).is_some());
        cache.clear();
        assert!(handle.is_empty());
    }

    #[test]
    fn concurrent_writers_never_tear_an_entry() {
        let cache = MemoryCache::new();
        let key = CacheKey::derive("t", "u.json");
        cache.set(&key, entry("v0"));

        std::thread::scope(|s| {
            for writer in 0..4 {
                let (cache, key) = (cache.clone(), key.clone());
                s.spawn(move || {
                    for round in 0..500 {
                        let version = format!("w{writer}-{round}");
                        cache.set(
                            &key,
                            CacheEntry {
                                body: version.clone(),
                                etag: Some(format!("\"{version}\"")),
                                last_modified: Some(version),
                            },
                        );
                    }
                });
            }
            for _ in 0..4 {
                let (cache, key) = (cache.clone(), key.clone());
                s.spawn(move || {
                    for _ in 0..500 {
                        let seen = cache.get(&key).unwrap();
                        if seen.body == "v0" {
                            continue;
                        }
                        assert_eq!(seen.etag, Some(format!("\"{}\"", seen.body)));
                        assert_eq!(seen.last_modified.as_deref(), Some(seen.body.as_str()));
                    }
                });
            }
        });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn null_cache_keeps_nothing() {
        let key = CacheKey::derive("t", "u.json");
        assert!(!NullCache.set(&key, entry("{}")));
        assert!(NullCache.get(&key).is_none());
        assert!(NullCache.remove(&key).is_none());
    }

    #[test]
    fn entry_validators() {
        let mut e = entry("{}");
        assert!(e.has_validators());
        e.etag = None;
        assert!(!e.has_validators());
    }
}
