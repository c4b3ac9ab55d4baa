//! TTL'd cache for idempotent requests.
//!
//! Entries are keyed by the canonical request key and carry their insertion
//! time; the freshness window is supplied per read, so one cache serves
//! callers with different timeouts. Safe under concurrent readers and
//! writers; stores are last-writer-wins.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::debug;
use tokio::time::Instant;

/// Identity of a request for caching and pacing purposes.
///
/// Two calls share a key only when the method, canonical URL, sorted
/// parameters, and bearer identity all agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Vec<(String, String)>,
    pub bearer_id: String,
}

impl RequestKey {
    pub fn new(
        method: &str,
        url: &str,
        query: &[(String, String)],
        body: &[(String, String)],
        bearer_id: &str,
    ) -> Self {
        let mut query = query.to_vec();
        query.sort();
        let mut body = body.to_vec();
        body.sort();
        Self {
            method: method.to_uppercase(),
            url: canonical_url(url),
            query,
            body,
            bearer_id: bearer_id.to_string(),
        }
    }

    /// Whether this key's method is safe to cache.
    pub fn is_safe_method(&self) -> bool {
        self.method == "GET" || self.method == "HEAD"
    }
}

/// Lowercase the scheme and host and strip default ports; path case is
/// preserved.
pub fn canonical_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        // Url::parse normalises scheme/host case and drops default ports.
        Ok(parsed) => {
            let mut parsed = parsed;
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// A cacheable outcome: a decoded-ready body, or the target of one of the
/// redirect-based endpoints.
#[derive(Debug, Clone)]
pub enum CachedResponse {
    Body(Arc<String>),
    Redirect(String),
}

#[derive(Debug, Clone)]
struct Entry {
    inserted: Instant,
    value: CachedResponse,
}

/// Concurrent response cache keyed by [`RequestKey`].
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<RequestKey, Entry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the entry for `key` if it is younger than `max_age`. A stale
    /// entry is dropped on the way out.
    pub fn lookup(&self, key: &RequestKey, max_age: Duration) -> Option<CachedResponse> {
        let fresh = {
            let entry = self.entries.get(key)?;
            if entry.inserted.elapsed() < max_age {
                Some(entry.value.clone())
            } else {
                None
            }
        };
        if fresh.is_none() {
            self.entries.remove(key);
            debug!("Cache entry for {} expired", key.url);
        }
        fresh
    }

    pub fn store(&self, key: RequestKey, value: CachedResponse) {
        self.entries.insert(
            key,
            Entry {
                inserted: Instant::now(),
                value,
            },
        );
    }

    /// Remove every entry whose canonical URL matches any of the given URLs.
    pub fn evict_urls(&self, urls: &[String]) {
        let targets: Vec<String> = urls.iter().map(|u| canonical_url(u)).collect();
        let before = self.entries.len();
        self.entries.retain(|key, _| !targets.contains(&key.url));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!("Evicted {} cached responses", evicted);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
