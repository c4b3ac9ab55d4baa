//! The pluggable pacing-and-cache seam of the pipeline.
//!
//! Sessions hold an `Arc<dyn Handler>`. The default implementation is a
//! per-process singleton wrapping the in-process rate limiter and response
//! cache, so every session in a process shares one ledger; alternative
//! handlers can marshal these behaviours elsewhere (for example to a
//! cross-process server).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::cache::{CachedResponse, RequestKey, ResponseCache};
use super::ratelimit::RateLimiter;

#[async_trait]
pub trait Handler: Send + Sync {
    /// Block until the bearer's pacing window has passed.
    async fn throttle(&self, bearer_id: &str, delay: Duration);

    /// Look for a cached response younger than `max_age`.
    fn cache_lookup(&self, key: &RequestKey, max_age: Duration) -> Option<CachedResponse>;

    /// Record a response under its request key.
    fn cache_store(&self, key: RequestKey, value: CachedResponse);

    /// Drop every cached response whose URL matches one of the given URLs.
    fn evict(&self, urls: &[String]);

    /// Drop everything.
    fn clear_cache(&self);
}

/// In-process handler: [`RateLimiter`] plus [`ResponseCache`].
#[derive(Debug, Default)]
pub struct DefaultHandler {
    limiter: RateLimiter,
    cache: ResponseCache,
}

impl DefaultHandler {
    pub fn new() -> Self {
        Self {
            limiter: RateLimiter::new(),
            cache: ResponseCache::new(),
        }
    }
}

#[async_trait]
impl Handler for DefaultHandler {
    async fn throttle(&self, bearer_id: &str, delay: Duration) {
        self.limiter.evict_expired();
        self.limiter.throttle(bearer_id, delay).await;
    }

    fn cache_lookup(&self, key: &RequestKey, max_age: Duration) -> Option<CachedResponse> {
        self.cache.lookup(key, max_age)
    }

    fn cache_store(&self, key: RequestKey, value: CachedResponse) {
        self.cache.store(key, value);
    }

    fn evict(&self, urls: &[String]) {
        self.cache.evict_urls(urls);
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}

static GLOBAL_HANDLER: Lazy<Arc<DefaultHandler>> = Lazy::new(|| Arc::new(DefaultHandler::new()));

/// The process-wide default handler, initialised at first use.
pub fn global_handler() -> Arc<dyn Handler> {
    Arc::clone(&*GLOBAL_HANDLER) as Arc<dyn Handler>
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_handler_is_a_singleton() {
        let a = global_handler();
        let b = global_handler();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn handler_round_trips_cache_entries() {
        let handler = DefaultHandler::new();
        let key = RequestKey::new("GET", "https://www.reddit.com/r/rust/about.json", &[], &[], "b");
        handler.cache_store(
            key.clone(),
            CachedResponse::Body(Arc::new("{\"kind\":\"t5\"}".to_string())),
        );
        assert!(handler
            .cache_lookup(&key, Duration::from_secs(30))
            .is_some());

        handler.evict(&["https://www.reddit.com/r/rust/about.json".to_string()]);
        assert!(handler
            .cache_lookup(&key, Duration::from_secs(30))
            .is_none());
    }
}
