//! Cursor-driven pagination over reddit listings.
//!
//! A [`ListingGenerator`] is a lazy pull-based sequence: nothing is fetched
//! until the first `next().await`, and each page goes through the full
//! request pipeline, so a token refresh mid-iteration is transparent.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::client::{Call, RedditClient};
use crate::errors::RedditError;
use crate::models::Thing;

/// Page size requested while a finite number of items remains.
const PAGE_SIZE: u64 = 25;
/// Page size requested for unbounded iteration.
const UNBOUNDED_PAGE_SIZE: u64 = 100;

/// Lazy sequence of things from a paginated endpoint.
///
/// Limit semantics: `Some(0)` fetches a single page at the server's default
/// size, `None` iterates until the server stops returning an `after`
/// cursor, and any other value caps the number of items yielded.
pub struct ListingGenerator {
    client: RedditClient,
    path: String,
    params: Vec<(String, String)>,
    limit: Option<u64>,
    place_holder: Option<String>,
    object_filter: Option<usize>,
    after: Option<String>,
    yielded: u64,
    buffer: VecDeque<Thing>,
    exhausted: bool,
}

impl ListingGenerator {
    pub fn new(client: RedditClient, path: &str, params: &[(String, String)]) -> Self {
        Self {
            client,
            path: path.to_string(),
            params: params.to_vec(),
            limit: Some(0),
            place_holder: None,
            object_filter: None,
            after: None,
            yielded: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Cap the total number of items yielded. See the type docs for the
    /// `Some(0)` and `None` cases.
    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Stop iterating when this fullname is reached. The matching item
    /// itself is not yielded.
    pub fn place_holder(mut self, fullname: &str) -> Self {
        self.place_holder = Some(fullname.to_string());
        self
    }

    /// For endpoints returning several top-level listings, which one to
    /// paginate.
    pub fn object_filter(mut self, index: usize) -> Self {
        self.object_filter = Some(index);
        self
    }

    /// Add a fixed query parameter to every page request.
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    /// The next item, fetching a page when the buffer runs dry. `Ok(None)`
    /// ends the sequence.
    pub async fn next(&mut self) -> Result<Option<Thing>, RedditError> {
        loop {
            if let Some(limit) = self.limit {
                if limit > 0 && self.yielded >= limit {
                    return Ok(None);
                }
            }

            if let Some(item) = self.buffer.pop_front() {
                if let (Some(stop), Some(fullname)) = (&self.place_holder, item.fullname()) {
                    if *stop == fullname {
                        debug!("Place-holder {} reached; ending iteration", fullname);
                        self.exhausted = true;
                        self.buffer.clear();
                        return Ok(None);
                    }
                }
                self.yielded += 1;
                return Ok(Some(item));
            }

            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
            if self.buffer.is_empty() {
                self.exhausted = true;
                return Ok(None);
            }
        }
    }

    /// Drain the remaining sequence into a vector.
    pub async fn collect(mut self) -> Result<Vec<Thing>, RedditError> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    async fn fetch_page(&mut self) -> Result<(), RedditError> {
        let mut query = self.params.clone();
        if let Some(page) = page_limit(self.limit, self.yielded) {
            query.push(("limit".to_string(), page.to_string()));
        }
        if self.yielded > 0 {
            query.push(("count".to_string(), self.yielded.to_string()));
        }
        if let Some(after) = &self.after {
            query.push(("after".to_string(), after.clone()));
        }

        let thing = self.client.get(&self.path, &query).await?;
        let listing = match thing {
            Thing::Listing(listing) => listing,
            Thing::List(parts) => {
                let index = self.object_filter.unwrap_or(0);
                parts
                    .into_iter()
                    .nth(index)
                    .and_then(Thing::into_listing)
                    .ok_or_else(|| {
                        RedditError::Client(format!(
                            "no listing at index {} of the response to {}",
                            index, self.path
                        ))
                    })?
            }
            other => {
                return Err(RedditError::Client(format!(
                    "expected a listing from {}, got {:?}",
                    self.path, other
                )))
            }
        };

        self.after = listing.after.clone();
        if self.after.is_none() || self.limit == Some(0) {
            self.exhausted = true;
        }
        debug!(
            "Fetched {} items from {}; next cursor {:?}",
            listing.children.len(),
            self.path,
            self.after
        );
        self.buffer.extend(listing.children);
        Ok(())
    }
}

/// Signals a [`ListingStream`] to stop. Cloneable so another task can hold
/// it while the stream is being consumed.
#[derive(Debug, Clone, Default)]
pub struct StreamHandle {
    stopped: Arc<AtomicBool>,
}

impl StreamHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Endless poll over a listing endpoint, yielding each item once.
///
/// Polls bypass the response cache, previously seen fullnames are skipped,
/// and empty polls sleep for the configured interval before trying again.
/// The stream ends only when its [`StreamHandle`] is stopped.
pub struct ListingStream {
    client: RedditClient,
    path: String,
    params: Vec<(String, String)>,
    poll_interval: Duration,
    seen: BoundedSet,
    buffer: VecDeque<Thing>,
    handle: StreamHandle,
}

impl ListingStream {
    pub fn new(client: RedditClient, path: &str, params: &[(String, String)]) -> Self {
        Self {
            client,
            path: path.to_string(),
            params: params.to_vec(),
            poll_interval: Duration::from_secs(2),
            seen: BoundedSet::new(301),
            buffer: VecDeque::new(),
            handle: StreamHandle::default(),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// A handle that cancels this stream from elsewhere.
    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// The next unseen item, polling until one arrives or the stream is
    /// stopped.
    pub async fn next(&mut self) -> Result<Option<Thing>, RedditError> {
        loop {
            if self.handle.is_stopped() {
                return Ok(None);
            }
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }

            let call = Call::get(&self.path)
                .query(&self.params)
                .query(&[("limit".to_string(), "100".to_string())])
                .cache_ignore();
            let thing = self.client.fetch(call).await?;
            let listing = thing.into_listing().ok_or_else(|| {
                RedditError::Client(format!("expected a listing from {}", self.path))
            })?;

            // Oldest first, so consumers see items in arrival order.
            for item in listing.children.into_iter().rev() {
                if let Some(fullname) = item.fullname() {
                    if self.seen.insert(&fullname) {
                        self.buffer.push_back(item);
                    }
                }
            }

            if self.buffer.is_empty() {
                debug!(
                    "No new items from {}; sleeping {}ms",
                    self.path,
                    self.poll_interval.as_millis()
                );
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }
}

/// Insertion-ordered set that forgets its oldest members past a cap.
struct BoundedSet {
    capacity: usize,
    members: HashSet<String>,
    order: VecDeque<String>,
}

impl BoundedSet {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            members: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// True when the value was not already present.
    fn insert(&mut self, value: &str) -> bool {
        if self.members.contains(value) {
            return false;
        }
        self.members.insert(value.to_string());
        self.order.push_back(value.to_string());
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        true
    }
}

/// The `limit` query parameter for the next page, given the remaining quota.
fn page_limit(limit: Option<u64>, yielded: u64) -> Option<u64> {
    match limit {
        None => Some(UNBOUNDED_PAGE_SIZE),
        Some(0) => None,
        Some(total) => Some(PAGE_SIZE.min(total.saturating_sub(yielded))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_set_forgets_the_oldest_entries() {
        let mut set = BoundedSet::new(3);
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert!(set.insert("b"));
        assert!(set.insert("c"));
        assert!(set.insert("d"));
        // "a" fell out of the window and counts as new again.
        assert!(set.insert("a"));
    }

    #[test]
    fn stream_handles_cancel_across_clones() {
        let handle = StreamHandle::default();
        let other = handle.clone();
        assert!(!handle.is_stopped());
        other.stop();
        assert!(handle.is_stopped());
    }

    #[test]
    fn page_limit_tracks_the_remaining_quota() {
        // Unbounded iteration uses the server's maximum page size.
        assert_eq!(page_limit(None, 0), Some(100));
        assert_eq!(page_limit(None, 500), Some(100));
        // Server-default single page sends no limit parameter.
        assert_eq!(page_limit(Some(0), 0), None);
        // Finite limits page at the default size until the tail.
        assert_eq!(page_limit(Some(50), 0), Some(25));
        assert_eq!(page_limit(Some(50), 25), Some(25));
        assert_eq!(page_limit(Some(30), 25), Some(5));
    }
}
