//! Per-bearer request pacing.
//!
//! Each bearer identity gets its own pacing slot; unauthenticated requests
//! share the sentinel slot. Consecutive dispatches through one slot are
//! spaced by the configured delay floor, and concurrent callers queue in
//! arrival order on the slot's mutex.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::debug;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Slots untouched for this long hold bearers that have long expired.
const SLOT_TTL: Duration = Duration::from_secs(3660);

#[derive(Debug, Default)]
struct Slot {
    /// The dispatch time most recently handed out. Claiming a dispatch time
    /// happens under this mutex; the sleep itself does not, so the next
    /// waiter paces behind the updated timestamp while we wait.
    last_dispatch: Mutex<Option<Instant>>,
}

/// Serialises requests per bearer identity and enforces the dispatch delay.
#[derive(Debug, Default)]
pub struct RateLimiter {
    slots: DashMap<String, Arc<Slot>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Block until this bearer's pacing window has passed, then claim the
    /// next dispatch time.
    pub async fn throttle(&self, bearer_id: &str, delay: Duration) {
        // Clone the Arc so the DashMap shard lock is released before any await.
        let slot = self
            .slots
            .entry(bearer_id.to_string())
            .or_insert_with(|| Arc::new(Slot::default()))
            .clone();

        let target = {
            let mut guard = slot.last_dispatch.lock().await;
            let now = Instant::now();
            let target = match *guard {
                Some(last) if delay > Duration::ZERO => {
                    let earliest = last + delay;
                    if earliest > now {
                        earliest
                    } else {
                        now
                    }
                }
                _ => now,
            };
            *guard = Some(target);
            target
        };

        let now = Instant::now();
        if target > now {
            debug!(
                "Pacing request for {:?} by {}ms",
                short_bearer(bearer_id),
                (target - now).as_millis()
            );
            tokio::time::sleep_until(target).await;
        }
    }

    /// Drop slots whose bearer has been idle past its token lifetime.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.slots.retain(|_, slot| {
            // A locked slot is in use; keep it.
            match slot.last_dispatch.try_lock() {
                Ok(guard) => match *guard {
                    Some(last) => now.duration_since(last) < SLOT_TTL,
                    None => true,
                },
                Err(_) => true,
            }
        });
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

// Tokens are secrets; log only a stub.
fn short_bearer(bearer_id: &str) -> &str {
    let end = bearer_id
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(bearer_id.len());
    &bearer_id[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_dispatch_is_immediate() {
        tokio::time::pause();

        let limiter = RateLimiter::new();
        let start = Instant::now();
        limiter.throttle("bearer-a", Duration::from_secs(1)).await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn consecutive_dispatches_respect_the_delay_floor() {
        tokio::time::pause();

        let limiter = RateLimiter::new();
        let start = Instant::now();
        limiter.throttle("bearer-a", Duration::from_secs(1)).await;
        limiter.throttle("bearer-a", Duration::from_secs(1)).await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        limiter.throttle("bearer-a", Duration::from_secs(1)).await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn bearers_pace_independently() {
        tokio::time::pause();

        let limiter = RateLimiter::new();
        limiter.throttle("bearer-a", Duration::from_secs(1)).await;

        let start = Instant::now();
        limiter.throttle("bearer-b", Duration::from_secs(1)).await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialised() {
        tokio::time::pause();

        let limiter = Arc::new(RateLimiter::new());
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.throttle("shared", Duration::from_secs(1)).await;
                    Instant::now()
                })
            })
            .collect();

        let mut dispatch_times = Vec::new();
        for task in tasks {
            dispatch_times.push(task.await.unwrap());
        }
        dispatch_times.sort();

        // Three claims through one slot: 0s, 1s, 2s.
        assert!(dispatch_times[1] - dispatch_times[0] >= Duration::from_secs(1));
        assert!(dispatch_times[2] - dispatch_times[1] >= Duration::from_secs(1));
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn zero_delay_never_sleeps() {
        tokio::time::pause();

        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..5 {
            limiter.throttle("bearer-a", Duration::ZERO).await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn idle_slots_are_evicted() {
        tokio::time::pause();

        let limiter = RateLimiter::new();
        limiter.throttle("stale", Duration::ZERO).await;
        assert_eq!(limiter.slot_count(), 1);

        tokio::time::advance(SLOT_TTL + Duration::from_secs(1)).await;
        limiter.throttle("fresh", Duration::ZERO).await;
        limiter.evict_expired();

        assert_eq!(limiter.slot_count(), 1);
    }
}
