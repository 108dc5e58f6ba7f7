use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Tracks the pacing state of one domain
#[derive(Debug, Clone, Default)]
pub struct DomainClock {
    /// Number of requests completed against this domain in the current run
    pub request_count: u32,

    /// When the last request to this domain completed
    pub last_completed: Option<Instant>,
}

impl DomainClock {
    /// Creates a new DomainClock with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates the time until the next request can be made
    ///
    /// # Arguments
    ///
    /// * `interval` - The minimum gap between completed requests
    /// * `now` - The current time instant
    ///
    /// # Returns
    ///
    /// * `None` - A request can be made now
    /// * `Some(duration)` - How long to wait first
    pub fn time_until_next_request(&self, interval: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_completed?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < interval {
            Some(interval - elapsed)
        } else {
            None
        }
    }

    /// Records that a request to this domain completed
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_completed = Some(now);
    }
}

/// Per-domain pacing gate shared by all workers
///
/// Each domain has its own clock behind an async mutex. A worker acquires a
/// [`PacingPermit`] before issuing a request and holds it until the request completes,
/// so requests to one domain are serialized and spaced by at least the interval, while
/// different domains never wait on each other.
#[derive(Debug, Default, Clone)]
pub struct Pacer {
    clocks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<DomainClock>>>>>,
}

impl Pacer {
    /// Creates a pacer with no domain history
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the domain's turn and returns a permit
    ///
    /// # Arguments
    ///
    /// * `domain` - The pacing key (origin) of the request
    /// * `interval` - The effective minimum interval for this request
    pub async fn acquire(&self, domain: &str, interval: Duration) -> PacingPermit {
        let clock = self.clock_for(domain);
        let guard = clock.lock_owned().await;

        if let Some(wait) = guard.time_until_next_request(interval, Instant::now()) {
            tracing::debug!("Pacing {}: waiting {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }

        PacingPermit { guard }
    }

    /// Returns the number of completed requests recorded for a domain
    pub async fn request_count(&self, domain: &str) -> u32 {
        self.clock_for(domain).lock().await.request_count
    }

    fn clock_for(&self, domain: &str) -> Arc<AsyncMutex<DomainClock>> {
        let mut clocks = match self.clocks.lock() {
            Ok(clocks) => clocks,
            Err(poisoned) => poisoned.into_inner(),
        };
        clocks
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(DomainClock::new())))
            .clone()
    }
}

/// Exclusive right to issue one request against a domain
///
/// Dropping the permit records the completion time on the domain's clock. Retries of
/// the same request happen while the permit is held and therefore advance the clock
/// once.
#[derive(Debug)]
pub struct PacingPermit {
    guard: OwnedMutexGuard<DomainClock>,
}

impl Drop for PacingPermit {
    fn drop(&mut self) {
        self.guard.record_request(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock_allows_request() {
        let clock = DomainClock::new();
        assert_eq!(clock.request_count, 0);
        assert!(clock
            .time_until_next_request(Duration::from_secs(2), Instant::now())
            .is_none());
    }

    #[test]
    fn test_time_until_next_request() {
        let mut clock = DomainClock::new();
        let now = Instant::now();
        clock.record_request(now);

        let wait = clock.time_until_next_request(Duration::from_secs(2), now);
        assert_eq!(wait, Some(Duration::from_secs(2)));

        let later = now + Duration::from_millis(1500);
        let wait = clock.time_until_next_request(Duration::from_secs(2), later);
        assert_eq!(wait, Some(Duration::from_millis(500)));

        let much_later = now + Duration::from_secs(3);
        assert!(clock
            .time_until_next_request(Duration::from_secs(2), much_later)
            .is_none());
    }

    #[test]
    fn test_zero_interval_never_waits() {
        let mut clock = DomainClock::new();
        let now = Instant::now();
        clock.record_request(now);
        assert!(clock.time_until_next_request(Duration::ZERO, now).is_none());
    }

    #[tokio::test]
    async fn test_consecutive_requests_are_spaced() {
        let pacer = Pacer::new();
        let interval = Duration::from_millis(100);
        let start = Instant::now();

        for _ in 0..4 {
            let _permit = pacer.acquire("https://example.test", interval).await;
        }

        // N requests take at least (N - 1) intervals
        assert!(start.elapsed() >= interval * 3);
        assert_eq!(pacer.request_count("https://example.test").await, 4);
    }

    #[tokio::test]
    async fn test_concurrent_workers_serialize_per_domain() {
        let pacer = Pacer::new();
        let interval = Duration::from_millis(80);
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let pacer = pacer.clone();
                tokio::spawn(async move {
                    let _permit = pacer.acquire("https://example.test", interval).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(start.elapsed() >= interval * 2);
    }

    #[tokio::test]
    async fn test_domains_do_not_block_each_other() {
        let pacer = Pacer::new();
        let interval = Duration::from_secs(5);

        drop(pacer.acquire("https://a.test", interval).await);

        let start = Instant::now();
        drop(pacer.acquire("https://b.test", interval).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
