//! Politeness gate
//!
//! [`PolicyGate`] answers whether a URL may be fetched and how long to space requests
//! to its domain. Policies are fetched lazily, once per origin, and cached as immutable
//! snapshots for the lifetime of the run.

use crate::config::PolitenessConfig;
use crate::crawler::{FetchRequest, Fetcher};
use crate::robots::PolicySnapshot;
use crate::url::origin_key;
use reqwest::header::{HeaderValue, ACCEPT};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

/// Reason reported for every URL when robots checking is switched off
pub const CHECK_DISABLED_REASON: &str = "robots.txt checking disabled";

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl PolicyDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn allow_with(reason: &str) -> Self {
        Self {
            allowed: true,
            reason: Some(reason.to_string()),
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

type SnapshotCell = Arc<OnceCell<Arc<PolicySnapshot>>>;

/// Evaluates URLs against robots.txt and supplies the effective pacing interval
#[derive(Debug, Clone)]
pub struct PolicyGate {
    fetcher: Fetcher,
    politeness: PolitenessConfig,
    min_interval: Duration,
    snapshots: Arc<Mutex<HashMap<String, SnapshotCell>>>,
}

impl PolicyGate {
    /// Creates a gate that fetches robots.txt through the given fetcher
    pub fn new(fetcher: Fetcher, politeness: PolitenessConfig) -> Self {
        let min_interval = fetcher.min_interval();
        Self {
            fetcher,
            politeness,
            min_interval,
            snapshots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Checks whether a URL may be fetched
    ///
    /// With robots checking disabled every URL is allowed and the reason says so.
    pub async fn is_allowed(&self, url: &Url) -> PolicyDecision {
        if !self.politeness.respect_robots {
            return PolicyDecision::allow_with(CHECK_DISABLED_REASON);
        }

        let snapshot = self.snapshot_for(url).await;
        if snapshot.is_allowed(url.as_str()) {
            PolicyDecision::allow()
        } else {
            PolicyDecision::deny(format!("disallowed by robots.txt: {}", url.path()))
        }
    }

    /// Returns the crawl delay that applies to the URL's domain
    ///
    /// Robots.txt is still consulted when robots checking is disabled; only
    /// `respect_crawl_delay = false` turns the delay off.
    pub async fn crawl_delay(&self, url: &Url) -> Duration {
        if !self.politeness.respect_crawl_delay {
            return Duration::ZERO;
        }

        self.snapshot_for(url)
            .await
            .crawl_delay()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Returns the pacing interval to use for requests to the URL's domain
    ///
    /// This is the configured minimum raised to the crawl delay when that is larger.
    /// The configuration itself is never changed.
    pub async fn effective_interval(&self, url: &Url) -> Duration {
        self.min_interval.max(self.crawl_delay(url).await)
    }

    /// Returns the sitemap URLs advertised by the URL's domain
    pub async fn sitemaps(&self, url: &Url) -> Vec<Url> {
        self.snapshot_for(url)
            .await
            .sitemaps()
            .iter()
            .filter_map(|s| Url::parse(s).ok())
            .collect()
    }

    /// Returns the cached policy for a domain, fetching it on first use
    pub async fn snapshot_for(&self, url: &Url) -> Arc<PolicySnapshot> {
        let agent = self.fetcher.identity().token().to_string();
        let Some(key) = origin_key(url) else {
            return Arc::new(PolicySnapshot::allow_all(&agent));
        };

        let cell = self.lock_snapshots().entry(key.clone()).or_default().clone();

        cell.get_or_init(|| async {
            let snapshot = self.fetch_snapshot(&key, &agent).await;
            Arc::new(snapshot)
        })
        .await
        .clone()
    }

    /// Fetches and parses `/robots.txt`; any failure yields an allow-all policy
    async fn fetch_snapshot(&self, origin: &str, agent: &str) -> PolicySnapshot {
        let robots_url = match Url::parse(&format!("{}/robots.txt", origin)) {
            Ok(url) => url,
            Err(_) => return PolicySnapshot::allow_all(agent),
        };

        let request = FetchRequest::get(robots_url.clone())
            .with_interval(self.min_interval)
            .with_header(ACCEPT, HeaderValue::from_static("text/plain"));
        match self.fetcher.fetch(request).await {
            Ok(response) => match response.text().await {
                Ok(body) => {
                    tracing::debug!("Loaded {}", robots_url);
                    PolicySnapshot::from_content(&body, agent)
                }
                Err(e) => {
                    tracing::info!("Unreadable {} ({}), allowing all", robots_url, e);
                    PolicySnapshot::allow_all(agent)
                }
            },
            Err(failure) => {
                tracing::info!("No robots.txt for {} ({}), allowing all", origin, failure.reason);
                PolicySnapshot::allow_all(agent)
            }
        }
    }

    fn lock_snapshots(&self) -> std::sync::MutexGuard<'_, HashMap<String, SnapshotCell>> {
        match self.snapshots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
