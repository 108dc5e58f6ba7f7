//! URL discovery
//!
//! The frontier walks a site breadth-first from a seed, one depth level at a time.
//! Pages of a level are fetched concurrently by a bounded number of workers, while the
//! bookkeeping (seen set, first-seen depth, discovery state) stays with the task that
//! drives the traversal, so it has a single writer.

use crate::crawler::fetcher::{FetchFailure, FetchRequest, Fetcher};
use crate::crawler::markup::{extract_sitemap_locs, Markup};
use crate::robots::PolicyGate;
use crate::state::PageState;
use crate::url::{is_valid_url, normalize_url, same_origin};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Traversal limits
#[derive(Debug, Clone, Copy)]
pub struct FrontierLimits {
    /// Deepest level fetched; the seed is depth 0
    pub max_depth: u32,
    /// Pages fetched concurrently within a level
    pub workers: usize,
    /// Seed sitemap `<loc>` entries at depth 1
    pub follow_sitemaps: bool,
}

/// Result of a discovery pass
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Accepted, policy-allowed URLs in the order they were first seen
    pub discovered: Vec<Url>,
    /// In-scope URLs refused by the politeness policy, with the reason
    pub excluded: Vec<(Url, String)>,
    /// URLs whose fetch failed; traversal stopped there
    pub failed: Vec<Url>,
}

/// What happened when a queued URL was visited
enum Visit {
    Disallowed(String),
    Failed(FetchFailure),
    NotMarkup,
    Links(Vec<Url>),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: PageState,
    depth: u32,
}

/// Seen set and per-URL discovery state; owned by the traversal loop
#[derive(Debug, Default)]
struct FrontierState {
    entries: HashMap<String, Entry>,
    accepted: Vec<Url>,
}

impl FrontierState {
    /// Accepts a URL at `depth` if it has never been seen
    ///
    /// First-seen depth wins: a later sighting at a shallower depth changes nothing.
    fn accept(&mut self, url: &Url, depth: u32) -> bool {
        if self.entries.contains_key(url.as_str()) {
            return false;
        }
        self.entries.insert(
            url.to_string(),
            Entry {
                state: PageState::Enqueued,
                depth,
            },
        );
        self.accepted.push(url.clone());
        true
    }

    fn advance(&mut self, url: &Url, next: PageState) {
        if let Some(entry) = self.entries.get_mut(url.as_str()) {
            debug_assert!(
                entry.state.can_transition_to(next),
                "{} -> {} for {}",
                entry.state,
                next,
                url
            );
            entry.state = next;
        }
    }

    fn state_of(&self, url: &Url) -> PageState {
        self.entries
            .get(url.as_str())
            .map(|e| e.state)
            .unwrap_or_default()
    }
}

/// Breadth-first, domain-scoped, deduplicated discovery
#[derive(Clone)]
pub struct Frontier {
    fetcher: Fetcher,
    gate: PolicyGate,
    markup: Arc<dyn Markup>,
    limits: FrontierLimits,
}

impl Frontier {
    pub fn new(
        fetcher: Fetcher,
        gate: PolicyGate,
        markup: Arc<dyn Markup>,
        limits: FrontierLimits,
    ) -> Self {
        Self {
            fetcher,
            gate,
            markup,
            limits,
        }
    }

    /// Discovers in-scope URLs reachable from `seed` within the depth limit
    ///
    /// Only URLs with the seed's scheme and host are accepted. Every accepted URL is
    /// checked against the politeness policy before it is fetched; refused URLs are
    /// reported in `excluded` and never returned as discovered.
    pub async fn discover(&self, seed: &Url) -> DiscoveryReport {
        let mut state = FrontierState::default();
        let mut report = DiscoveryReport::default();

        let Ok(seed) = normalize_url(seed.as_str()) else {
            return report;
        };

        state.accept(&seed, 0);
        let mut level: Vec<(Url, u32)> = vec![(seed.clone(), 0)];

        if self.limits.follow_sitemaps && self.limits.max_depth >= 1 {
            for url in self.sitemap_urls(&seed).await {
                if self.in_scope(&seed, &url) && state.accept(&url, 1) {
                    tracing::debug!("Sitemap seed: {}", url);
                    level.push((url, 1));
                }
            }
        }

        // Sitemap entries sit one level below the seed; run them with the next level
        let (mut current, mut deferred): (Vec<_>, Vec<_>) =
            level.into_iter().partition(|(_, depth)| *depth == 0);

        let mut depth = 0;
        while !current.is_empty() {
            tracing::info!("Discovery depth {}: {} URL(s)", depth, current.len());

            let visits: Vec<(Url, u32, Visit)> = stream::iter(current)
                .map(|(url, d)| async move {
                    let visit = self.visit(&url).await;
                    (url, d, visit)
                })
                .buffered(self.limits.workers.max(1))
                .collect()
                .await;

            let mut next = std::mem::take(&mut deferred);
            for (url, d, visit) in visits {
                match visit {
                    Visit::Disallowed(reason) => {
                        tracing::info!("Excluded by policy: {} ({})", url, reason);
                        state.advance(&url, PageState::Skipped);
                        report.excluded.push((url, reason));
                    }
                    Visit::Failed(failure) => {
                        tracing::warn!("Discovery fetch failed: {}", failure);
                        state.advance(&url, PageState::Fetched);
                        state.advance(&url, PageState::Skipped);
                        report.failed.push(url);
                    }
                    Visit::NotMarkup => {
                        state.advance(&url, PageState::Fetched);
                        state.advance(&url, PageState::Skipped);
                    }
                    Visit::Links(links) => {
                        state.advance(&url, PageState::Fetched);
                        let child_depth = d + 1;
                        for link in links {
                            let Ok(link) = normalize_url(link.as_str()) else {
                                continue;
                            };
                            if !self.in_scope(&seed, &link) {
                                continue;
                            }
                            if child_depth > self.limits.max_depth {
                                continue;
                            }
                            if state.accept(&link, child_depth) {
                                next.push((link, child_depth));
                            }
                        }
                        state.advance(&url, PageState::LinksExtracted);
                    }
                }
            }

            current = next;
            depth += 1;
        }

        let excluded: std::collections::HashSet<&str> =
            report.excluded.iter().map(|(u, _)| u.as_str()).collect();
        let discovered: Vec<Url> = state
            .accepted
            .iter()
            .filter(|u| !excluded.contains(u.as_str()))
            .filter(|u| state.state_of(u).is_terminal())
            .cloned()
            .collect();
        report.discovered = discovered;

        tracing::info!(
            "Discovery finished: {} URL(s), {} excluded, {} failed",
            report.discovered.len(),
            report.excluded.len(),
            report.failed.len()
        );
        report
    }

    /// Generic validity plus the scheme+host scope rule
    fn in_scope(&self, seed: &Url, url: &Url) -> bool {
        is_valid_url(url) && same_origin(seed, url)
    }

    async fn visit(&self, url: &Url) -> Visit {
        let decision = self.gate.is_allowed(url).await;
        if !decision.allowed {
            return Visit::Disallowed(decision.reason.unwrap_or_default());
        }

        let interval = self.gate.effective_interval(url).await;
        let response = match self
            .fetcher
            .fetch(FetchRequest::get(url.clone()).with_interval(interval))
            .await
        {
            Ok(response) => response,
            Err(failure) => return Visit::Failed(failure),
        };

        if !response.is_html() {
            return Visit::NotMarkup;
        }

        let base = response.url.clone();
        match response.text().await {
            Ok(body) => Visit::Links(self.markup.extract_links(&body, &base)),
            Err(e) => Visit::Failed(FetchFailure {
                url: url.clone(),
                reason: format!("failed to read body: {}", e),
                last_status: Some(200),
                attempts: 1,
            }),
        }
    }

    /// Collects page URLs from the seed domain's sitemaps; best effort
    async fn sitemap_urls(&self, seed: &Url) -> Vec<Url> {
        let mut urls = Vec::new();
        for sitemap in self.gate.sitemaps(seed).await {
            if !same_origin(seed, &sitemap) {
                continue;
            }
            if !self.gate.is_allowed(&sitemap).await.allowed {
                continue;
            }

            let interval = self.gate.effective_interval(&sitemap).await;
            let request = FetchRequest::get(sitemap.clone()).with_interval(interval);
            match self.fetcher.fetch(request).await {
                Ok(response) => match response.text().await {
                    Ok(body) => urls.extend(
                        extract_sitemap_locs(&body)
                            .into_iter()
                            .filter_map(|u| normalize_url(u.as_str()).ok()),
                    ),
                    Err(e) => tracing::debug!("Unreadable sitemap {}: {}", sitemap, e),
                },
                Err(failure) => tracing::debug!("Sitemap unavailable: {}", failure),
            }
        }
        urls
    }
}
