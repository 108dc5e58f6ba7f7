//! Harvest coordinator - run orchestration
//!
//! A run has two stages:
//! - Discovery: the frontier walks the site from the seed (plus endpoint scanning when
//!   enabled) and every accepted URL is stored as unvisited
//! - Extraction: unvisited URLs are drained through the content pipeline by a bounded
//!   pool of workers
//!
//! Per-URL failures are recorded in the store and counted; only configuration,
//! seed and storage errors end a run early.

use crate::config::{compute_config_hash, validate, validate_seed, Config};
use crate::crawler::downloader::Downloader;
use crate::crawler::endpoints::EndpointScanner;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::frontier::{Frontier, FrontierLimits};
use crate::crawler::markup::{HtmlMarkup, Markup};
use crate::crawler::pipeline::{ContentPipeline, Disposition, Outcome};
use crate::crawler::source::{CommandRenderer, DirectSource, PageSource, RenderedSource, Renderer};
use crate::robots::PolicyGate;
use crate::storage::{
    open_storage, RunCounts, RunStatus, Storage, StorageResult, Store, FAILED_FETCH_STATUS,
};
use crate::url::{extract_domain, normalize_url};
use crate::{ConfigError, HarvestError};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// What a finished run reports
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub seed_url: String,
    pub counts: RunCounts,
    pub duration_seconds: f64,
}

/// Orchestrates a harvest of one site
pub struct Harvester {
    config: Arc<Config>,
    config_hash: String,
    store: Store,
    fetcher: Fetcher,
    gate: PolicyGate,
    markup: Arc<dyn Markup>,
    source: Arc<dyn PageSource>,
    downloader: Downloader,
}

impl Harvester {
    /// Creates a harvester from a configuration
    ///
    /// The page source is chosen here, once: a [`RenderedSource`] backed by the
    /// configured browser command when rendering is enabled, otherwise a
    /// [`DirectSource`].
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Storage opened and components wired
    /// * `Err(HarvestError)` - Invalid configuration or storage failure
    pub fn new(config: Config) -> crate::Result<Self> {
        let renderer: Option<Arc<dyn Renderer>> = if config.render.enabled {
            let renderer = CommandRenderer::from_config(&config.render).ok_or_else(|| {
                ConfigError::Validation("render.command must not be empty".to_string())
            })?;
            Some(Arc::new(renderer))
        } else {
            None
        };
        Self::build(config, renderer)
    }

    /// Creates a harvester that loads pages through the given renderer
    pub fn with_renderer(config: Config, renderer: Arc<dyn Renderer>) -> crate::Result<Self> {
        Self::build(config, Some(renderer))
    }

    fn build(config: Config, renderer: Option<Arc<dyn Renderer>>) -> crate::Result<Self> {
        validate(&config)?;
        let config_hash = compute_config_hash(&config)?;

        let storage = open_storage(Path::new(&config.output.database_path))?;
        let store = Store::new(storage);

        let fetcher = Fetcher::new(&config)?;
        let gate = PolicyGate::new(fetcher.clone(), config.politeness.clone());
        let source: Arc<dyn PageSource> = match renderer {
            Some(renderer) => {
                tracing::info!("Loading pages through the renderer");
                Arc::new(RenderedSource::new(renderer, fetcher.pacer().clone()))
            }
            None => Arc::new(DirectSource::new(fetcher.clone())),
        };
        let downloader = Downloader::new(fetcher.clone(), &config.output.media_dir);

        Ok(Self {
            config: Arc::new(config),
            config_hash,
            store,
            fetcher,
            gate,
            markup: Arc::new(HtmlMarkup),
            source,
            downloader,
        })
    }

    /// Returns the store this harvester writes to
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs a complete harvest from `seed`
    ///
    /// An invalid seed fails before any network activity. The run row is marked
    /// completed with its counts, or failed if the run could not proceed.
    pub async fn run(&self, seed: &str) -> crate::Result<RunSummary> {
        let started = Instant::now();
        let seed = validate_seed(seed)?;
        let seed = normalize_url(seed.as_str())?;

        let run_id = self
            .store
            .with(|s| s.create_run(seed.as_str(), &self.config_hash))?;
        tracing::info!("Starting run {} for {}", run_id, seed);

        match self.harvest(&seed).await {
            Ok(counts) => {
                self.store
                    .with(|s| s.finish_run(run_id, RunStatus::Completed, &counts))?;
                let summary = RunSummary {
                    run_id,
                    seed_url: seed.to_string(),
                    counts,
                    duration_seconds: started.elapsed().as_secs_f64(),
                };
                tracing::info!(
                    "Run {} completed in {:.1}s: {} visited, {} succeeded, {} failed",
                    run_id,
                    summary.duration_seconds,
                    counts.visited,
                    counts.succeeded,
                    counts.failed
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("Run {} failed: {}", run_id, e);
                if let Err(store_err) = self
                    .store
                    .with(|s| s.finish_run(run_id, RunStatus::Failed, &RunCounts::default()))
                {
                    tracing::error!("Could not record run failure: {}", store_err);
                }
                Err(e)
            }
        }
    }

    async fn harvest(&self, seed: &Url) -> crate::Result<RunCounts> {
        let decision = self.gate.is_allowed(seed).await;
        if !decision.allowed {
            return Err(HarvestError::SeedDisallowed(
                decision.reason.unwrap_or_else(|| seed.to_string()),
            ));
        }

        let mut counts = RunCounts::default();

        // Stage 1: discovery
        let frontier = Frontier::new(
            self.fetcher.clone(),
            self.gate.clone(),
            Arc::clone(&self.markup),
            FrontierLimits {
                max_depth: self.config.crawler.max_depth,
                workers: self.config.crawler.workers,
                follow_sitemaps: self.config.crawler.follow_sitemaps,
            },
        );
        let report = frontier.discover(seed).await;
        counts.discovered = report.discovered.len();
        counts.skipped = report.excluded.len();
        self.persist_urls(&report.discovered)?;

        if self.config.crawler.discover_endpoints {
            let scanner = EndpointScanner::new(self.fetcher.clone(), self.gate.clone());
            let endpoints = scanner.scan(seed).await;
            counts.endpoints = endpoints.len();
            self.persist_urls(&endpoints)?;
        }

        // Stage 2: extraction
        let pending = self.store.with(|s| s.unvisited_urls())?;
        tracing::info!("Extracting content from {} URL(s)", pending.len());

        let pipeline = ContentPipeline::new(
            Arc::clone(&self.source),
            self.gate.clone(),
            self.downloader.clone(),
            Arc::clone(&self.markup),
            self.store.clone(),
        );

        let outcomes: Vec<StorageResult<Outcome>> = stream::iter(pending)
            .map(|record| {
                let pipeline = pipeline.clone();
                let store = self.store.clone();
                async move {
                    match Url::parse(&record.url) {
                        Ok(url) => pipeline.process(record.id, &url).await,
                        Err(e) => {
                            tracing::warn!("Stored URL {} is unparseable: {}", record.url, e);
                            store.with(|s| s.mark_visited(record.id, FAILED_FETCH_STATUS))?;
                            Ok(Outcome {
                                url_id: record.id,
                                status: Some(FAILED_FETCH_STATUS),
                                disposition: Disposition::Failed(e.to_string()),
                                content_saved: false,
                                media_saved: Vec::new(),
                            })
                        }
                    }
                }
            })
            .buffer_unordered(self.config.crawler.workers.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            tally(&mut counts, &outcome?);
        }
        Ok(counts)
    }

    /// Stores URLs as unvisited; already-known URLs are left untouched
    fn persist_urls(&self, urls: &[Url]) -> StorageResult<usize> {
        self.store.with(|s| {
            let mut inserted = 0;
            for url in urls {
                let domain = extract_domain(url).unwrap_or_default();
                if s.insert_url(url.as_str(), &domain)?.1 {
                    inserted += 1;
                }
            }
            Ok(inserted)
        })
    }
}

fn tally(counts: &mut RunCounts, outcome: &Outcome) {
    if outcome.status.is_some() {
        counts.visited += 1;
    }
    match outcome.disposition {
        Disposition::Succeeded => counts.succeeded += 1,
        Disposition::Failed(_) => counts.failed += 1,
        Disposition::Skipped(_) => counts.skipped += 1,
    }
    counts.media_saved += outcome.media_saved.len();
}
