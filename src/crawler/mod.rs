//! Crawler module for fetching and processing a site
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with pacing, identity selection and retry
//! - Page sources (direct HTTP or an external renderer)
//! - Markup extraction of links, text and media
//! - Breadth-first URL discovery and API endpoint scanning
//! - Content extraction and media downloads
//! - Overall run coordination

mod coordinator;
mod downloader;
mod endpoints;
mod fetcher;
mod frontier;
mod identity;
mod markup;
mod pipeline;
mod source;

pub use coordinator::{Harvester, RunSummary};
pub use downloader::{classify_media, derive_filename, DownloadError, DownloadedFile, Downloader};
pub use endpoints::{looks_like_endpoint, EndpointScanner, API_MARKERS};
pub use fetcher::{build_http_client, FetchFailure, FetchRequest, FetchResponse, Fetcher};
pub use frontier::{DiscoveryReport, Frontier, FrontierLimits};
pub use identity::Identity;
pub use markup::{extract_sitemap_locs, resolve_link, HtmlMarkup, Markup, MediaLink};
pub use pipeline::{ContentPipeline, Disposition, Outcome};
pub use source::{CommandRenderer, DirectSource, Page, PageSource, RenderedSource, Renderer};

use crate::config::Config;

/// Runs a complete harvest from a seed URL
///
/// This is the main entry point for starting a harvest. It will:
/// 1. Open the storage layer and record a run
/// 2. Check the seed against the politeness policy
/// 3. Discover in-domain URLs (and API endpoints when enabled)
/// 4. Extract text and media from every unvisited URL
/// 5. Record the run's aggregate counts
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `seed` - Absolute http(s) URL to start from
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run completed; individual URLs may still have failed
/// * `Err(HarvestError)` - The run could not proceed
pub async fn harvest(config: Config, seed: &str) -> crate::Result<RunSummary> {
    Harvester::new(config)?.run(seed).await
}
