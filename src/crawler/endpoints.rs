//! API endpoint discovery
//!
//! Scans the seed page's inline scripts and anchors, and the same-origin script files
//! it loads, for references that look like API endpoints. Only references are
//! collected; no guessed paths are requested.

use crate::crawler::fetcher::{FetchRequest, Fetcher};
use crate::crawler::markup::resolve_link;
use crate::robots::PolicyGate;
use crate::url::{normalize_url, same_origin};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// Path segments that mark a URL as an API endpoint
pub const API_MARKERS: &[&str] = &[
    "api", "graphql", "rest", "v1", "v2", "endpoint", "service", "data", "ajax",
];

/// Extensions that mark a URL as a data endpoint
const DATA_EXTENSIONS: &[&str] = &[".json", ".xml"];

/// Call patterns searched for in inline scripts
const INLINE_PATTERNS: &[&str] = &[
    r#"fetch\(\s*["']([^"']+)["']"#,
    r#"\.get\(\s*["']([^"']+)["']"#,
    r#"\.post\(\s*["']([^"']+)["']"#,
    r#"(?s)ajax\(.*?url:\s*["']([^"']+)["']"#,
];

/// Patterns searched for in external script files
const SCRIPT_PATTERNS: &[&str] = &[
    r#"(https?://[^"'\s]+/api/[^"'\s]+)"#,
    r#"(https?://[^"'\s]+/v\d/[^"'\s]+)"#,
    r#"baseURL:\s*["']([^"']+)["']"#,
    r#"apiEndpoint:\s*["']([^"']+)["']"#,
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!("Bad endpoint pattern {}: {}", p, e);
                None
            }
        })
        .collect()
}

fn inline_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile(INLINE_PATTERNS))
}

fn script_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile(SCRIPT_PATTERNS))
}

/// Returns the first capture group of every match
fn captures<'a>(patterns: &[Regex], text: &'a str) -> Vec<&'a str> {
    patterns
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// True when a path segment is an API marker or the path ends in a data extension
pub fn looks_like_endpoint(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.split('/').any(|segment| API_MARKERS.contains(&segment))
        || DATA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Raw candidates found in the seed page
#[derive(Debug, Default)]
struct PageScan {
    candidates: Vec<String>,
    scripts: Vec<Url>,
}

fn scan_page(html: &str, base: &Url) -> PageScan {
    let document = Html::parse_document(html);
    let mut scan = PageScan::default();

    if let Ok(selector) = Selector::parse("script") {
        for script in document.select(&selector) {
            match script.value().attr("src") {
                Some(src) => scan.scripts.extend(resolve_link(src, base)),
                None => {
                    let body: String = script.text().collect();
                    scan.candidates
                        .extend(captures(inline_patterns(), &body).into_iter().map(str::to_string));
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("a[href]") {
        for anchor in document.select(&selector) {
            if let Some(href) = anchor.value().attr("href") {
                let lowered = href.to_ascii_lowercase();
                if API_MARKERS.iter().any(|marker| lowered.contains(marker)) {
                    scan.candidates.push(href.to_string());
                }
            }
        }
    }

    scan
}

/// Finds endpoint references reachable from a seed page
#[derive(Debug, Clone)]
pub struct EndpointScanner {
    fetcher: Fetcher,
    gate: PolicyGate,
}

impl EndpointScanner {
    pub fn new(fetcher: Fetcher, gate: PolicyGate) -> Self {
        Self { fetcher, gate }
    }

    /// Returns policy-allowed, same-origin endpoint URLs referenced from `seed`
    ///
    /// A seed that cannot be fetched or is not HTML yields nothing.
    pub async fn scan(&self, seed: &Url) -> Vec<Url> {
        tracing::info!("Starting API endpoint discovery for {}", seed);

        let Some(html) = self.fetch_text(seed).await else {
            return Vec::new();
        };

        let page = scan_page(&html, seed);
        let mut raw = page.candidates;

        for script in page.scripts.iter().filter(|s| same_origin(seed, s)) {
            if !self.gate.is_allowed(script).await.allowed {
                continue;
            }
            if let Some(js) = self.fetch_text(script).await {
                raw.extend(captures(script_patterns(), &js).into_iter().map(str::to_string));
            }
        }

        let mut seen = HashSet::new();
        let mut endpoints = Vec::new();
        for candidate in raw {
            let Some(url) = resolve_link(&candidate, seed) else {
                continue;
            };
            let Ok(url) = normalize_url(url.as_str()) else {
                continue;
            };
            if !same_origin(seed, &url) || !looks_like_endpoint(&url) {
                continue;
            }
            if !seen.insert(url.to_string()) {
                continue;
            }

            let decision = self.gate.is_allowed(&url).await;
            if decision.allowed {
                endpoints.push(url);
            } else {
                tracing::info!(
                    "Endpoint excluded by policy: {} ({})",
                    url,
                    decision.reason.unwrap_or_default()
                );
            }
        }

        tracing::info!("Discovered {} allowed API endpoint(s)", endpoints.len());
        endpoints
    }

    /// Fetches a page or script body; failures are logged and yield `None`
    async fn fetch_text(&self, url: &Url) -> Option<String> {
        let interval = self.gate.effective_interval(url).await;
        let response = match self
            .fetcher
            .fetch(FetchRequest::get(url.clone()).with_interval(interval))
            .await
        {
            Ok(response) => response,
            Err(failure) => {
                tracing::debug!("Endpoint scan fetch failed: {}", failure);
                return None;
            }
        };

        match response.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::debug!("Unreadable body at {}: {}", url, e);
                None
            }
        }
    }
}
