//! Page sources: where the content pipeline gets a page from
//!
//! A harvest picks one [`PageSource`] when it starts. [`DirectSource`] issues plain HTTP
//! requests through the [`Fetcher`]; [`RenderedSource`] asks a [`Renderer`] for the DOM
//! after scripts have run. Both wait on the same per-domain pacing clock.

use crate::config::RenderConfig;
use crate::crawler::fetcher::{FetchFailure, FetchRequest, FetchResponse, Fetcher};
use crate::state::Pacer;
use crate::url::origin_key;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

/// Content type reported for rendered pages
const RENDERED_CONTENT_TYPE: &str = "text/html";

/// A loaded page, classified by its declared content type
#[derive(Debug)]
pub enum Page {
    /// `text/html*`: body already read
    Html {
        url: Url,
        status: u16,
        content_type: String,
        body: String,
    },
    /// Anything else: the open response, ready to be streamed to disk
    Binary(FetchResponse),
}

/// Strategy for loading a page
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Loads a page, waiting at least `interval` since the domain's previous request
    async fn load(&self, url: &Url, interval: Duration) -> Result<Page, FetchFailure>;
}

/// Loads pages with plain HTTP requests
#[derive(Debug, Clone)]
pub struct DirectSource {
    fetcher: Fetcher,
}

impl DirectSource {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PageSource for DirectSource {
    async fn load(&self, url: &Url, interval: Duration) -> Result<Page, FetchFailure> {
        let request = FetchRequest::get(url.clone()).with_interval(interval);
        let response = self.fetcher.fetch(request).await?;

        if !response.is_html() {
            return Ok(Page::Binary(response));
        }

        let final_url = response.url.clone();
        let status = response.status;
        let attempts = response.attempts;
        let content_type = response
            .content_type
            .clone()
            .unwrap_or_else(|| RENDERED_CONTENT_TYPE.to_string());

        match response.text().await {
            Ok(body) => Ok(Page::Html {
                url: final_url,
                status,
                content_type,
                body,
            }),
            Err(e) => Err(FetchFailure {
                url: url.clone(),
                reason: format!("failed to read body: {}", e),
                last_status: Some(status),
                attempts,
            }),
        }
    }
}

/// Renders a URL to its post-script DOM
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Returns the rendered markup, or `None` when rendering failed
    async fn render(&self, url: &Url) -> Option<String>;
}

/// Runs a headless-browser command that prints the rendered DOM to stdout
///
/// The URL is appended as the last argument, e.g.
/// `chromium --headless --disable-gpu --dump-dom <url>`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    /// Builds a renderer from configuration; `None` when no command is configured
    pub fn from_config(config: &RenderConfig) -> Option<Self> {
        let (program, args) = config.command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, url: &Url) -> Option<String> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!("Renderer '{}' could not start: {}", self.program, e);
                return None;
            }
            Err(_) => {
                tracing::warn!("Renderer timed out after {:?} on {}", self.timeout, url);
                return None;
            }
        };

        if !output.status.success() {
            tracing::warn!("Renderer exited with {} on {}", output.status, url);
            return None;
        }

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if html.trim().is_empty() {
            None
        } else {
            Some(html)
        }
    }
}

/// Loads pages through a [`Renderer`]
///
/// Rendered output is always classified as HTML.
#[derive(Clone)]
pub struct RenderedSource {
    renderer: Arc<dyn Renderer>,
    pacer: Pacer,
}

impl RenderedSource {
    /// Creates a rendered source sharing the fetcher's pacing clocks
    pub fn new(renderer: Arc<dyn Renderer>, pacer: Pacer) -> Self {
        Self { renderer, pacer }
    }
}

#[async_trait]
impl PageSource for RenderedSource {
    async fn load(&self, url: &Url, interval: Duration) -> Result<Page, FetchFailure> {
        let Some(domain) = origin_key(url) else {
            return Err(FetchFailure::not_sent(url.clone(), "URL has no host"));
        };

        let _permit = self.pacer.acquire(&domain, interval).await;
        match self.renderer.render(url).await {
            Some(body) => Ok(Page::Html {
                url: url.clone(),
                status: 200,
                content_type: RENDERED_CONTENT_TYPE.to_string(),
                body,
            }),
            None => Err(FetchFailure {
                url: url.clone(),
                reason: "render failed".to_string(),
                last_status: None,
                attempts: 1,
            }),
        }
    }
}
