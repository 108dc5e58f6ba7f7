//! Content extraction for a single URL
//!
//! The pipeline loads a page through the configured [`PageSource`], stores its text,
//! downloads the media it references, and records the visit. HTML pages go down the
//! extraction path; anything else is saved as a media file.

use crate::crawler::downloader::Downloader;
use crate::crawler::fetcher::FetchResponse;
use crate::crawler::markup::Markup;
use crate::crawler::source::{Page, PageSource};
use crate::robots::PolicyGate;
use crate::storage::{MediaType, NewMedia, Storage, StorageResult, Store, FAILED_FETCH_STATUS};
use std::sync::Arc;
use url::Url;

/// How processing a URL ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Fetched with a 200 and processed
    Succeeded,
    /// Fetch or save failed; the reason is logged and the URL marked visited
    Failed(String),
    /// Refused by the politeness policy; the URL stays unvisited
    Skipped(String),
}

/// Result of processing one URL
#[derive(Debug, Clone)]
pub struct Outcome {
    pub url_id: i64,
    /// Status recorded on the URL; `None` when it was not visited
    pub status: Option<u16>,
    pub disposition: Disposition,
    pub content_saved: bool,
    /// Ids of the media records written
    pub media_saved: Vec<i64>,
}

impl Outcome {
    fn new(url_id: i64) -> Self {
        Self {
            url_id,
            status: None,
            disposition: Disposition::Succeeded,
            content_saved: false,
            media_saved: Vec::new(),
        }
    }
}

/// Fetch, classify, extract and persist
#[derive(Clone)]
pub struct ContentPipeline {
    source: Arc<dyn PageSource>,
    gate: PolicyGate,
    downloader: Downloader,
    markup: Arc<dyn Markup>,
    store: Store,
}

impl ContentPipeline {
    pub fn new(
        source: Arc<dyn PageSource>,
        gate: PolicyGate,
        downloader: Downloader,
        markup: Arc<dyn Markup>,
        store: Store,
    ) -> Self {
        Self {
            source,
            gate,
            downloader,
            markup,
            store,
        }
    }

    /// Processes one stored URL
    ///
    /// Per-URL problems end up in the returned [`Outcome`]; only storage errors are
    /// returned as `Err`. A URL that was loaded (or whose load failed) is marked
    /// visited exactly once.
    pub async fn process(&self, url_id: i64, url: &Url) -> StorageResult<Outcome> {
        let mut outcome = Outcome::new(url_id);

        // Policy may have changed since discovery
        let decision = self.gate.is_allowed(url).await;
        if !decision.allowed {
            let reason = decision.reason.unwrap_or_default();
            tracing::info!("Skipping {} by policy: {}", url, reason);
            outcome.disposition = Disposition::Skipped(reason);
            return Ok(outcome);
        }

        let interval = self.gate.effective_interval(url).await;
        let status = match self.source.load(url, interval).await {
            Err(failure) => {
                tracing::warn!("{}", failure);
                outcome.disposition = Disposition::Failed(failure.reason);
                failure.last_status.unwrap_or(FAILED_FETCH_STATUS)
            }
            Ok(Page::Html {
                url: final_url,
                status,
                content_type,
                body,
            }) => {
                self.extract(url_id, &final_url, &content_type, &body, &mut outcome)
                    .await?;
                status
            }
            Ok(Page::Binary(response)) => {
                let status = response.status;
                self.save_binary(url_id, response, &mut outcome).await?;
                status
            }
        };

        if !self.store.with(|s| s.mark_visited(url_id, status))? {
            tracing::debug!("URL {} was already visited", url);
        }
        outcome.status = Some(status);
        Ok(outcome)
    }

    /// HTML path: text, then media
    async fn extract(
        &self,
        url_id: i64,
        page_url: &Url,
        content_type: &str,
        body: &str,
        outcome: &mut Outcome,
    ) -> StorageResult<()> {
        let text = self.markup.extract_text(body);
        let essence = content_type.split(';').next().unwrap_or("").trim();
        outcome.content_saved = self
            .store
            .with(|s| s.insert_content(url_id, essence, &text))?;

        for link in self.markup.extract_media(body, page_url) {
            let decision = self.gate.is_allowed(&link.url).await;
            if !decision.allowed {
                tracing::info!(
                    "Media excluded by policy: {} ({})",
                    link.url,
                    decision.reason.unwrap_or_default()
                );
                continue;
            }

            let interval = self.gate.effective_interval(&link.url).await;
            let file = match self.downloader.download(&link.url, interval).await {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!("Media download failed: {}", e);
                    continue;
                }
            };

            // Prefer the response's classification, fall back to where the link was found
            let media_type = match file.media_type {
                MediaType::Other => link.media_type,
                declared => declared,
            };
            let record = NewMedia {
                url_id,
                media_url: link.url.to_string(),
                media_type,
                local_path: file.local_path.to_string_lossy().into_owned(),
                file_size: file.size,
            };
            outcome.media_saved.push(self.store.with(|s| s.insert_media(&record))?);
        }

        tracing::debug!(
            "Extracted {} ({} chars, {} media)",
            page_url,
            text.len(),
            outcome.media_saved.len()
        );
        Ok(())
    }

    /// Binary path: the URL itself is the media asset
    async fn save_binary(
        &self,
        url_id: i64,
        response: FetchResponse,
        outcome: &mut Outcome,
    ) -> StorageResult<()> {
        let media_url = response.url.to_string();
        match self.downloader.save(response).await {
            Ok(file) => {
                let record = NewMedia {
                    url_id,
                    media_url,
                    media_type: file.media_type,
                    local_path: file.local_path.to_string_lossy().into_owned(),
                    file_size: file.size,
                };
                outcome.media_saved.push(self.store.with(|s| s.insert_media(&record))?);
            }
            Err(e) => {
                tracing::warn!("Saving {} failed: {}", media_url, e);
                outcome.disposition = Disposition::Failed(e.to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, PolitenessConfig};
    use crate::crawler::fetcher::Fetcher;
    use crate::crawler::markup::HtmlMarkup;
    use crate::crawler::source::DirectSource;
    use crate::storage::SqliteStorage;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        pipeline: ContentPipeline,
        store: Store,
        _media: TempDir,
    }

    fn harness() -> Harness {
        let mut config = Config::default();
        config.crawler.min_request_interval_seconds = 0.0;
        config.crawler.max_retries = 0;
        let fetcher = Fetcher::new(&config).unwrap();
        let gate = PolicyGate::new(fetcher.clone(), PolitenessConfig::default());
        let media = tempfile::tempdir().unwrap();
        let store = Store::new(SqliteStorage::new_in_memory().unwrap());

        let pipeline = ContentPipeline::new(
            Arc::new(DirectSource::new(fetcher.clone())),
            gate,
            Downloader::new(fetcher, media.path()),
            Arc::new(HtmlMarkup),
            store.clone(),
        );
        Harness {
            pipeline,
            store,
            _media: media,
        }
    }

    fn insert(store: &Store, url: &Url) -> i64 {
        store
            .with(|s| s.insert_url(url.as_str(), url.host_str().unwrap_or("")))
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_html_page_text_and_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(
                        r#"<html><body><h1>Hello</h1><img src="/logo.png"><img src="/missing.png"></body></html>"#,
                    ),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![7u8; 64]),
            )
            .mount(&server)
            .await;

        let h = harness();
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let id = insert(&h.store, &url);

        let outcome = h.pipeline.process(id, &url).await.unwrap();
        assert_eq!(outcome.disposition, Disposition::Succeeded);
        assert_eq!(outcome.status, Some(200));
        assert!(outcome.content_saved);
        assert_eq!(outcome.media_saved.len(), 1);

        let content = h.store.with(|s| s.content_for(id)).unwrap().unwrap();
        assert_eq!(content.content_type, "text/html");
        assert_eq!(content.text_content, "Hello");

        let media = h.store.with(|s| s.media_for(id)).unwrap();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].media_type, MediaType::Image);
        assert_eq!(media[0].file_size, 64);

        let record = h.store.with(|s| s.get_url(id)).unwrap();
        assert!(record.visited);
        assert_eq!(record.http_status, Some(200));
    }

    #[tokio::test]
    async fn test_failure_marks_visited_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let h = harness();
        let url = Url::parse(&format!("{}/gone", server.uri())).unwrap();
        let id = insert(&h.store, &url);

        let outcome = h.pipeline.process(id, &url).await.unwrap();
        assert!(matches!(outcome.disposition, Disposition::Failed(_)));
        assert_eq!(outcome.status, Some(410));

        let record = h.store.with(|s| s.get_url(id)).unwrap();
        assert!(record.visited);
        assert_eq!(record.http_status, Some(410));
        assert!(h.store.with(|s| s.content_for(id)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_uses_sentinel_status() {
        let h = harness();
        // Port 9 (discard) on localhost is expected to refuse connections
        let url = Url::parse("http://127.0.0.1:9/nothing").unwrap();
        let id = insert(&h.store, &url);

        let outcome = h.pipeline.process(id, &url).await.unwrap();
        assert_eq!(outcome.status, Some(FAILED_FETCH_STATUS));
        let record = h.store.with(|s| s.get_url(id)).unwrap();
        assert_eq!(record.http_status, Some(FAILED_FETCH_STATUS));
    }

    #[tokio::test]
    async fn test_binary_resource_saved_as_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/report.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(vec![1u8; 300]),
            )
            .mount(&server)
            .await;

        let h = harness();
        let url = Url::parse(&format!("{}/docs/report.pdf", server.uri())).unwrap();
        let id = insert(&h.store, &url);

        let outcome = h.pipeline.process(id, &url).await.unwrap();
        assert_eq!(outcome.disposition, Disposition::Succeeded);
        assert!(!outcome.content_saved);

        let media = h.store.with(|s| s.media_for(id)).unwrap();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].file_size, 300);
        assert!(media[0].local_path.ends_with("report.pdf"));
    }

    #[tokio::test]
    async fn test_disallowed_url_left_unvisited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness();
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let id = insert(&h.store, &url);

        let outcome = h.pipeline.process(id, &url).await.unwrap();
        assert!(matches!(outcome.disposition, Disposition::Skipped(_)));
        assert_eq!(outcome.status, None);
        assert!(!h.store.with(|s| s.get_url(id)).unwrap().visited);
    }
}
