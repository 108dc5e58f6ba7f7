//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building the HTTP client with the crawler's identity
//! - Per-domain pacing through the shared [`Pacer`]
//! - User-Agent selection per request
//! - Retry with exponential backoff for transient failures
//! - Classifying terminal outcomes into a response or a [`FetchFailure`]

use crate::config::Config;
use crate::crawler::identity::Identity;
use crate::state::{Pacer, PacingPermit};
use crate::url::origin_key;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// HTTP statuses that are retried when the method is idempotent
const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Upper bound on the backoff exponent
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// A request to be issued by the [`Fetcher`]
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: Method,
    pub body: Option<String>,
    pub headers: HeaderMap,
    /// Overrides the configured minimum interval for this request's domain
    pub min_interval: Option<Duration>,
}

impl FetchRequest {
    /// Creates a plain GET request
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            body: None,
            headers: HeaderMap::new(),
            min_interval: None,
        }
    }

    /// Sets the effective pacing interval for this request
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.min_interval = Some(interval);
        self
    }

    /// Sets the request method
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a request header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A terminal 200 response
///
/// Carries the domain's pacing permit, so the next request to the same domain waits
/// until this body has been read or dropped.
#[derive(Debug)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    /// Content-Type header value, if present
    pub content_type: Option<String>,
    /// Number of attempts it took, retries included
    pub attempts: u32,
    response: reqwest::Response,
    permit: PacingPermit,
}

impl FetchResponse {
    /// Returns true when the declared content type is `text/html`
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map_or(false, |ct| ct.trim().to_ascii_lowercase().starts_with("text/html"))
    }

    /// Reads the whole body as text, then releases the pacing permit
    pub async fn text(self) -> Result<String, reqwest::Error> {
        let Self { response, permit, .. } = self;
        let body = response.text().await;
        drop(permit);
        body
    }

    /// Splits off the underlying response for streaming
    ///
    /// The caller keeps the permit alive until the body has been consumed.
    pub fn into_parts(self) -> (reqwest::Response, PacingPermit) {
        (self.response, self.permit)
    }
}

/// A per-URL fetch failure: a non-200 terminal status or an exhausted retry budget
///
/// This never aborts a run; callers record it against the URL and move on.
#[derive(Debug, Clone, Error)]
#[error("fetch of {url} failed after {attempts} attempt(s): {reason}")]
pub struct FetchFailure {
    pub url: Url,
    pub reason: String,
    pub last_status: Option<u16>,
    pub attempts: u32,
}

impl FetchFailure {
    /// Creates a failure for a URL that was never sent
    pub fn not_sent(url: Url, reason: impl Into<String>) -> Self {
        Self {
            url,
            reason: reason.into(),
            last_status: None,
            attempts: 0,
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The harvester configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.identity())
        .timeout(config.crawler.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Issues HTTP requests with pacing, identity selection and retry
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    identity: Identity,
    pacer: Pacer,
    min_interval: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl Fetcher {
    /// Creates a fetcher from configuration with a fresh pacer
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        Self::with_pacer(config, Pacer::new())
    }

    /// Creates a fetcher that shares an existing pacer
    pub fn with_pacer(config: &Config, pacer: Pacer) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            identity: Identity::from_config(&config.user_agent),
            pacer,
            min_interval: config.crawler.min_request_interval(),
            max_retries: config.crawler.max_retries,
            retry_backoff: config.crawler.retry_backoff(),
        })
    }

    /// Returns the pacer that gates this fetcher's requests
    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    /// Returns the identity set used for requests
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the configured minimum interval
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Fetches a URL with pacing and retry
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 200 | Return the response |
    /// | HTTP 408/429/500/502/503/504 | Retry with backoff (idempotent methods only) |
    /// | Timeout / connection error | Retry with backoff (idempotent methods only) |
    /// | Any other status | Immediate failure |
    ///
    /// The domain's pacing permit is held across retries and handed to the returned
    /// response, so the pacing clock advances once per call, when the body is done.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchFailure> {
        let Some(domain) = origin_key(&request.url) else {
            return Err(FetchFailure::not_sent(request.url, "URL has no host"));
        };
        let interval = request.min_interval.unwrap_or(self.min_interval);
        let retry_allowed = request.method.is_idempotent();

        let permit = self.pacer.acquire(&domain, interval).await;

        let mut attempt: u32 = 0;
        let mut last_status: Option<u16> = None;
        loop {
            attempt += 1;
            let can_retry = retry_allowed && attempt <= self.max_retries;

            match self.send_once(&request).await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::OK {
                        let content_type = response
                            .headers()
                            .get(CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        return Ok(FetchResponse {
                            url: response.url().clone(),
                            status: status.as_u16(),
                            content_type,
                            attempts: attempt,
                            response,
                            permit,
                        });
                    }

                    last_status = Some(status.as_u16());
                    if can_retry && is_retryable_status(status) {
                        tracing::debug!(
                            "HTTP {} from {} (attempt {}), retrying",
                            status.as_u16(),
                            request.url,
                            attempt
                        );
                        tokio::time::sleep(self.backoff_for(attempt)).await;
                        continue;
                    }

                    return Err(FetchFailure {
                        url: request.url,
                        reason: format!("HTTP {}", status.as_u16()),
                        last_status,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    if can_retry && is_retryable_error(&e) {
                        tracing::debug!(
                            "Transport error for {} (attempt {}): {}, retrying",
                            request.url,
                            attempt,
                            e
                        );
                        tokio::time::sleep(self.backoff_for(attempt)).await;
                        continue;
                    }

                    return Err(FetchFailure {
                        url: request.url,
                        reason: classify_error(&e),
                        last_status,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    async fn send_once(&self, request: &FetchRequest) -> Result<reqwest::Response, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .header(USER_AGENT, self.identity.select());

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        builder.send().await
    }

    /// Backoff before retry number `attempt`: base, 2x base, 4x base, ...
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.retry_backoff.saturating_mul(1u32 << exponent)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

fn is_retryable_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

fn classify_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        "Connection refused".to_string()
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::ACCEPT;
    use std::time::Instant;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.crawler.min_request_interval_seconds = 0.0;
        config.crawler.retry_backoff_ms = 5;
        config.crawler.request_timeout_seconds = 5;
        config.user_agent.crawler_name = "TestHarvester".to_string();
        config.user_agent.crawler_version = "1.0".to_string();
        config
    }

    fn url_for(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config()).is_ok());
    }

    #[test]
    fn test_backoff_doubles() {
        let fetcher = Fetcher::new(&create_test_config()).unwrap();
        assert_eq!(fetcher.backoff_for(1), Duration::from_millis(5));
        assert_eq!(fetcher.backoff_for(2), Duration::from_millis(10));
        assert_eq!(fetcher.backoff_for(3), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_success_returns_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<html>hi</html>"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&create_test_config()).unwrap();
        let response = fetcher
            .fetch(FetchRequest::get(url_for(&server, "/page")))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.attempts, 1);
        assert!(response.is_html());
        assert_eq!(response.text().await.unwrap(), "<html>hi</html>");
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&create_test_config()).unwrap();
        let response = fetcher
            .fetch(FetchRequest::get(url_for(&server, "/flaky")))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.attempts, 4);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(502))
            .expect(4)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&create_test_config()).unwrap();
        let failure = fetcher
            .fetch(FetchRequest::get(url_for(&server, "/down")))
            .await
            .unwrap_err();

        assert_eq!(failure.last_status, Some(502));
        assert_eq!(failure.attempts, 4);
    }

    #[tokio::test]
    async fn test_not_found_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&create_test_config()).unwrap();
        let failure = fetcher
            .fetch(FetchRequest::get(url_for(&server, "/missing")))
            .await
            .unwrap_err();

        assert_eq!(failure.last_status, Some(404));
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.reason, "HTTP 404");
    }

    #[tokio::test]
    async fn test_post_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&create_test_config()).unwrap();
        let request = FetchRequest::get(url_for(&server, "/submit"))
            .with_method(Method::POST)
            .with_body("a=1");
        let failure = fetcher.fetch(request).await.unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.last_status, Some(503));
    }

    #[tokio::test]
    async fn test_sends_fixed_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header(
                "user-agent",
                "TestHarvester/1.0 (+https://example.com/sumi-harvest; crawler@example.com)",
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&create_test_config()).unwrap();
        assert!(fetcher
            .fetch(FetchRequest::get(url_for(&server, "/")))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_extra_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("accept", "text/plain"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&create_test_config()).unwrap();
        let request = FetchRequest::get(url_for(&server, "/robots.txt"))
            .with_header(ACCEPT, HeaderValue::from_static("text/plain"));
        assert!(fetcher.fetch(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_unread_body_holds_the_domain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("body"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&create_test_config()).unwrap();
        let first = fetcher
            .fetch(FetchRequest::get(url_for(&server, "/a")))
            .await
            .unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(200),
            fetcher.fetch(FetchRequest::get(url_for(&server, "/b"))),
        )
        .await;
        assert!(blocked.is_err());

        assert_eq!(first.text().await.unwrap(), "body");
        let second = fetcher
            .fetch(FetchRequest::get(url_for(&server, "/b")))
            .await
            .unwrap();
        assert_eq!(second.status, 200);
        let domain = origin_key(&url_for(&server, "/")).unwrap();
        drop(second);
        assert_eq!(fetcher.pacer().request_count(&domain).await, 2);
    }

    #[tokio::test]
    async fn test_requests_to_one_domain_are_paced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&create_test_config()).unwrap();
        let interval = Duration::from_millis(100);
        let start = Instant::now();
        for i in 0..3 {
            let request =
                FetchRequest::get(url_for(&server, &format!("/p{}", i))).with_interval(interval);
            fetcher.fetch(request).await.unwrap();
        }

        assert!(start.elapsed() >= interval * 2);
    }
}
