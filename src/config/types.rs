use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for Sumi-Harvest
///
/// Every section and key has a default, so an empty file (or no file at all) is a
/// valid configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub politeness: PolitenessConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub render: RenderConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum depth to traverse from the seed URL (inclusive)
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Retries after the first attempt for retryable failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Per-request timeout
    #[serde(rename = "request-timeout-seconds")]
    pub request_timeout_seconds: u64,

    /// Minimum time between completed requests to the same domain
    #[serde(rename = "min-request-interval-seconds")]
    pub min_request_interval_seconds: f64,

    /// Number of concurrent workers per stage
    pub workers: usize,

    /// Base of the exponential retry backoff
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    /// Seed the frontier with `<loc>` entries from robots.txt sitemaps
    #[serde(rename = "follow-sitemaps")]
    pub follow_sitemaps: bool,

    /// Scan the seed page and its scripts for API endpoints
    #[serde(rename = "discover-endpoints")]
    pub discover_endpoints: bool,
}

impl CrawlerConfig {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_request_interval_seconds.max(0.0))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_retries: 3,
            request_timeout_seconds: 30,
            min_request_interval_seconds: 2.0,
            workers: 2,
            retry_backoff_ms: 1000,
            follow_sitemaps: true,
            discover_endpoints: true,
        }
    }
}

/// Robots.txt and crawl-delay policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolitenessConfig {
    /// Exclude URLs disallowed by robots.txt
    #[serde(rename = "respect-robots")]
    pub respect_robots: bool,

    /// Raise the pacing interval to a site's Crawl-delay
    #[serde(rename = "respect-crawl-delay")]
    pub respect_crawl_delay: bool,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            respect_robots: true,
            respect_crawl_delay: true,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,

    /// Pick a User-Agent uniformly at random from `pool` on every request
    pub rotation: bool,

    /// Identities used when rotation is enabled
    pub pool: Vec<String>,
}

impl UserAgentConfig {
    /// The fixed identity: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn identity(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiHarvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/sumi-harvest".to_string(),
            contact_email: "crawler@example.com".to_string(),
            rotation: false,
            pool: Vec::new(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory downloaded media is written to
    #[serde(rename = "media-dir")]
    pub media_dir: String,

    /// Directory exports are written to
    #[serde(rename = "export-dir")]
    pub export_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./harvest.db".to_string(),
            media_dir: "./storage/media".to_string(),
            export_dir: "./storage/data".to_string(),
        }
    }
}

/// JavaScript rendering through an external headless browser
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub enabled: bool,

    /// Program and leading arguments; the URL is appended as the last argument and the
    /// rendered DOM is read from stdout
    pub command: Vec<String>,

    #[serde(rename = "timeout-seconds")]
    pub timeout_seconds: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: vec![
                "chromium".to_string(),
                "--headless".to_string(),
                "--disable-gpu".to_string(),
                "--dump-dom".to_string(),
            ],
            timeout_seconds: 60,
        }
    }
}
