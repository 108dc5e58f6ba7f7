//! Robots.txt parser implementation
//!
//! This module turns raw robots.txt content into an immutable [`PolicySnapshot`]. Path
//! matching is delegated to the robotstxt crate; crawl-delay and sitemap directives,
//! which that crate does not expose, are read by a single line pass.

use robotstxt::DefaultMatcher;

/// Longest crawl delay honored, in seconds; larger values are clamped to it
pub const MAX_CRAWL_DELAY_SECS: f64 = 86_400.0;

/// Parsed robots.txt policy for one domain
///
/// Built once per domain and never mutated.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Whether to allow all (true = allow all, false = match against content)
    allow_all: bool,
    /// Product token the rules are matched for
    agent: String,
    /// `Disallow` paths of the group that applies to the agent
    disallow_rules: Vec<String>,
    /// `Crawl-delay` of the group that applies to the agent, in seconds
    crawl_delay: Option<f64>,
    /// `Sitemap` URLs, which are global to the file
    sitemaps: Vec<String>,
}

/// A group of records sharing the same `User-agent` lines
#[derive(Debug, Default)]
struct Group {
    agents: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<f64>,
}

impl PolicySnapshot {
    /// Creates a new PolicySnapshot from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    /// * `agent` - The product token the crawler identifies as (e.g. "SumiHarvest")
    ///
    /// # Returns
    ///
    /// A PolicySnapshot that can be used to check URL permissions
    pub fn from_content(content: &str, agent: &str) -> Self {
        let (groups, sitemaps) = parse_groups(content);
        let normalized_agent = agent.to_lowercase();

        // Prefer the group naming this agent, else the wildcard group
        let specific = groups.iter().find(|g| {
            g.agents
                .iter()
                .any(|ua| ua != "*" && normalized_agent.contains(ua.as_str()))
        });
        let wildcard = groups.iter().find(|g| g.agents.iter().any(|ua| ua == "*"));
        let applicable = specific.or(wildcard);

        Self {
            content: content.to_string(),
            allow_all: false,
            agent: agent.to_string(),
            disallow_rules: applicable.map(|g| g.disallow.clone()).unwrap_or_default(),
            crawl_delay: applicable.and_then(|g| g.crawl_delay),
            sitemaps,
        }
    }

    /// Creates a permissive PolicySnapshot that allows everything
    ///
    /// This is used when robots.txt is missing or cannot be fetched.
    pub fn allow_all(agent: &str) -> Self {
        Self {
            content: String::new(),
            allow_all: true,
            agent: agent.to_string(),
            disallow_rules: Vec::new(),
            crawl_delay: None,
            sitemaps: Vec::new(),
        }
    }

    /// Returns true if this snapshot permits everything
    pub fn is_allow_all(&self) -> bool {
        self.allow_all || self.content.trim().is_empty()
    }

    /// Checks if a URL is allowed for the snapshot's agent
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to check; robotstxt only looks at its path and query
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_allowed(&self, url: &str) -> bool {
        if self.is_allow_all() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, &self.agent, url)
    }

    /// Returns the crawl delay in seconds, if one applies
    pub fn crawl_delay(&self) -> Option<f64> {
        self.crawl_delay
    }

    /// Returns the `Disallow` paths of the applicable group
    pub fn disallow_rules(&self) -> &[String] {
        &self.disallow_rules
    }

    /// Returns the sitemap URLs listed in the file
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// Splits robots.txt into user-agent groups and collects sitemap lines
///
/// A `User-agent` line that follows any other directive starts a new group.
fn parse_groups(content: &str) -> (Vec<Group>, Vec<String>) {
    let mut groups: Vec<Group> = Vec::new();
    let mut sitemaps = Vec::new();
    let mut current = Group::default();
    let mut in_agent_lines = false;

    for line in content.lines() {
        // Strip comments
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if !in_agent_lines && !current.agents.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
                current.agents.push(value.to_lowercase());
                in_agent_lines = true;
            }
            "sitemap" => {
                // Sitemap values are URLs and contain ':' themselves
                if !value.is_empty() {
                    sitemaps.push(value.to_string());
                }
            }
            "disallow" => {
                in_agent_lines = false;
                if !value.is_empty() {
                    current.disallow.push(value.to_string());
                }
            }
            "crawl-delay" => {
                in_agent_lines = false;
                if let Ok(delay) = value.parse::<f64>() {
                    if delay.is_finite() && delay >= 0.0 {
                        current.crawl_delay = Some(delay.min(MAX_CRAWL_DELAY_SECS));
                    }
                }
            }
            _ => {
                in_agent_lines = false;
            }
        }
    }

    if !current.agents.is_empty() {
        groups.push(current);
    }

    (groups, sitemaps)
}
