//! User-Agent selection
//!
//! A request carries either the fixed crawler identity or, with rotation enabled, an
//! agent drawn uniformly at random from the configured pool.

use crate::config::UserAgentConfig;
use rand::seq::SliceRandom;

/// The identities available to the fetcher
#[derive(Debug, Clone)]
pub struct Identity {
    /// Fixed agent string: `Name/Version (+ContactURL; ContactEmail)`
    fixed: String,
    /// Product token matched against robots.txt groups
    token: String,
    pool: Vec<String>,
    rotation: bool,
}

impl Identity {
    /// Builds the identity set from configuration
    pub fn from_config(config: &UserAgentConfig) -> Self {
        Self {
            fixed: config.identity(),
            token: config.crawler_name.clone(),
            pool: config.pool.clone(),
            rotation: config.rotation,
        }
    }

    /// Returns the User-Agent for the next request
    pub fn select(&self) -> &str {
        if !self.rotation {
            return &self.fixed;
        }

        self.pool
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(&self.fixed)
    }

    /// Returns the product token used for robots.txt matching
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the fixed identity string
    pub fn fixed(&self) -> &str {
        &self.fixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestHarvester".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
            rotation: false,
            pool: vec![],
        }
    }

    #[test]
    fn test_fixed_identity_format() {
        let identity = Identity::from_config(&create_test_config());
        assert_eq!(
            identity.select(),
            "TestHarvester/1.0 (+https://example.com/about; admin@example.com)"
        );
        assert_eq!(identity.token(), "TestHarvester");
    }

    #[test]
    fn test_rotation_draws_from_pool() {
        let mut config = create_test_config();
        config.rotation = true;
        config.pool = vec!["AgentA/1.0".to_string(), "AgentB/2.0".to_string()];
        let identity = Identity::from_config(&config);

        for _ in 0..50 {
            let agent = identity.select();
            assert!(agent == "AgentA/1.0" || agent == "AgentB/2.0");
        }
    }

    #[test]
    fn test_pool_ignored_without_rotation() {
        let mut config = create_test_config();
        config.pool = vec!["AgentA/1.0".to_string()];
        let identity = Identity::from_config(&config);
        assert_eq!(identity.select(), identity.fixed());
    }
}
