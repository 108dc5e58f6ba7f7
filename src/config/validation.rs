use crate::config::types::{Config, CrawlerConfig, OutputConfig, RenderConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound on workers per stage; politeness is per domain, so more buys nothing
const MAX_WORKERS: usize = 16;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_render_config(&config.render)?;
    Ok(())
}

/// Validates a seed URL: absolute, http(s), with a host
pub fn validate_seed(seed: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http or https",
            seed
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            seed
        )));
    }

    Ok(url)
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.request_timeout_seconds == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_seconds must be > 0".to_string(),
        ));
    }

    if !config.min_request_interval_seconds.is_finite() || config.min_request_interval_seconds < 0.0
    {
        return Err(ConfigError::Validation(format!(
            "min_request_interval_seconds must be >= 0, got {}",
            config.min_request_interval_seconds
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    if config.rotation && config.pool.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent rotation requires a non-empty pool".to_string(),
        ));
    }

    if config.pool.iter().any(|agent| agent.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agent pool entries cannot be blank".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.media_dir.is_empty() {
        return Err(ConfigError::Validation(
            "media_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_render_config(config: &RenderConfig) -> Result<(), ConfigError> {
    if config.enabled && config.command.is_empty() {
        return Err(ConfigError::Validation(
            "render is enabled but no command is configured".to_string(),
        ));
    }

    if config.enabled && config.timeout_seconds == 0 {
        return Err(ConfigError::Validation(
            "render timeout_seconds must be > 0".to_string(),
        ));
    }

    Ok(())
}
