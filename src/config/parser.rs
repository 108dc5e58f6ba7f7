use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Max depth: {}", config.crawler.max_depth);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the effective configuration
///
/// The configuration is re-serialized first so that defaults and CLI overrides are
/// part of the hash, not just the file text.
///
/// # Returns
///
/// Hex-encoded SHA-256 hash
pub fn compute_config_hash(config: &Config) -> Result<String, ConfigError> {
    let rendered = toml::to_string(config)
        .map_err(|e| ConfigError::Validation(format!("Failed to serialize config: {}", e)))?;
    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
