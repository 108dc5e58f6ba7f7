//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! All keys are optional; omitted values fall back to the documented defaults.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvester will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, OutputConfig, PolitenessConfig, RenderConfig, UserAgentConfig,
};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_config, parse_config};
pub use validation::{validate, validate_seed};
