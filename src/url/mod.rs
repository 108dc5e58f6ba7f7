//! URL handling module for Sumi-Harvest
//!
//! This module provides URL normalization, domain extraction and the scheme+host
//! scoping rule used by discovery.

mod domain;
mod normalize;

pub use domain::{extract_domain, is_valid_url, origin_key, same_origin};
pub use normalize::normalize_url;
