//! Robots.txt handling module
//!
//! This module provides parsing of robots.txt into per-domain policy snapshots and the
//! gate that checks URLs against them and derives the effective crawl pacing.

mod gate;
mod parser;

pub use gate::{PolicyDecision, PolicyGate, CHECK_DISABLED_REASON};
pub use parser::{PolicySnapshot, MAX_CRAWL_DELAY_SECS};
