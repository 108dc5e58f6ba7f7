//! Output module for harvest reports and exports
//!
//! This module handles:
//! - Aggregate statistics over the stored URLs, content and media
//! - Printing run summaries and statistics
//! - Exporting stored records as JSON, CSV or a SQL script
//! - Generating a markdown report of the latest run

mod export;
mod markdown;
pub mod stats;

pub use export::{export_all, export_csv, export_json, export_sql, ExportFormat};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{load_statistics, print_statistics, print_summary, HarvestStatistics};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur while producing output
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Unknown export format: {0}")]
    UnknownFormat(String),

    #[error("No harvest runs found in database")]
    NoRuns,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
