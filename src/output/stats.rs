//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::crawler::RunSummary;
use crate::storage::{Storage, StorageResult, FAILED_FETCH_STATUS};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Harvest statistics summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestStatistics {
    /// Total number of URLs stored
    pub total_urls: usize,

    /// URLs that have been visited
    pub visited_urls: usize,

    /// Number of distinct domains among stored URLs
    pub unique_domains: usize,

    /// Pages with extracted text
    pub content_records: usize,

    /// Downloaded media files
    pub media_files: usize,

    /// Total bytes of downloaded media
    pub media_bytes: u64,

    /// Visited URLs by recorded HTTP status
    pub by_status: BTreeMap<u16, usize>,

    /// Downloaded media by type
    pub by_media_type: BTreeMap<String, usize>,
}

impl HarvestStatistics {
    /// Visited URLs recorded with a 200
    pub fn succeeded(&self) -> usize {
        self.by_status.get(&200).copied().unwrap_or(0)
    }

    /// Percentage of visited URLs recorded with a 200
    pub fn success_rate(&self) -> f64 {
        if self.visited_urls == 0 {
            0.0
        } else {
            self.succeeded() as f64 / self.visited_urls as f64 * 100.0
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<HarvestStatistics> {
    let urls = storage.all_urls()?;
    let media = storage.all_media()?;

    let mut by_status = BTreeMap::new();
    let mut domains = BTreeSet::new();
    for url in &urls {
        domains.insert(url.domain.as_str());
        if let Some(status) = url.http_status {
            *by_status.entry(status).or_insert(0) += 1;
        }
    }

    let mut by_media_type = BTreeMap::new();
    for record in &media {
        *by_media_type
            .entry(record.media_type.to_db_string().to_string())
            .or_insert(0) += 1;
    }

    Ok(HarvestStatistics {
        total_urls: urls.len(),
        visited_urls: storage.count_visited()?,
        unique_domains: domains.len(),
        content_records: storage.count_content()?,
        media_files: media.len(),
        media_bytes: media.iter().map(|m| m.file_size).sum(),
        by_status,
        by_media_type,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Total URLs: {}", stats.total_urls);
    println!("  Visited: {}", stats.visited_urls);
    println!("  Unique domains: {}", stats.unique_domains);
    println!("  Pages with text: {}", stats.content_records);
    println!(
        "  Media files: {} ({} bytes)",
        stats.media_files, stats.media_bytes
    );
    println!();

    if !stats.by_status.is_empty() {
        println!("URLs by HTTP Status:");
        for (status, count) in &stats.by_status {
            let note = if *status == FAILED_FETCH_STATUS {
                " (includes fetches with no response)"
            } else {
                ""
            };
            println!("  {}: {}{}", status, count, note);
        }
        println!();
    }

    if !stats.by_media_type.is_empty() {
        println!("Media by Type:");
        let mut media_counts: Vec<_> = stats.by_media_type.iter().collect();
        media_counts.sort_by(|a, b| b.1.cmp(a.1));
        for (media_type, count) in media_counts {
            println!("  {}: {}", media_type, count);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} visited URLs returned 200)",
        stats.success_rate(),
        stats.succeeded(),
        stats.visited_urls
    );
}

/// Prints the counts of a finished run
pub fn print_summary(summary: &RunSummary) {
    let counts = &summary.counts;
    println!("=== Harvest Run {} ===\n", summary.run_id);
    println!("  Seed: {}", summary.seed_url);
    println!("  Duration: {:.1}s", summary.duration_seconds);
    println!("  Discovered: {}", counts.discovered);
    if counts.endpoints > 0 {
        println!("  API endpoints: {}", counts.endpoints);
    }
    println!("  Visited: {}", counts.visited);
    println!("  Succeeded: {}", counts.succeeded);
    println!("  Failed: {}", counts.failed);
    println!("  Skipped by policy: {}", counts.skipped);
    println!("  Media saved: {}", counts.media_saved);
}
