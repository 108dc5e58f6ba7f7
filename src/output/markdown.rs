//! Markdown summary generation
//!
//! This module generates a human-readable markdown report of a harvest run,
//! including its counts and the state of the stored records.

use crate::output::stats::HarvestStatistics;
use crate::output::OutputResult;
use crate::storage::RunRecord;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Generates a markdown summary of a run
///
/// # Arguments
///
/// * `run` - The run to report on
/// * `stats` - Statistics over the stored records
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(
    run: &RunRecord,
    stats: &HarvestStatistics,
    output_path: &Path,
) -> OutputResult<()> {
    let markdown = format_markdown_summary(run, stats);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Seconds between two RFC 3339 timestamps
fn duration_seconds(started: &str, finished: Option<&str>) -> Option<i64> {
    let started = started.parse::<DateTime<Utc>>().ok()?;
    let finished = finished?.parse::<DateTime<Utc>>().ok()?;
    Some((finished - started).num_seconds())
}

/// Formats a run and its statistics as markdown
pub fn format_markdown_summary(run: &RunRecord, stats: &HarvestStatistics) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Harvest Run Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", run.id));
    md.push_str(&format!("- **Seed URL**: {}\n", run.seed_url));
    md.push_str(&format!("- **Started**: {}\n", run.started_at));
    if let Some(finished) = &run.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = duration_seconds(&run.started_at, run.finished_at.as_deref()) {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", run.status.to_db_string()));
    md.push_str(&format!("- **Config Hash**: {}\n\n", run.config_hash));

    // Run counts
    let counts = &run.counts;
    md.push_str("## Run Counts\n\n");
    md.push_str("| Count | Value |\n");
    md.push_str("|-------|-------|\n");
    md.push_str(&format!("| Discovered | {} |\n", counts.discovered));
    md.push_str(&format!("| API Endpoints | {} |\n", counts.endpoints));
    md.push_str(&format!("| Visited | {} |\n", counts.visited));
    md.push_str(&format!("| Succeeded | {} |\n", counts.succeeded));
    md.push_str(&format!("| Failed | {} |\n", counts.failed));
    md.push_str(&format!("| Skipped by Policy | {} |\n", counts.skipped));
    md.push_str(&format!("| Media Saved | {} |\n\n", counts.media_saved));

    // Store statistics
    md.push_str("## Stored Records\n\n");
    md.push_str(&format!("- **Total URLs**: {}\n", stats.total_urls));
    md.push_str(&format!("- **Visited URLs**: {}\n", stats.visited_urls));
    md.push_str(&format!("- **Pages With Text**: {}\n", stats.content_records));
    md.push_str(&format!(
        "- **Media Files**: {} ({} bytes)\n",
        stats.media_files, stats.media_bytes
    ));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        stats.success_rate()
    ));

    if !stats.by_status.is_empty() {
        md.push_str("## HTTP Status Breakdown\n\n");
        md.push_str("| Status | URLs |\n");
        md.push_str("|--------|------|\n");
        for (status, count) in &stats.by_status {
            md.push_str(&format!("| {} | {} |\n", status, count));
        }
        md.push('\n');
    }

    if !stats.by_media_type.is_empty() {
        md.push_str("## Media Breakdown\n\n");
        md.push_str("| Type | Files |\n");
        md.push_str("|------|-------|\n");
        for (media_type, count) in &stats.by_media_type {
            md.push_str(&format!("| {} | {} |\n", media_type, count));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{RunCounts, RunStatus};

    fn create_test_run() -> RunRecord {
        RunRecord {
            id: 1,
            started_at: "2024-01-01T00:00:00Z".to_string(),
            finished_at: Some("2024-01-01T01:00:00Z".to_string()),
            seed_url: "https://example.test/".to_string(),
            config_hash: "abc123".to_string(),
            status: RunStatus::Completed,
            counts: RunCounts {
                discovered: 40,
                endpoints: 2,
                visited: 38,
                succeeded: 35,
                failed: 3,
                skipped: 4,
                media_saved: 12,
            },
        }
    }

    #[test]
    fn test_format_markdown_summary() {
        let markdown = format_markdown_summary(&create_test_run(), &HarvestStatistics::default());

        assert!(markdown.contains("# Sumi-Harvest Run Summary"));
        assert!(markdown.contains("- **Seed URL**: https://example.test/"));
        assert!(markdown.contains("- **Duration**: 3600 seconds (60.00 minutes)"));
        assert!(markdown.contains("- **Status**: completed"));
        assert!(markdown.contains("| Visited | 38 |"));
        assert!(markdown.contains("| Skipped by Policy | 4 |"));
        assert!(!markdown.contains("HTTP Status Breakdown"));
    }

    #[test]
    fn test_markdown_with_breakdowns() {
        let mut stats = HarvestStatistics::default();
        stats.by_status.insert(200, 35);
        stats.by_status.insert(404, 3);
        stats.by_media_type.insert("image".to_string(), 12);

        let markdown = format_markdown_summary(&create_test_run(), &stats);

        assert!(markdown.contains("| 200 | 35 |"));
        assert!(markdown.contains("| 404 | 3 |"));
        assert!(markdown.contains("| image | 12 |"));
    }

    #[test]
    fn test_unfinished_run_has_no_duration() {
        let mut run = create_test_run();
        run.finished_at = None;
        let markdown = format_markdown_summary(&run, &HarvestStatistics::default());
        assert!(!markdown.contains("Duration"));
    }
}
