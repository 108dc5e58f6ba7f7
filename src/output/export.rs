//! Export of stored records
//!
//! JSON and CSV exports write one file per record kind into the export directory. The
//! SQL export is a single script that recreates the schema and inserts every row. The
//! markdown report is produced by [`crate::output::markdown`].

use crate::output::markdown::generate_markdown_summary;
use crate::output::stats::load_statistics;
use crate::output::{OutputError, OutputResult};
use crate::storage::{Storage, SCHEMA_SQL};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const URLS_FILE: &str = "urls_export.json";
pub const CONTENT_FILE: &str = "content_export.json";
pub const MEDIA_FILE: &str = "media_export.json";
pub const URLS_CSV_FILE: &str = "urls_export.csv";
pub const CONTENT_CSV_FILE: &str = "content_export.csv";
pub const MEDIA_CSV_FILE: &str = "media_export.csv";
pub const SQL_FILE: &str = "export.sql";
pub const SUMMARY_FILE: &str = "summary.md";

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Sql,
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "sql" => Ok(Self::Sql),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(OutputError::UnknownFormat(other.to_string())),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, records: &T) -> OutputResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}

/// Writes URLs, content and media as pretty-printed JSON arrays
///
/// # Returns
///
/// The paths written
pub fn export_json(storage: &dyn Storage, export_dir: &Path) -> OutputResult<Vec<PathBuf>> {
    std::fs::create_dir_all(export_dir)?;

    let urls = export_dir.join(URLS_FILE);
    write_json(&urls, &storage.all_urls()?)?;

    let content = export_dir.join(CONTENT_FILE);
    write_json(&content, &storage.all_content()?)?;

    let media = export_dir.join(MEDIA_FILE);
    write_json(&media, &storage.all_media()?)?;

    tracing::info!("Exported JSON to {}", export_dir.display());
    Ok(vec![urls, content, media])
}

fn write_csv<T: Serialize>(path: &Path, records: &[T]) -> OutputResult<()> {
    // Headers come from the first record, so an empty table gives an empty file
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes URLs, content and media as CSV files with a header row
///
/// # Returns
///
/// The paths written
pub fn export_csv(storage: &dyn Storage, export_dir: &Path) -> OutputResult<Vec<PathBuf>> {
    std::fs::create_dir_all(export_dir)?;

    let urls = export_dir.join(URLS_CSV_FILE);
    write_csv(&urls, &storage.all_urls()?)?;

    let content = export_dir.join(CONTENT_CSV_FILE);
    write_csv(&content, &storage.all_content()?)?;

    let media = export_dir.join(MEDIA_CSV_FILE);
    write_csv(&media, &storage.all_media()?)?;

    tracing::info!("Exported CSV to {}", export_dir.display());
    Ok(vec![urls, content, media])
}

/// Quotes a string as an SQL literal
fn sql_text(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn sql_nullable<T>(value: Option<T>, render: impl FnOnce(T) -> String) -> String {
    value.map_or_else(|| "NULL".to_string(), render)
}

/// Writes a SQL script that recreates the schema and inserts urls, content and media
///
/// Row ids are kept, so content and media still point at their URLs when the script
/// is loaded into an empty database.
pub fn export_sql(storage: &dyn Storage, export_dir: &Path) -> OutputResult<PathBuf> {
    std::fs::create_dir_all(export_dir)?;
    let path = export_dir.join(SQL_FILE);
    let mut out = BufWriter::new(File::create(&path)?);

    writeln!(out, "BEGIN TRANSACTION;")?;
    writeln!(out, "{}", SCHEMA_SQL.trim())?;

    for url in storage.all_urls()? {
        writeln!(
            out,
            "INSERT INTO urls (id, url, domain, visited, visited_at, http_status) \
             VALUES ({}, {}, {}, {}, {}, {});",
            url.id,
            sql_text(&url.url),
            sql_text(&url.domain),
            u8::from(url.visited),
            sql_nullable(url.visited_at.as_deref(), sql_text),
            sql_nullable(url.http_status, |status| status.to_string()),
        )?;
    }

    for content in storage.all_content()? {
        writeln!(
            out,
            "INSERT INTO content (id, url_id, content_type, text_content) \
             VALUES ({}, {}, {}, {});",
            content.id,
            content.url_id,
            sql_text(&content.content_type),
            sql_text(&content.text_content),
        )?;
    }

    for media in storage.all_media()? {
        writeln!(
            out,
            "INSERT INTO media (id, url_id, media_url, media_type, local_path, file_size) \
             VALUES ({}, {}, {}, {}, {}, {});",
            media.id,
            media.url_id,
            sql_text(&media.media_url),
            sql_text(media.media_type.to_db_string()),
            sql_text(&media.local_path),
            media.file_size,
        )?;
    }

    writeln!(out, "COMMIT;")?;
    out.flush()?;

    tracing::info!("Exported SQL to {}", path.display());
    Ok(path)
}

/// Runs every requested export
///
/// Formats are deduplicated; each is written at most once.
pub fn export_all(
    storage: &dyn Storage,
    formats: &[ExportFormat],
    export_dir: &Path,
) -> OutputResult<Vec<PathBuf>> {
    let mut written = Vec::new();

    if formats.contains(&ExportFormat::Json) {
        written.extend(export_json(storage, export_dir)?);
    }

    if formats.contains(&ExportFormat::Csv) {
        written.extend(export_csv(storage, export_dir)?);
    }

    if formats.contains(&ExportFormat::Sql) {
        written.push(export_sql(storage, export_dir)?);
    }

    if formats.contains(&ExportFormat::Markdown) {
        let run = storage.get_latest_run()?.ok_or(OutputError::NoRuns)?;
        let stats = load_statistics(storage)?;
        std::fs::create_dir_all(export_dir)?;
        let path = export_dir.join(SUMMARY_FILE);
        generate_markdown_summary(&run, &stats, &path)?;
        tracing::info!("Wrote markdown summary to {}", path.display());
        written.push(path);
    }

    Ok(written)
}
