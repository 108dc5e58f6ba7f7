//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ContentRecord, MediaRecord, MediaType, NewMedia, RunCounts, RunRecord, RunStatus, UrlRecord,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const URL_COLUMNS: &str = "id, url, domain, visited, visited_at, http_status";
const MEDIA_COLUMNS: &str = "id, url_id, media_url, media_type, local_path, file_size";
const RUN_COLUMNS: &str = "id, started_at, finished_at, seed_url, config_hash, status, \
     discovered, endpoints, visited, succeeded, failed, skipped, media_saved";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, query: &str) -> StorageResult<usize> {
        let count: i64 = self.conn.query_row(query, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn query_urls(&self, query: &str) -> StorageResult<Vec<UrlRecord>> {
        let mut stmt = self.conn.prepare(query)?;
        let urls = stmt
            .query_map([], url_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls)
    }
}

fn url_from_row(row: &Row<'_>) -> rusqlite::Result<UrlRecord> {
    Ok(UrlRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        visited: row.get::<_, i64>(3)? != 0,
        visited_at: row.get(4)?,
        http_status: row.get(5)?,
    })
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<ContentRecord> {
    Ok(ContentRecord {
        id: row.get(0)?,
        url_id: row.get(1)?,
        content_type: row.get(2)?,
        text_content: row.get(3)?,
    })
}

fn media_from_row(row: &Row<'_>) -> rusqlite::Result<MediaRecord> {
    Ok(MediaRecord {
        id: row.get(0)?,
        url_id: row.get(1)?,
        media_url: row.get(2)?,
        media_type: MediaType::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(MediaType::Other),
        local_path: row.get(4)?,
        file_size: row.get::<_, i64>(5)? as u64,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let count = |idx: usize| -> rusqlite::Result<usize> { Ok(row.get::<_, i64>(idx)? as usize) };
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        seed_url: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?).unwrap_or(RunStatus::Failed),
        counts: RunCounts {
            discovered: count(6)?,
            endpoints: count(7)?,
            visited: count(8)?,
            succeeded: count(9)?,
            failed: count(10)?,
            skipped: count(11)?,
            media_saved: count(12)?,
        },
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, seed_url: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, seed_url, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![now, seed_url, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counts: &RunCounts,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, discovered = ?3, endpoints = ?4,
             visited = ?5, succeeded = ?6, failed = ?7, skipped = ?8, media_saved = ?9
             WHERE id = ?10",
            params![
                status.to_db_string(),
                now,
                counts.discovered as i64,
                counts.endpoints as i64,
                counts.visited as i64,
                counts.succeeded as i64,
                counts.failed as i64,
                counts.skipped as i64,
                counts.media_saved as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== URL Management =====

    fn insert_url(&mut self, url: &str, domain: &str) -> StorageResult<(i64, bool)> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO urls (url, domain) VALUES (?1, ?2)",
            params![url, domain],
        )? == 1;

        let id: i64 = self
            .conn
            .query_row("SELECT id FROM urls WHERE url = ?1", params![url], |row| {
                row.get(0)
            })?;

        Ok((id, inserted))
    }

    fn get_url(&self, url_id: i64) -> StorageResult<UrlRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM urls WHERE id = ?1", URL_COLUMNS),
                params![url_id],
                url_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::UrlNotFound(format!("URL ID {}", url_id)))
    }

    fn get_url_by_address(&self, url: &str) -> StorageResult<Option<UrlRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM urls WHERE url = ?1", URL_COLUMNS),
                params![url],
                url_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn mark_visited(&mut self, url_id: i64, http_status: u16) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE urls SET visited = 1, visited_at = ?1, http_status = ?2
             WHERE id = ?3 AND visited = 0",
            params![now, http_status, url_id],
        )?;

        if updated == 0 {
            // Distinguish "already visited" from "no such URL"
            self.get_url(url_id)?;
        }
        Ok(updated == 1)
    }

    fn unvisited_urls(&self) -> StorageResult<Vec<UrlRecord>> {
        self.query_urls(&format!(
            "SELECT {} FROM urls WHERE visited = 0 ORDER BY id",
            URL_COLUMNS
        ))
    }

    fn all_urls(&self) -> StorageResult<Vec<UrlRecord>> {
        self.query_urls(&format!("SELECT {} FROM urls ORDER BY id", URL_COLUMNS))
    }

    // ===== Content Management =====

    fn insert_content(
        &mut self,
        url_id: i64,
        content_type: &str,
        text_content: &str,
    ) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO content (url_id, content_type, text_content) VALUES (?1, ?2, ?3)",
            params![url_id, content_type, text_content],
        )?;
        Ok(inserted == 1)
    }

    fn content_for(&self, url_id: i64) -> StorageResult<Option<ContentRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, url_id, content_type, text_content FROM content WHERE url_id = ?1",
                params![url_id],
                content_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn all_content(&self) -> StorageResult<Vec<ContentRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, url_id, content_type, text_content FROM content ORDER BY id")?;
        let records = stmt
            .query_map([], content_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ===== Media Management =====

    fn insert_media(&mut self, media: &NewMedia) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO media (url_id, media_url, media_type, local_path, file_size)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                media.url_id,
                media.media_url,
                media.media_type.to_db_string(),
                media.local_path,
                media.file_size as i64
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn media_for(&self, url_id: i64) -> StorageResult<Vec<MediaRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM media WHERE url_id = ?1 ORDER BY id",
            MEDIA_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![url_id], media_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn all_media(&self) -> StorageResult<Vec<MediaRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM media ORDER BY id", MEDIA_COLUMNS))?;
        let records = stmt
            .query_map([], media_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ===== Statistics =====

    fn count_urls(&self) -> StorageResult<usize> {
        self.count("SELECT COUNT(*) FROM urls")
    }

    fn count_visited(&self) -> StorageResult<usize> {
        self.count("SELECT COUNT(*) FROM urls WHERE visited = 1")
    }

    fn count_content(&self) -> StorageResult<usize> {
        self.count("SELECT COUNT(*) FROM content")
    }

    fn count_media(&self) -> StorageResult<usize> {
        self.count("SELECT COUNT(*) FROM media")
    }
}
