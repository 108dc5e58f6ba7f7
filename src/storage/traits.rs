//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{
    ContentRecord, MediaRecord, NewMedia, RunCounts, RunRecord, RunStatus, UrlRecord,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("URL not found: {0}")]
    UrlNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The store is the single writer of durable records. Every method is atomic per record,
/// and inserts of an already-present key are no-ops rather than errors.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new harvest run
    ///
    /// # Arguments
    ///
    /// * `seed_url` - The seed the run starts from
    /// * `config_hash` - Hash of the effective configuration
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, seed_url: &str, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Finishes a run with a final status and its aggregate counts
    fn finish_run(&mut self, run_id: i64, status: RunStatus, counts: &RunCounts)
        -> StorageResult<()>;

    // ===== URL Management =====

    /// Inserts a URL if absent
    ///
    /// # Returns
    ///
    /// The URL's ID and whether this call created it
    fn insert_url(&mut self, url: &str, domain: &str) -> StorageResult<(i64, bool)>;

    /// Gets a URL by ID
    fn get_url(&self, url_id: i64) -> StorageResult<UrlRecord>;

    /// Gets a URL by its address
    fn get_url_by_address(&self, url: &str) -> StorageResult<Option<UrlRecord>>;

    /// Marks a URL visited with its HTTP outcome
    ///
    /// Only an unvisited URL is updated.
    ///
    /// # Returns
    ///
    /// * `true` - The URL moved from unvisited to visited
    /// * `false` - The URL was already visited; nothing changed
    fn mark_visited(&mut self, url_id: i64, http_status: u16) -> StorageResult<bool>;

    /// Gets all unvisited URLs in insertion order
    fn unvisited_urls(&self) -> StorageResult<Vec<UrlRecord>>;

    /// Gets all URLs in insertion order
    fn all_urls(&self) -> StorageResult<Vec<UrlRecord>>;

    // ===== Content Management =====

    /// Inserts the extracted text for a URL
    ///
    /// # Returns
    ///
    /// `false` if the URL already has content
    fn insert_content(
        &mut self,
        url_id: i64,
        content_type: &str,
        text_content: &str,
    ) -> StorageResult<bool>;

    /// Gets the content recorded for a URL
    fn content_for(&self, url_id: i64) -> StorageResult<Option<ContentRecord>>;

    /// Gets all content records
    fn all_content(&self) -> StorageResult<Vec<ContentRecord>>;

    // ===== Media Management =====

    /// Records a downloaded media asset
    fn insert_media(&mut self, media: &NewMedia) -> StorageResult<i64>;

    /// Gets the media downloaded for a page
    fn media_for(&self, url_id: i64) -> StorageResult<Vec<MediaRecord>>;

    /// Gets all media records
    fn all_media(&self) -> StorageResult<Vec<MediaRecord>>;

    // ===== Statistics =====

    /// Counts all URLs
    fn count_urls(&self) -> StorageResult<usize>;

    /// Counts visited URLs
    fn count_visited(&self) -> StorageResult<usize>;

    /// Counts content records
    fn count_content(&self) -> StorageResult<usize>;

    /// Counts media records
    fn count_media(&self) -> StorageResult<usize>;
}
