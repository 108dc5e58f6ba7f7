//! Storage module for persisting harvest data
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - URL records with exactly-once visit transitions
//! - Extracted text and downloaded media metadata
//! - Run tracking with aggregate counts
//!
//! Components never touch the database file directly; they go through a [`Store`]
//! handle, which serializes access to the single [`SqliteStorage`] connection.

mod schema;
mod sqlite;
mod traits;

pub use schema::SCHEMA_SQL;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// HTTP status recorded for a URL whose fetch failed without any response
pub const FAILED_FETCH_STATUS: u16 = 404;

/// Represents a URL in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlRecord {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub visited: bool,
    pub visited_at: Option<String>,
    pub http_status: Option<u16>,
}

/// Extracted text of one HTML page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRecord {
    pub id: i64,
    pub url_id: i64,
    pub content_type: String,
    pub text_content: String,
}

/// A downloaded media asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaRecord {
    pub id: i64,
    /// The page that referenced the asset
    pub url_id: i64,
    pub media_url: String,
    pub media_type: MediaType,
    pub local_path: String,
    pub file_size: u64,
}

/// A media asset about to be recorded
#[derive(Debug, Clone)]
pub struct NewMedia {
    pub url_id: i64,
    pub media_url: String,
    pub media_type: MediaType,
    pub local_path: String,
    pub file_size: u64,
}

/// Kind of a media asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Embedded,
    BackgroundImage,
    Other,
}

impl MediaType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Embedded => "embedded",
            Self::BackgroundImage => "background_image",
            Self::Other => "other",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "embedded" => Some(Self::Embedded),
            "background_image" => Some(Self::BackgroundImage),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Represents a harvest run
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub seed_url: String,
    pub config_hash: String,
    pub status: RunStatus,
    pub counts: RunCounts,
}

/// Aggregate counts reported for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub discovered: usize,
    pub endpoints: usize,
    pub visited: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub media_saved: usize,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SqliteStorage::new(path)
}

/// Cloneable handle to the shared storage backend
///
/// The lock is taken for one closure at a time and never held across an `.await`.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<SqliteStorage>>,
}

impl Store {
    /// Wraps a storage backend in a shared handle
    pub fn new(storage: SqliteStorage) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    /// Runs a storage operation under the lock
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sumi_harvest::storage::{open_storage, Storage, Store};
    /// use std::path::Path;
    ///
    /// let store = Store::new(open_storage(Path::new("harvest.db")).unwrap());
    /// let total = store.with(|s| s.count_urls()).unwrap();
    /// ```
    pub fn with<T>(
        &self,
        op: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut storage = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        op(&mut storage)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
