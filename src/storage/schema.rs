//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs and their aggregate counts
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    seed_url TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    discovered INTEGER NOT NULL DEFAULT 0,
    endpoints INTEGER NOT NULL DEFAULT 0,
    visited INTEGER NOT NULL DEFAULT 0,
    succeeded INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    media_saved INTEGER NOT NULL DEFAULT 0
);

-- Every discovered URL; visited flips 0 -> 1 exactly once
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    visited INTEGER NOT NULL DEFAULT 0,
    visited_at TEXT,
    http_status INTEGER
);

CREATE INDEX IF NOT EXISTS idx_urls_domain ON urls(domain);
CREATE INDEX IF NOT EXISTS idx_urls_visited ON urls(visited);

-- Extracted text, at most one row per URL
CREATE TABLE IF NOT EXISTS content (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL UNIQUE REFERENCES urls(id),
    content_type TEXT NOT NULL,
    text_content TEXT NOT NULL
);

-- Downloaded media assets, keyed by the page that referenced them
CREATE TABLE IF NOT EXISTS media (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    media_url TEXT NOT NULL,
    media_type TEXT NOT NULL,
    local_path TEXT NOT NULL UNIQUE,
    file_size INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_media_url_id ON media(url_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
