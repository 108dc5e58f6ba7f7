//! Media downloader
//!
//! Streams a remote resource into the media directory under a name derived from its URL.
//! An existing file is never overwritten: a colliding name gets a numeric suffix, and the
//! free path is claimed atomically so concurrent downloads cannot race for it.

use crate::crawler::fetcher::{FetchFailure, FetchRequest, FetchResponse, Fetcher};
use crate::storage::MediaType;
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use url::Url;

/// Size of the write buffer used while streaming a body to disk
const CHUNK_SIZE: usize = 8192;

/// Gives up on finding a free name after this many suffixes
const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// Extension table used when the declared content type does not say
const EXTENSION_TYPES: &[(&str, MediaType)] = &[
    ("jpg", MediaType::Image),
    ("jpeg", MediaType::Image),
    ("png", MediaType::Image),
    ("gif", MediaType::Image),
    ("webp", MediaType::Image),
    ("svg", MediaType::Image),
    ("mp4", MediaType::Video),
    ("webm", MediaType::Video),
    ("mov", MediaType::Video),
    ("mp3", MediaType::Audio),
    ("wav", MediaType::Audio),
    ("ogg", MediaType::Audio),
];

/// Errors that can occur while downloading
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{0}")]
    Fetch(#[from] FetchFailure),

    #[error("transfer of {url} failed: {source}")]
    Transfer {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A resource written to local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub local_path: PathBuf,
    pub size: u64,
    pub media_type: MediaType,
}

/// Persists remote resources into the media directory
#[derive(Debug, Clone)]
pub struct Downloader {
    fetcher: Fetcher,
    media_dir: PathBuf,
}

impl Downloader {
    /// Creates a downloader writing into `media_dir`
    pub fn new(fetcher: Fetcher, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            media_dir: media_dir.into(),
        }
    }

    /// Fetches a URL and streams it to disk
    ///
    /// # Arguments
    ///
    /// * `url` - The resource to download
    /// * `interval` - Effective pacing interval for the resource's domain
    pub async fn download(&self, url: &Url, interval: Duration) -> Result<DownloadedFile, DownloadError> {
        let request = FetchRequest::get(url.clone()).with_interval(interval);
        let response = self.fetcher.fetch(request).await?;
        self.save(response).await
    }

    /// Streams an already-open response to disk
    ///
    /// A failure part-way through removes the partial file.
    pub async fn save(&self, response: FetchResponse) -> Result<DownloadedFile, DownloadError> {
        let url = response.url.clone();
        let media_type = classify_media(response.content_type.as_deref(), url.path());

        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|source| DownloadError::Io {
                path: self.media_dir.clone(),
                source,
            })?;

        let (local_path, file) = claim_path(&self.media_dir, &derive_filename(&url)).await?;

        match stream_to_file(response, file, &local_path).await {
            Ok(size) => {
                tracing::debug!("Saved {} ({} bytes) to {}", url, size, local_path.display());
                Ok(DownloadedFile {
                    local_path,
                    size,
                    media_type,
                })
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&local_path).await {
                    tracing::warn!(
                        "Could not remove partial file {}: {}",
                        local_path.display(),
                        remove_err
                    );
                }
                Err(e)
            }
        }
    }
}

async fn stream_to_file(
    response: FetchResponse,
    file: File,
    path: &Path,
) -> Result<u64, DownloadError> {
    let url = response.url.clone();
    let io_err = |source| DownloadError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    // Held until the last chunk so the domain stays busy while the body streams
    let (response, _permit) = response.into_parts();
    let mut stream = response.bytes_stream();
    let mut size: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| DownloadError::Transfer {
            url: url.clone(),
            source,
        })?;
        writer.write_all(&chunk).await.map_err(io_err)?;
        size += chunk.len() as u64;
    }

    writer.flush().await.map_err(io_err)?;
    Ok(size)
}

/// Creates the first free path among `name`, `stem_1.ext`, `stem_2.ext`, ...
///
/// The file is created with `create_new`, so the check and the claim are one step.
async fn claim_path(dir: &Path, filename: &str) -> Result<(PathBuf, File), DownloadError> {
    let (stem, ext) = split_extension(filename);

    for n in 0..=MAX_COLLISION_SUFFIX {
        let candidate = if n == 0 {
            dir.join(filename)
        } else {
            match ext {
                Some(ext) => dir.join(format!("{}_{}.{}", stem, n, ext)),
                None => dir.join(format!("{}_{}", stem, n)),
            }
        };

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(DownloadError::Io {
                    path: candidate,
                    source,
                })
            }
        }
    }

    Err(DownloadError::Io {
        path: dir.join(filename),
        source: std::io::Error::new(ErrorKind::AlreadyExists, "no free file name"),
    })
}

fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    }
}

/// Derives a local file name from a URL
///
/// Uses the last path segment; a URL without one gets `{host}_content`. Characters that
/// are unsafe in file names are replaced with `_`.
pub fn derive_filename(url: &Url) -> String {
    let basename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_content", url.host_str().unwrap_or("unknown")));

    let sanitized: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // A name of only dots would resolve to the directory itself
    if sanitized.chars().all(|c| c == '.') {
        format!("{}_content", url.host_str().unwrap_or("unknown"))
    } else {
        sanitized
    }
}

/// Classifies a resource by declared content type, falling back to its extension
///
/// An `image/*`, `video/*` or `audio/*` type decides directly. A missing or generic
/// (`application/octet-stream`) type defers to the extension table; any other declared
/// type is `Other`.
pub fn classify_media(content_type: Option<&str>, path: &str) -> MediaType {
    let declared = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());

    match declared.as_deref() {
        Some(ct) if ct.starts_with("image/") => MediaType::Image,
        Some(ct) if ct.starts_with("video/") => MediaType::Video,
        Some(ct) if ct.starts_with("audio/") => MediaType::Audio,
        None | Some("application/octet-stream") => media_type_from_extension(path),
        Some(_) => MediaType::Other,
    }
}

fn media_type_from_extension(path: &str) -> MediaType {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    ext.and_then(|ext| {
        EXTENSION_TYPES
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, media_type)| *media_type)
    })
    .unwrap_or(MediaType::Other)
}
