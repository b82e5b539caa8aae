//! Remote object-store port (driven/secondary port).
//!
//! This module defines the interface the sync engine consumes for all remote
//! operations. The production implementation targets the Google Drive v3
//! REST API, but the trait only assumes a hierarchical store where files
//! carry a name, parent links, a content hash, a size, a modification time
//! and application-defined key/value properties.
//!
//! ## Design notes
//!
//! - Chunked uploads are modeled as a [`Media`] body: an async byte source
//!   plus a chunk size and a cancellation context. The context is created by
//!   the caller *before* the request so that idle-timeout cancellation
//!   interrupts the transfer at the transport layer.
//! - Errors carry enough structure for the retry harness to classify them;
//!   adapters map status codes into [`RemoteError`] kinds.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::domain::newtypes::FileId;

/// MIME type the remote store uses to mark directories.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A raw file record as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: FileId,
    pub name: String,
    pub mime_type: String,
    /// Parent ids. The engine requires exactly one for every managed file.
    pub parents: Vec<FileId>,
    /// Size in bytes; 0 for directories.
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// MD5 checksum of the content; absent for directories and partial
    /// uploads.
    pub md5: Option<String>,
    /// Application-defined properties (sync markers live here).
    pub app_properties: HashMap<String, String>,
}

impl FileMeta {
    pub fn is_dir(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// Metadata for a file or directory about to be created.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    /// `Some(FOLDER_MIME_TYPE)` creates a directory; `None` lets the remote
    /// infer the type from the uploaded content.
    pub mime_type: Option<String>,
    pub parents: Vec<FileId>,
    pub app_properties: HashMap<String, String>,
}

/// Partial update applied to an existing file's metadata.
#[derive(Debug, Clone, Default)]
pub struct FilePatch {
    /// Properties merged into the file's existing `app_properties`.
    pub app_properties: Option<HashMap<String, String>>,
}

/// One page of a file listing.
#[derive(Debug, Clone)]
pub struct FilePage {
    pub files: Vec<FileMeta>,
    pub next_page_token: Option<String>,
}

/// Query predicates supported by [`RemoteStore::list_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Files whose parents contain the given id.
    ChildrenOf(FileId),
    /// Files carrying the given application property.
    AppProperty { key: String, value: String },
}

impl Query {
    pub fn app_property(key: impl Into<String>, value: impl Into<String>) -> Self {
        Query::AppProperty {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Storage quota as reported by the remote store. A `limit` of 0 means the
/// account has no fixed quota.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageQuota {
    pub limit: u64,
    pub usage: u64,
}

/// Account information returned by [`RemoteStore::about`].
#[derive(Debug, Clone, Default)]
pub struct About {
    pub user: Option<String>,
    pub quota: StorageQuota,
    pub max_upload_size: u64,
}

/// One entry of the remote change log.
#[derive(Debug, Clone)]
pub struct Change {
    pub file_id: FileId,
    pub removed: bool,
    pub time: DateTime<Utc>,
    /// File metadata; absent when the change is a removal.
    pub file: Option<FileMeta>,
}

/// One page of the remote change log.
#[derive(Debug, Clone)]
pub struct ChangePage {
    pub changes: Vec<Change>,
    /// Token for the next page, when more changes are available.
    pub next_page_token: Option<String>,
    /// Token to resume from once the log has been fully consumed.
    pub new_start_page_token: Option<String>,
}

/// Content body of a chunked upload.
pub struct Media {
    /// Byte source; already wrapped in progress/timeout readers by the
    /// caller.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Total size in bytes, known up front.
    pub size: u64,
    /// Size of each uploaded body part.
    pub chunk_size: u64,
    /// Cancelling this token aborts the in-flight request.
    pub context: CancellationToken,
}

impl std::fmt::Debug for Media {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Media")
            .field("size", &self.size)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

/// Errors reported by remote-store adapters.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote file not found: {0}")]
    NotFound(FileId),

    /// Server-side failure (HTTP 5xx). Retryable.
    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// The remote asked us to slow down (HTTP 429). Retryable.
    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// Transient network failure. Retryable.
    #[error("network error: {0}")]
    Transport(String),

    /// The request context was cancelled, typically by the idle-timeout
    /// watchdog. Never retried.
    #[error("request cancelled")]
    Cancelled,

    /// The request was rejected as malformed or unauthorized.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Backend { .. }
                | RemoteError::RateLimited { .. }
                | RemoteError::Transport(_)
        )
    }
}

/// Operations the sync engine requires from the remote object store.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches a single file record by id, including its properties.
    async fn get_file(&self, id: &FileId) -> Result<FileMeta, RemoteError>;

    /// Lists files matching `query`, one page at a time.
    async fn list_files(
        &self,
        query: &Query,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<FilePage, RemoteError>;

    /// Creates a file or directory. A `media` body turns the call into a
    /// chunked upload.
    async fn create_file(
        &self,
        file: NewFile,
        media: Option<Media>,
    ) -> Result<FileMeta, RemoteError>;

    /// Updates a file's metadata and, when `media` is given, replaces its
    /// content with a chunked upload.
    async fn update_file(
        &self,
        id: &FileId,
        patch: FilePatch,
        media: Option<Media>,
    ) -> Result<FileMeta, RemoteError>;

    /// Permanently deletes a file. Directories must already be empty.
    async fn delete_file(&self, id: &FileId) -> Result<(), RemoteError>;

    /// Opens a streaming download of a file's content. Cancelling `context`
    /// aborts the transfer.
    async fn download_file(
        &self,
        id: &FileId,
        context: CancellationToken,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, RemoteError>;

    /// Account and quota information.
    async fn about(&self) -> Result<About, RemoteError>;

    /// Token addressing the current head of the change log.
    async fn changes_start_token(&self) -> Result<String, RemoteError>;

    /// Reads one page of the change log starting at `page_token`.
    async fn list_changes(
        &self,
        page_token: &str,
        page_size: usize,
    ) -> Result<ChangePage, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(mime: &str) -> FileMeta {
        FileMeta {
            id: FileId::from("f1"),
            name: "thing".to_string(),
            mime_type: mime.to_string(),
            parents: vec![FileId::from("root")],
            size: 0,
            modified: Utc::now(),
            md5: None,
            app_properties: HashMap::new(),
        }
    }

    #[test]
    fn test_is_dir() {
        assert!(meta(FOLDER_MIME_TYPE).is_dir());
        assert!(!meta("text/plain").is_dir());
    }

    #[test]
    fn test_remote_error_classification() {
        assert!(RemoteError::Backend {
            status: 500,
            message: "internal".to_string()
        }
        .is_retryable());
        assert!(RemoteError::RateLimited { retry_after: None }.is_retryable());
        assert!(RemoteError::Transport("reset".to_string()).is_retryable());
        assert!(!RemoteError::Cancelled.is_retryable());
        assert!(!RemoteError::NotFound(FileId::from("x")).is_retryable());
        assert!(!RemoteError::Invalid("bad".to_string()).is_retryable());
    }
}
