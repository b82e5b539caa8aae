//! In-memory remote store used by the driver integration tests.
#![allow(dead_code)]
//!
//! Behaves like a small hierarchical object store: parents must exist before
//! children, directories must be empty before deletion, uploads are read
//! through the caller's media body (honoring its cancellation context), and
//! every mutation is counted so tests can assert idempotence.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::sync::CancellationToken;

use gdrive_core::domain::files::{root_markers, sync_markers};
use gdrive_core::domain::FileId;
use gdrive_core::ports::remote_store::{
    About, Change, ChangePage, FileMeta, FilePage, FilePatch, Media, NewFile, Query, RemoteError,
    RemoteStore, StorageQuota, FOLDER_MIME_TYPE,
};

pub const ROOT_ID: &str = "root";

#[derive(Debug, Clone)]
struct StoredFile {
    meta: FileMeta,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    files: HashMap<FileId, StoredFile>,
    quota: StorageQuota,
    next_id: u64,
    mutations: usize,
    deletion_order: Vec<String>,
    downloads: usize,
    changes: Vec<Change>,
}

/// In-memory [`RemoteStore`] implementation.
pub struct FakeRemote {
    state: Mutex<State>,
    stall_uploads: bool,
    stall_downloads: bool,
}

impl FakeRemote {
    /// A store holding a single unmarked, empty root directory.
    pub fn new() -> Self {
        let fake = Self {
            state: Mutex::new(State::default()),
            stall_uploads: false,
            stall_downloads: false,
        };
        fake.put_dir(ROOT_ID, "Sync", None, HashMap::new());
        fake
    }

    /// A store whose root already carries the sync-root markers.
    pub fn with_marked_root() -> Self {
        let fake = Self {
            state: Mutex::new(State::default()),
            stall_uploads: false,
            stall_downloads: false,
        };
        fake.put_dir(ROOT_ID, "Sync", None, root_markers());
        fake
    }

    pub fn stalling_uploads(mut self) -> Self {
        self.stall_uploads = true;
        self
    }

    pub fn stalling_downloads(mut self) -> Self {
        self.stall_downloads = true;
        self
    }

    pub fn set_quota(&self, limit: u64, usage: u64) {
        self.state.lock().unwrap().quota = StorageQuota { limit, usage };
    }

    /// Inserts a directory record directly, bypassing the port.
    pub fn put_dir(
        &self,
        id: &str,
        name: &str,
        parent: Option<&str>,
        app_properties: HashMap<String, String>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(
            FileId::from(id),
            StoredFile {
                meta: FileMeta {
                    id: FileId::from(id),
                    name: name.to_string(),
                    mime_type: FOLDER_MIME_TYPE.to_string(),
                    parents: parent.map(|p| vec![FileId::from(p)]).unwrap_or_default(),
                    size: 0,
                    modified: Utc::now(),
                    md5: None,
                    app_properties,
                },
                content: Vec::new(),
            },
        );
    }

    /// Inserts a managed directory below the root.
    pub fn put_synced_dir(&self, id: &str, name: &str, parent: &str) {
        self.put_dir(id, name, Some(parent), sync_markers(&FileId::from(ROOT_ID)));
    }

    /// Inserts a managed file record directly, bypassing the port.
    pub fn put_synced_file(&self, id: &str, name: &str, parent: &str, content: &[u8]) {
        self.put_synced_file_modified(id, name, parent, content, Utc::now());
    }

    pub fn put_synced_file_modified(
        &self,
        id: &str,
        name: &str,
        parent: &str,
        content: &[u8],
        modified: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(
            FileId::from(id),
            StoredFile {
                meta: FileMeta {
                    id: FileId::from(id),
                    name: name.to_string(),
                    mime_type: "application/octet-stream".to_string(),
                    parents: vec![FileId::from(parent)],
                    size: content.len() as u64,
                    modified,
                    md5: Some(format!("{:x}", md5::compute(content))),
                    app_properties: sync_markers(&FileId::from(ROOT_ID)),
                },
                content: content.to_vec(),
            },
        );
    }

    pub fn meta(&self, id: &str) -> Option<FileMeta> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&FileId::from(id))
            .map(|f| f.meta.clone())
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&FileId::from(id))
            .map(|f| f.content.clone())
    }

    /// First stored file with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<FileMeta> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<&StoredFile> = state
            .files
            .values()
            .filter(|f| f.meta.name == name)
            .collect();
        matches.sort_by(|a, b| a.meta.id.as_str().cmp(b.meta.id.as_str()));
        matches.first().map(|f| f.meta.clone())
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    /// Number of create/update/delete calls accepted so far.
    pub fn mutations(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    /// Names of deleted entries, in deletion order.
    pub fn deletion_order(&self) -> Vec<String> {
        self.state.lock().unwrap().deletion_order.clone()
    }

    pub fn downloads(&self) -> usize {
        self.state.lock().unwrap().downloads
    }

    fn record_change(state: &mut State, file_id: &FileId, removed: bool) {
        let file = state.files.get(file_id).map(|f| f.meta.clone());
        state.changes.push(Change {
            file_id: file_id.clone(),
            removed,
            time: Utc::now(),
            file,
        });
    }
}

/// Reads an upload body to completion, honoring the cancellation context.
async fn read_media(mut media: Media, stall: bool) -> Result<Vec<u8>, RemoteError> {
    let chunk_size = media.chunk_size.clamp(1, 1024 * 1024) as usize;
    let context = media.context.clone();

    let read_all = async move {
        let mut content = Vec::new();
        let mut chunk = vec![0u8; chunk_size];
        loop {
            let n = media
                .reader
                .read(&mut chunk)
                .await
                .map_err(|err| RemoteError::Transport(err.to_string()))?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..n]);
            if stall {
                // Connection wedged mid-transfer; only the caller's
                // cancellation context gets us out.
                std::future::pending::<()>().await;
            }
        }
        Ok(content)
    };

    tokio::select! {
        _ = context.cancelled() => Err(RemoteError::Cancelled),
        result = read_all => result,
    }
}

/// Byte stream that yields one chunk and then wedges.
struct StalledStream {
    chunk: Option<Vec<u8>>,
}

impl AsyncRead for StalledStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.chunk.take() {
            Some(chunk) => {
                buf.put_slice(&chunk);
                Poll::Ready(Ok(()))
            }
            None => Poll::Pending,
        }
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn get_file(&self, id: &FileId) -> Result<FileMeta, RemoteError> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(id)
            .map(|f| f.meta.clone())
            .ok_or_else(|| RemoteError::NotFound(id.clone()))
    }

    async fn list_files(
        &self,
        query: &Query,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<FilePage, RemoteError> {
        let state = self.state.lock().unwrap();

        let mut matches: Vec<FileMeta> = state
            .files
            .values()
            .filter(|f| match query {
                Query::ChildrenOf(parent) => f.meta.parents.contains(parent),
                Query::AppProperty { key, value } => {
                    f.meta.app_properties.get(key) == Some(value)
                }
            })
            .map(|f| f.meta.clone())
            .collect();
        matches.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        let start: usize = page_token
            .map(|t| {
                t.parse::<usize>()
                    .map_err(|_| RemoteError::Invalid("bad page token".to_string()))
            })
            .transpose()?
            .unwrap_or(0);
        let end = (start + page_size.max(1)).min(matches.len());
        let next_page_token = (end < matches.len()).then(|| end.to_string());

        Ok(FilePage {
            files: matches[start..end].to_vec(),
            next_page_token,
        })
    }

    async fn create_file(
        &self,
        file: NewFile,
        media: Option<Media>,
    ) -> Result<FileMeta, RemoteError> {
        let content = match media {
            Some(media) => Some(read_media(media, self.stall_uploads).await?),
            None => None,
        };

        let mut state = self.state.lock().unwrap();

        for parent in &file.parents {
            if !state.files.contains_key(parent) {
                return Err(RemoteError::Invalid(format!(
                    "parent does not exist: {parent}"
                )));
            }
        }

        state.next_id += 1;
        let id = FileId::new(format!("f{}", state.next_id));
        let content = content.unwrap_or_default();
        let is_dir = file.mime_type.as_deref() == Some(FOLDER_MIME_TYPE);
        let md5 = if is_dir {
            None
        } else {
            Some(format!("{:x}", md5::compute(&content)))
        };

        let meta = FileMeta {
            id: id.clone(),
            name: file.name,
            mime_type: file
                .mime_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            parents: file.parents,
            size: content.len() as u64,
            modified: Utc::now(),
            md5,
            app_properties: file.app_properties,
        };

        state.files.insert(id.clone(), StoredFile {
            meta: meta.clone(),
            content,
        });
        state.mutations += 1;
        FakeRemote::record_change(&mut state, &id, false);
        Ok(meta)
    }

    async fn update_file(
        &self,
        id: &FileId,
        patch: FilePatch,
        media: Option<Media>,
    ) -> Result<FileMeta, RemoteError> {
        let content = match media {
            Some(media) => Some(read_media(media, self.stall_uploads).await?),
            None => None,
        };

        let mut state = self.state.lock().unwrap();
        let stored = state
            .files
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;

        if let Some(props) = patch.app_properties {
            stored.meta.app_properties.extend(props);
        }
        if let Some(content) = content {
            stored.meta.size = content.len() as u64;
            stored.meta.md5 = Some(format!("{:x}", md5::compute(&content)));
            stored.meta.modified = Utc::now();
            stored.content = content;
        }

        let meta = stored.meta.clone();
        state.mutations += 1;
        FakeRemote::record_change(&mut state, id, false);
        Ok(meta)
    }

    async fn delete_file(&self, id: &FileId) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();

        let stored = state
            .files
            .get(id)
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;

        // Directories must be empty before removal.
        if stored.meta.is_dir()
            && state.files.values().any(|f| f.meta.parents.contains(id))
        {
            return Err(RemoteError::Invalid(format!(
                "directory {id} still has children"
            )));
        }

        let name = stored.meta.name.clone();
        FakeRemote::record_change(&mut state, id, true);
        state.files.remove(id);
        state.mutations += 1;
        state.deletion_order.push(name);
        Ok(())
    }

    async fn download_file(
        &self,
        id: &FileId,
        _context: CancellationToken,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.downloads += 1;
        let stored = state
            .files
            .get(id)
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;

        if self.stall_downloads {
            let half = stored.content.len() / 2;
            return Ok(Box::new(StalledStream {
                chunk: Some(stored.content[..half.max(1).min(stored.content.len())].to_vec()),
            }));
        }

        Ok(Box::new(std::io::Cursor::new(stored.content.clone())))
    }

    async fn about(&self) -> Result<About, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok(About {
            user: Some("tester@example.com".to_string()),
            quota: state.quota,
            max_upload_size: 5 * 1024 * 1024 * 1024,
        })
    }

    async fn changes_start_token(&self) -> Result<String, RemoteError> {
        Ok(self.state.lock().unwrap().changes.len().to_string())
    }

    async fn list_changes(
        &self,
        page_token: &str,
        page_size: usize,
    ) -> Result<ChangePage, RemoteError> {
        let state = self.state.lock().unwrap();
        let start: usize = page_token
            .parse()
            .map_err(|_| RemoteError::Invalid("bad page token".to_string()))?;
        let end = (start + page_size.max(1)).min(state.changes.len());

        Ok(ChangePage {
            changes: state.changes[start..end].to_vec(),
            next_page_token: (end < state.changes.len()).then(|| end.to_string()),
            new_start_page_token: (end == state.changes.len())
                .then(|| state.changes.len().to_string()),
        })
    }
}
