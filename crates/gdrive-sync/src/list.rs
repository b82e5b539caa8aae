//! Sync-root discovery and per-root content listing.

use gdrive_core::domain::files::PROP_SYNC_ROOT;
use gdrive_core::domain::{FileId, RemoteFile, SyncError};
use gdrive_core::ports::remote_store::{FileMeta, Query, RemoteStore};

use crate::download::get_sync_root;
use crate::scan::{list_all_files, prepare_remote_files};

/// Every directory marked as a sync root.
pub async fn sync_roots(store: &dyn RemoteStore) -> Result<Vec<FileMeta>, SyncError> {
    list_all_files(store, &Query::app_property(PROP_SYNC_ROOT, "true"), None).await
}

/// The full content of one sync root, sorted by relative path.
pub async fn sync_content(
    store: &dyn RemoteStore,
    root_id: &FileId,
) -> Result<(FileMeta, Vec<RemoteFile>), SyncError> {
    let root = get_sync_root(store, root_id).await?;
    let mut files = prepare_remote_files(store, &root).await?;
    files.sort_by(|a, b| {
        a.rel_path
            .to_string_lossy()
            .to_lowercase()
            .cmp(&b.rel_path.to_string_lossy().to_lowercase())
    });
    Ok((root, files))
}
