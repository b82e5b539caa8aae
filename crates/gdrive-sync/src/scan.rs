//! Local and remote scanners.
//!
//! The local scanner walks the sync root depth-first, applies the
//! `.gdriveignore` rules and emits [`LocalFile`] records for every directory
//! and regular file. The remote scanner fetches every file tagged with the
//! root's `syncRootId` marker in one paginated query, validates the
//! structural invariants and reconstructs relative paths through the
//! path-tree builder.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::debug;
use walkdir::WalkDir;

use gdrive_core::config::DEFAULT_PAGE_SIZE;
use gdrive_core::domain::files::PROP_SYNC_ROOT_ID;
use gdrive_core::domain::{LocalFile, RemoteFile, SyncError};
use gdrive_core::ports::remote_store::{FileMeta, Query, RemoteStore};

use crate::pathtree::build_rel_paths;

/// Ignore file honored at the top of every sync root.
pub const IGNORE_FILE_NAME: &str = ".gdriveignore";

/// Walks `root` and returns every directory and regular file beneath it.
///
/// The root itself is skipped, as are symlinks and other non-regular
/// entries. Entries matching the ignore rules (checked against the path
/// relative to the root) are dropped.
pub fn prepare_local_files(root: &Path) -> Result<Vec<LocalFile>, SyncError> {
    let abs_root = root.canonicalize().map_err(|err| {
        SyncError::Validation(format!(
            "failed to resolve local path '{}': {}",
            root.display(),
            err
        ))
    })?;

    let ignorer = build_ignorer(&abs_root)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(&abs_root) {
        let entry = entry.map_err(std::io::Error::from)?;

        // Skip the root directory itself.
        if entry.depth() == 0 {
            continue;
        }

        // Skip entries that are neither directories nor regular files.
        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            continue;
        }

        let abs_path = entry.path().to_path_buf();
        let rel_path = abs_path
            .strip_prefix(&abs_root)
            .map_err(|err| SyncError::Validation(format!("path outside root: {}", err)))?
            .to_path_buf();

        if ignorer
            .matched_path_or_any_parents(&rel_path, file_type.is_dir())
            .is_ignore()
        {
            continue;
        }

        let metadata = entry.metadata().map_err(std::io::Error::from)?;
        let modified: DateTime<Utc> = metadata.modified()?.into();

        files.push(LocalFile {
            abs_path,
            rel_path,
            size: if file_type.is_dir() { 0 } else { metadata.len() },
            modified,
            is_dir: file_type.is_dir(),
        });
    }

    debug!(root = %abs_root.display(), files = files.len(), "local scan complete");
    Ok(files)
}

/// Compiles `<root>/.gdriveignore` when present; otherwise matches nothing.
fn build_ignorer(abs_root: &Path) -> Result<Gitignore, SyncError> {
    let ignore_path = abs_root.join(IGNORE_FILE_NAME);
    if !ignore_path.is_file() {
        return Ok(Gitignore::empty());
    }

    let mut builder = GitignoreBuilder::new(abs_root);
    if let Some(err) = builder.add(&ignore_path) {
        return Err(SyncError::Validation(format!(
            "failed to read ignore file '{}': {}",
            ignore_path.display(),
            err
        )));
    }
    builder.build().map_err(|err| {
        SyncError::Validation(format!(
            "failed to compile ignore file '{}': {}",
            ignore_path.display(),
            err
        ))
    })
}

/// Fetches all remote files below `root` and resolves their relative paths.
pub async fn prepare_remote_files(
    store: &dyn RemoteStore,
    root: &FileMeta,
) -> Result<Vec<RemoteFile>, SyncError> {
    let query = Query::app_property(PROP_SYNC_ROOT_ID, root.id.as_str());
    let files = list_all_files(store, &query, None).await?;

    check_files(&files)?;

    let rel_paths = build_rel_paths(root, &files)?;

    let mut remote_files = Vec::with_capacity(files.len());
    for f in &files {
        let rel_path = rel_paths.get(&f.id).ok_or_else(|| {
            SyncError::Precondition(format!("file {} does not have a valid parent", f.id))
        })?;
        remote_files.push(RemoteFile::from_meta(f, rel_path.clone()));
    }

    debug!(root = %root.id, files = remote_files.len(), "remote scan complete");
    Ok(remote_files)
}

/// Validates the structural invariants of a remote scan: every file has
/// exactly one parent, and no two files share a name under one parent.
fn check_files(files: &[FileMeta]) -> Result<(), SyncError> {
    let mut seen: HashMap<(String, &str), &FileMeta> = HashMap::with_capacity(files.len());

    for f in files {
        if f.parents.len() != 1 {
            return Err(SyncError::Precondition(format!(
                "file {} does not have exactly one parent",
                f.id
            )));
        }

        let key = (f.name.clone(), f.parents[0].as_str());
        if let Some(dupe) = seen.insert(key, f) {
            return Err(SyncError::Precondition(format!(
                "found name collision between {} and {}",
                f.id, dupe.id
            )));
        }
    }

    Ok(())
}

/// Aggregates every page of a listing query. `max_files` caps the result;
/// `None` collects everything.
pub async fn list_all_files(
    store: &dyn RemoteStore,
    query: &Query,
    max_files: Option<usize>,
) -> Result<Vec<FileMeta>, SyncError> {
    let page_size = match max_files {
        Some(max) if max < DEFAULT_PAGE_SIZE => max,
        _ => DEFAULT_PAGE_SIZE,
    };

    let mut files = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = store
            .list_files(query, page_size, page_token.as_deref())
            .await?;
        files.extend(page.files);

        if let Some(max) = max_files {
            if files.len() >= max {
                files.truncate(max);
                break;
            }
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(files)
}
