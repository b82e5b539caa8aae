//! File records produced by the local and remote scanners.
//!
//! A sync cycle works on two immutable snapshots: the local scan emits
//! [`LocalFile`] records, the remote scan emits [`RemoteFile`] records with
//! their relative paths reconstructed from parent links. A [`ChangedFile`]
//! pairs the two sides of one path whose contents differ.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::newtypes::FileId;
use crate::ports::remote_store::FileMeta;

/// Marker property set on every remote file managed by the engine.
pub const PROP_SYNC: &str = "sync";

/// Marker property identifying a sync root directory.
pub const PROP_SYNC_ROOT: &str = "syncRoot";

/// Marker property linking a descendant to its sync root, enabling the
/// single-query remote scan.
pub const PROP_SYNC_ROOT_ID: &str = "syncRootId";

/// Relative path of the sync root itself.
pub const ROOT_REL_PATH: &str = ".";

/// Markers applied to the sync root on first use.
pub fn root_markers() -> HashMap<String, String> {
    let mut props = HashMap::new();
    props.insert(PROP_SYNC.to_string(), "true".to_string());
    props.insert(PROP_SYNC_ROOT.to_string(), "true".to_string());
    props
}

/// Markers applied to every file and directory created below a sync root.
pub fn sync_markers(root_id: &FileId) -> HashMap<String, String> {
    let mut props = HashMap::new();
    props.insert(PROP_SYNC.to_string(), "true".to_string());
    props.insert(PROP_SYNC_ROOT_ID.to_string(), root_id.to_string());
    props
}

/// A file or directory found by the local scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Absolute path on the local filesystem.
    pub abs_path: PathBuf,
    /// Path relative to the sync root.
    pub rel_path: PathBuf,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl LocalFile {
    /// Final path component, used as the remote name on upload.
    pub fn name(&self) -> &str {
        self.rel_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Modification time in nanoseconds since the epoch, the key the hash
    /// cache is matched on.
    pub fn modified_ns(&self) -> i64 {
        self.modified.timestamp_nanos_opt().unwrap_or_default()
    }
}

/// A remote file record with its relative path resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: FileId,
    pub name: String,
    /// Parent id; `None` only for the sync root itself.
    pub parent: Option<FileId>,
    /// Path relative to the sync root; `"."` for the root.
    pub rel_path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Content hash reported by the remote. Absent for directories and for
    /// abandoned partial uploads.
    pub md5: Option<String>,
    pub is_dir: bool,
}

impl RemoteFile {
    /// Builds a record from a raw remote entry and its reconstructed path.
    pub fn from_meta(meta: &FileMeta, rel_path: PathBuf) -> Self {
        Self {
            id: meta.id.clone(),
            name: meta.name.clone(),
            parent: meta.parents.first().cloned(),
            rel_path,
            size: meta.size,
            modified: meta.modified,
            md5: meta.md5.clone(),
            is_dir: meta.is_dir(),
        }
    }

    /// The sync root as a remote record; its relative path is always `"."`.
    pub fn root(meta: &FileMeta) -> Self {
        Self {
            id: meta.id.clone(),
            name: meta.name.clone(),
            parent: None,
            rel_path: PathBuf::from(ROOT_REL_PATH),
            size: 0,
            modified: meta.modified,
            md5: None,
            is_dir: true,
        }
    }
}

/// Relative ordering of the two modification times of a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModTimeOrder {
    LocalNewer,
    RemoteNewer,
    Equal,
}

/// Relative ordering of the two sizes of a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeOrder {
    LocalLarger,
    RemoteLarger,
    Equal,
}

/// A file present on both sides whose contents differ.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub local: LocalFile,
    pub remote: RemoteFile,
}

impl ChangedFile {
    pub fn mod_time_order(&self) -> ModTimeOrder {
        if self.local.modified > self.remote.modified {
            ModTimeOrder::LocalNewer
        } else if self.remote.modified > self.local.modified {
            ModTimeOrder::RemoteNewer
        } else {
            ModTimeOrder::Equal
        }
    }

    pub fn size_order(&self) -> SizeOrder {
        if self.local.size > self.remote.size {
            SizeOrder::LocalLarger
        } else if self.remote.size > self.local.size {
            SizeOrder::RemoteLarger
        } else {
            SizeOrder::Equal
        }
    }
}

/// Parent path of a relative path; top-level entries resolve to the root
/// path `"."`.
pub fn parent_file_path(rel_path: &Path) -> PathBuf {
    match rel_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from(ROOT_REL_PATH),
    }
}
