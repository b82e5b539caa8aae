//! GDrive Cache - persisted content-hash cache.
//!
//! Hashing large files on every sync is the most expensive part of change
//! detection, so computed MD5 sums are remembered across runs in a JSON file
//! keyed by absolute path. An entry is only trusted while the file's size
//! and mtime (in nanoseconds) are both unchanged.
//!
//! The file is written atomically: the whole map is serialized to
//! `<path>.tmp` and renamed over the cache file. Two concurrent writers race
//! benignly; the loser's updates are dropped and recomputed on a later run.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One cached hash, valid while `size` and `modified` still match the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// File size in bytes at hashing time.
    pub size: u64,
    /// Modification time in nanoseconds since the epoch at hashing time.
    pub modified: i64,
    /// Hex-encoded MD5 of the file content.
    pub md5: String,
}

/// In-memory view of the persisted hash cache.
#[derive(Debug)]
pub struct HashCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
}

impl HashCache {
    /// Loads the cache from `path`. A missing or unreadable file yields an
    /// empty cache; the cache is an optimization, never a requirement.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded hash cache");
        Self { path, entries }
    }

    /// Returns the cached hash for `abs_path` when both the size and the
    /// mtime still match.
    pub fn lookup(&self, abs_path: &Path, size: u64, modified_ns: i64) -> Option<&str> {
        self.entries
            .get(&key(abs_path))
            .filter(|e| e.size == size && e.modified == modified_ns)
            .map(|e| e.md5.as_str())
    }

    /// Inserts or replaces the entry for `abs_path`.
    pub fn insert(&mut self, abs_path: &Path, size: u64, modified_ns: i64, md5: &str) {
        self.entries.insert(
            key(abs_path),
            CacheEntry {
                size,
                modified: modified_ns,
                md5: md5.to_string(),
            },
        );
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the whole map to disk: serialize to a sibling temp file, then
    /// rename over the cache file so readers never observe a partial write.
    pub fn persist(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let data = serde_json::to_vec(&self.entries)?;
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "persisted hash cache");
        Ok(())
    }
}

fn key(abs_path: &Path) -> String {
    abs_path.to_string_lossy().into_owned()
}
