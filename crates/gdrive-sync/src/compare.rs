//! Content comparison between local and remote files.
//!
//! The comparer is a capability, not a class hierarchy: anything that can
//! answer `changed(local, remote)` will do. Two implementations exist, one
//! that always hashes the local file and one backed by the persisted hash
//! cache, which skips hashing whenever a file's size and mtime are
//! unchanged since the last run.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use gdrive_cache::HashCache;
use gdrive_core::domain::{LocalFile, RemoteFile, SyncError};

/// Files at or below this size are cheap to re-hash and are never cached.
pub const MIN_CACHE_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Capability to decide whether a local/remote pair differs in content.
pub trait FileComparer: Send + Sync {
    /// Returns true when the local and remote contents differ. A remote file
    /// without a hash (a directory or an abandoned partial upload) always
    /// counts as changed.
    fn changed(&self, local: &LocalFile, remote: &RemoteFile) -> Result<bool, SyncError>;
}

/// Hex-encoded MD5 of a file's content, streamed in 64 KiB blocks.
pub fn md5_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut ctx = md5::Context::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }
    Ok(format!("{:x}", ctx.compute()))
}

/// Comparer that hashes the local file on every call.
#[derive(Debug, Default)]
pub struct Md5Comparer;

impl FileComparer for Md5Comparer {
    fn changed(&self, local: &LocalFile, remote: &RemoteFile) -> Result<bool, SyncError> {
        let sum = md5_file(&local.abs_path)?;
        Ok(match &remote.md5 {
            Some(remote_md5) => *remote_md5 != sum,
            None => true,
        })
    }
}

/// Comparer backed by the persisted hash cache.
///
/// `size + mtime` is a cheap, strong-enough pre-filter for the common
/// "nothing changed locally" case; the expensive hash computation only runs
/// when either differs. Recomputed hashes of large files are written back
/// through the cache; a persistence failure costs one future recomputation
/// and is therefore only logged.
pub struct CachedMd5Comparer {
    cache: Mutex<HashCache>,
}

impl CachedMd5Comparer {
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache: Mutex::new(HashCache::load(cache_path)),
        }
    }

    fn md5(&self, local: &LocalFile) -> Result<String, SyncError> {
        let mut cache = self.cache.lock().unwrap();

        if let Some(hit) = cache.lookup(&local.abs_path, local.size, local.modified_ns()) {
            return Ok(hit.to_string());
        }

        let sum = md5_file(&local.abs_path)?;

        if local.size > MIN_CACHE_FILE_SIZE {
            cache.insert(&local.abs_path, local.size, local.modified_ns(), &sum);
            if let Err(err) = cache.persist() {
                warn!(path = %local.abs_path.display(), %err, "failed to persist hash cache");
            }
        }

        Ok(sum)
    }
}

impl FileComparer for CachedMd5Comparer {
    fn changed(&self, local: &LocalFile, remote: &RemoteFile) -> Result<bool, SyncError> {
        let sum = self.md5(local)?;
        Ok(match &remote.md5 {
            Some(remote_md5) => *remote_md5 != sum,
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use gdrive_core::domain::FileId;
    use std::fs;

    fn local_file_for(path: &Path) -> LocalFile {
        let meta = fs::metadata(path).unwrap();
        let modified: DateTime<Utc> = meta.modified().unwrap().into();
        LocalFile {
            abs_path: path.to_path_buf(),
            rel_path: PathBuf::from(path.file_name().unwrap()),
            size: meta.len(),
            modified,
            is_dir: false,
        }
    }

    fn remote_with_md5(md5: Option<&str>) -> RemoteFile {
        RemoteFile {
            id: FileId::from("r1"),
            name: "a.txt".to_string(),
            parent: Some(FileId::from("root")),
            rel_path: PathBuf::from("a.txt"),
            size: 3,
            modified: Utc::now(),
            md5: md5.map(String::from),
            is_dir: false,
        }
    }

    #[test]
    fn test_md5_file_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"foo").unwrap();
        // md5("foo")
        assert_eq!(md5_file(&path).unwrap(), "acbd18db4cc2f85cedef654fccc4a4d8");
    }

    #[test]
    fn test_direct_comparer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"foo").unwrap();
        let local = local_file_for(&path);

        let same = remote_with_md5(Some("acbd18db4cc2f85cedef654fccc4a4d8"));
        assert!(!Md5Comparer.changed(&local, &same).unwrap());

        let differs = remote_with_md5(Some("ffffffffffffffffffffffffffffffff"));
        assert!(Md5Comparer.changed(&local, &differs).unwrap());

        // A remote record without a hash is always considered changed.
        assert!(Md5Comparer.changed(&local, &remote_with_md5(None)).unwrap());
    }

    #[test]
    fn test_cached_comparer_uses_cache_without_reading_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        fs::write(&path, b"foo").unwrap();
        let local = local_file_for(&path);

        // Seed the cache with a sentinel hash for the current (size, mtime).
        // If the comparer consults the cache it reports the sentinel; if it
        // re-hashed the bytes it would report md5("foo") instead.
        let cache_path = dir.path().join("file_cache.json");
        let mut cache = HashCache::load(&cache_path);
        cache.insert(&local.abs_path, local.size, local.modified_ns(), "sentinel");
        cache.persist().unwrap();

        let comparer = CachedMd5Comparer::new(&cache_path);
        let remote = RemoteFile {
            md5: Some("sentinel".to_string()),
            ..remote_with_md5(None)
        };
        assert!(!comparer.changed(&local, &remote).unwrap());
    }

    #[test]
    fn test_cached_comparer_recomputes_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"foo").unwrap();
        let local = local_file_for(&path);

        // Entry with a mismatched mtime must be ignored.
        let cache_path = dir.path().join("file_cache.json");
        let mut cache = HashCache::load(&cache_path);
        cache.insert(&local.abs_path, local.size, local.modified_ns() + 1, "sentinel");
        cache.persist().unwrap();

        let comparer = CachedMd5Comparer::new(&cache_path);
        let remote = remote_with_md5(Some("acbd18db4cc2f85cedef654fccc4a4d8"));
        assert!(!comparer.changed(&local, &remote).unwrap());
    }

    #[test]
    fn test_small_files_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.bin");
        fs::write(&path, b"foo").unwrap();
        let local = local_file_for(&path);

        let cache_path = dir.path().join("file_cache.json");
        let comparer = CachedMd5Comparer::new(&cache_path);
        let remote = remote_with_md5(Some("acbd18db4cc2f85cedef654fccc4a4d8"));
        assert!(!comparer.changed(&local, &remote).unwrap());

        // Below the threshold nothing is inserted, so nothing is persisted.
        assert!(!cache_path.exists());
    }

    #[test]
    fn test_large_files_are_cached_after_recompute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let content = vec![0xA5u8; (MIN_CACHE_FILE_SIZE + 1) as usize];
        fs::write(&path, &content).unwrap();
        let local = local_file_for(&path);

        let cache_path = dir.path().join("file_cache.json");
        let comparer = CachedMd5Comparer::new(&cache_path);
        let expected = md5_file(&path).unwrap();
        let remote = remote_with_md5(Some(expected.as_str()));
        assert!(!comparer.changed(&local, &remote).unwrap());

        let cache = HashCache::load(&cache_path);
        assert_eq!(
            cache.lookup(&local.abs_path, local.size, local.modified_ns()),
            Some(expected.as_str())
        );
    }
}
