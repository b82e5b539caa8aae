//! Upload sync: mirror a local directory tree onto a remote sync root.
//!
//! One cycle walks a fixed state machine: prepare the root (first use
//! promotes an empty directory into a sync root), scan both sides
//! concurrently, classify, guard remote free space, pre-check conflicts
//! under the abort policy, create missing directories parents-first, upload
//! missing files, update changed files under the conflict policy, and
//! optionally delete extraneous remote entries children-first.
//!
//! Any error aborts the cycle immediately. Divergences compound silently, so
//! loud failure is preferred over per-file recovery.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::info;
use uuid::Uuid;

use gdrive_core::domain::files::{parent_file_path, root_markers, sync_markers, PROP_SYNC_ROOT};
use gdrive_core::domain::{ChangedFile, FileId, LocalFile, RemoteFile, SyncError};
use gdrive_core::ports::remote_store::{
    FileMeta, FilePatch, Media, NewFile, Query, RemoteError, RemoteStore, FOLDER_MIME_TYPE,
};

use crate::classify::SyncFiles;
use crate::compare::FileComparer;
use crate::conflict::{check_remote_conflict, ensure_no_remote_modifications, ConflictResolution, Verdict};
use crate::progress::{with_progress, ProgressSink};
use crate::retry::with_retry;
use crate::scan::{prepare_local_files, prepare_remote_files};
use crate::timeout::with_timeout;

/// Options for one upload-sync cycle.
pub struct UploadSyncArgs {
    /// Status lines are written here.
    pub out: Box<dyn Write + Send>,
    /// Progress sink for chunked transfers; `None` disables reporting.
    pub progress: Option<ProgressSink>,
    /// Local directory to mirror.
    pub path: PathBuf,
    /// Id of the remote sync root.
    pub root_id: FileId,
    /// Print the plan without mutating the remote side.
    pub dry_run: bool,
    /// Delete remote entries that no longer exist locally.
    pub delete_extraneous: bool,
    /// Body-part size for chunked uploads.
    pub chunk_size: u64,
    /// Idle timeout for transfers; zero disables the watchdog.
    pub timeout: Duration,
    /// Conflict policy for changed files.
    pub resolution: ConflictResolution,
    /// Content comparison strategy.
    pub comparer: Box<dyn FileComparer>,
}

/// Runs one upload-sync cycle.
pub async fn upload_sync(store: &dyn RemoteStore, mut args: UploadSyncArgs) -> Result<(), SyncError> {
    writeln!(args.out, "Starting sync...")?;
    let started = Instant::now();

    let root = prepare_sync_root(store, &args).await?;

    writeln!(args.out, "Collecting local and remote file information...")?;
    let mut files = prepare_sync_files(store, &args.path, &root).await?;

    let changed = files.changed_local_files(args.comparer.as_ref())?;
    let missing = files.missing_remote_files();

    writeln!(
        args.out,
        "Found {} local files and {} remote files",
        files.local_len(),
        files.remote_len()
    )?;

    check_remote_free_space(store, &missing, &changed).await?;

    if args.resolution == ConflictResolution::Abort {
        ensure_no_remote_modifications(&changed)?;
    }

    create_missing_remote_dirs(store, &mut files, &mut args).await?;
    upload_missing_files(store, &missing, &files, &mut args).await?;
    update_changed_files(store, &changed, &mut args).await?;

    if args.delete_extraneous {
        delete_extraneous_remote_files(store, &files, &mut args).await?;
    }

    writeln!(args.out, "Sync finished in {:.1?}", started.elapsed())?;
    info!(
        local = files.local_len(),
        remote = files.remote_len(),
        changed = changed.len(),
        uploaded = missing.len(),
        dry_run = args.dry_run,
        "upload sync complete"
    );
    Ok(())
}

/// Fetches the sync root, promoting an empty unmarked directory on first use.
///
/// A directory already carrying the `syncRoot` marker is used as-is. An
/// unmarked directory must be empty; it is then marked with
/// `{sync, syncRoot}`. Anything else is a fatal validation error.
async fn prepare_sync_root(
    store: &dyn RemoteStore,
    args: &UploadSyncArgs,
) -> Result<FileMeta, SyncError> {
    let file = store.get_file(&args.root_id).await.map_err(|err| match err {
        RemoteError::NotFound(id) => {
            SyncError::Validation(format!("failed to find root directory: {}", id))
        }
        other => SyncError::from(other),
    })?;

    if !file.is_dir() {
        return Err(SyncError::Validation(
            "provided root id is not a directory".to_string(),
        ));
    }

    if file.app_properties.contains_key(PROP_SYNC_ROOT) {
        return Ok(file);
    }

    // First sync against this directory: it must be empty before promotion.
    let children = store
        .list_files(&Query::ChildrenOf(file.id.clone()), 1, None)
        .await?;
    if !children.files.is_empty() {
        return Err(SyncError::Validation(
            "root directory is not empty, the initial sync requires an empty directory".to_string(),
        ));
    }

    if args.dry_run {
        let mut promoted = file;
        promoted.app_properties.extend(root_markers());
        return Ok(promoted);
    }

    let patch = FilePatch {
        app_properties: Some(root_markers()),
    };
    store
        .update_file(&file.id, patch, None)
        .await
        .map_err(SyncError::from)
}

/// Runs the local and remote scans concurrently and joins them into one
/// classified snapshot.
async fn prepare_sync_files(
    store: &dyn RemoteStore,
    path: &Path,
    root: &FileMeta,
) -> Result<SyncFiles, SyncError> {
    let local_root = path.to_path_buf();
    let local_scan = async {
        tokio::task::spawn_blocking(move || prepare_local_files(&local_root))
            .await
            .map_err(|err| {
                SyncError::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
            })?
    };

    let (local, remote) = tokio::try_join!(local_scan, prepare_remote_files(store, root))?;
    Ok(SyncFiles::new(RemoteFile::root(root), local, remote))
}

/// Sums the bytes about to be uploaded and refuses the sync when the remote
/// quota cannot hold them. A quota limit of zero means unlimited.
async fn check_remote_free_space(
    store: &dyn RemoteStore,
    missing: &[LocalFile],
    changed: &[ChangedFile],
) -> Result<(), SyncError> {
    let about = store.about().await?;
    if about.quota.limit == 0 {
        return Ok(());
    }

    let available = about.quota.limit.saturating_sub(about.quota.usage);
    let needed: u64 = missing.iter().map(|f| f.size).sum::<u64>()
        + changed.iter().map(|cf| cf.local.size).sum::<u64>();

    if needed > available {
        return Err(SyncError::Quota { needed, available });
    }
    Ok(())
}

/// Creates the missing remote directories, shortest paths first so every
/// parent exists before its children, appending each created directory to
/// the remote snapshot for later lookups.
async fn create_missing_remote_dirs(
    store: &dyn RemoteStore,
    files: &mut SyncFiles,
    args: &mut UploadSyncArgs,
) -> Result<(), SyncError> {
    let mut missing_dirs = files.missing_remote_dirs();
    missing_dirs.sort_by_key(|lf| lf.rel_path.components().count());

    let count = missing_dirs.len();
    if count > 0 {
        writeln!(args.out, "\n{} remote directories are missing", count)?;
    }

    for (i, lf) in missing_dirs.iter().enumerate() {
        let parent_path = parent_file_path(&lf.rel_path);
        let parent = files.find_remote(&parent_path).cloned().ok_or_else(|| {
            SyncError::Validation(format!(
                "could not find remote directory with path '{}'",
                parent_path.display()
            ))
        })?;

        writeln!(
            args.out,
            "[{:04}/{:04}] Creating directory {}",
            i + 1,
            count,
            Path::new(&files.root().name).join(&lf.rel_path).display()
        )?;

        let meta = create_missing_remote_dir(store, args, lf.name(), &parent.id).await?;
        files.add_remote(RemoteFile::from_meta(&meta, lf.rel_path.clone()));
    }

    Ok(())
}

async fn create_missing_remote_dir(
    store: &dyn RemoteStore,
    args: &UploadSyncArgs,
    name: &str,
    parent_id: &FileId,
) -> Result<FileMeta, SyncError> {
    let file = NewFile {
        name: name.to_string(),
        mime_type: Some(FOLDER_MIME_TYPE.to_string()),
        parents: vec![parent_id.clone()],
        app_properties: sync_markers(&args.root_id),
    };

    if args.dry_run {
        return Ok(synthetic_dir(file));
    }

    with_retry("create directory", || {
        let file = file.clone();
        async move { store.create_file(file, None).await.map_err(SyncError::from) }
    })
    .await
}

/// Stand-in record for a directory a dry run would have created, so path
/// lookups for its children still succeed.
fn synthetic_dir(file: NewFile) -> FileMeta {
    FileMeta {
        id: FileId::new(format!("dry-run-{}", Uuid::new_v4())),
        name: file.name,
        mime_type: FOLDER_MIME_TYPE.to_string(),
        parents: file.parents,
        size: 0,
        modified: chrono::Utc::now(),
        md5: None,
        app_properties: file.app_properties,
    }
}

/// Uploads every local file without a remote counterpart.
async fn upload_missing_files(
    store: &dyn RemoteStore,
    missing: &[LocalFile],
    files: &SyncFiles,
    args: &mut UploadSyncArgs,
) -> Result<(), SyncError> {
    let count = missing.len();
    if count > 0 {
        writeln!(args.out, "\n{} remote files are missing", count)?;
    }

    for (i, lf) in missing.iter().enumerate() {
        let parent_path = parent_file_path(&lf.rel_path);
        let parent = files.find_remote(&parent_path).ok_or_else(|| {
            SyncError::Validation(format!(
                "could not find remote directory with path '{}'",
                parent_path.display()
            ))
        })?;

        writeln!(
            args.out,
            "[{:04}/{:04}] Uploading {} -> {}",
            i + 1,
            count,
            lf.rel_path.display(),
            Path::new(&files.root().name).join(&lf.rel_path).display()
        )?;

        upload_missing_file(store, &parent.id, lf, args).await?;
    }

    Ok(())
}

async fn upload_missing_file(
    store: &dyn RemoteStore,
    parent_id: &FileId,
    lf: &LocalFile,
    args: &UploadSyncArgs,
) -> Result<(), SyncError> {
    if args.dry_run {
        return Ok(());
    }

    with_retry("upload file", || async {
        let src = tokio::fs::File::open(&lf.abs_path).await?;
        let reader = with_progress(src, args.progress.clone(), lf.size);
        let (reader, context) = with_timeout(reader, args.timeout);

        let file = NewFile {
            name: lf.name().to_string(),
            mime_type: None,
            parents: vec![parent_id.clone()],
            app_properties: sync_markers(&args.root_id),
        };
        let media = Media {
            reader,
            size: lf.size,
            chunk_size: args.chunk_size,
            context,
        };

        match store.create_file(file, Some(media)).await {
            Ok(_) => Ok(()),
            Err(RemoteError::Cancelled) => Err(SyncError::Timeout {
                timeout: args.timeout,
            }),
            Err(err) => Err(SyncError::from(err)),
        }
    })
    .await
}

/// Re-uploads every changed file the conflict policy lets through.
async fn update_changed_files(
    store: &dyn RemoteStore,
    changed: &[ChangedFile],
    args: &mut UploadSyncArgs,
) -> Result<(), SyncError> {
    let count = changed.len();
    if count > 0 {
        writeln!(args.out, "\n{} local files have changed", count)?;
    }

    for (i, cf) in changed.iter().enumerate() {
        if let Verdict::Skip(reason) = check_remote_conflict(cf, args.resolution) {
            writeln!(
                args.out,
                "[{:04}/{:04}] Skipping {} ({})",
                i + 1,
                count,
                cf.local.rel_path.display(),
                reason
            )?;
            continue;
        }

        writeln!(
            args.out,
            "[{:04}/{:04}] Updating {}",
            i + 1,
            count,
            cf.local.rel_path.display()
        )?;

        update_changed_file(store, cf, args).await?;
    }

    Ok(())
}

async fn update_changed_file(
    store: &dyn RemoteStore,
    cf: &ChangedFile,
    args: &UploadSyncArgs,
) -> Result<(), SyncError> {
    if args.dry_run {
        return Ok(());
    }

    with_retry("update file", || async {
        let src = tokio::fs::File::open(&cf.local.abs_path).await?;
        let reader = with_progress(src, args.progress.clone(), cf.local.size);
        let (reader, context) = with_timeout(reader, args.timeout);

        let media = Media {
            reader,
            size: cf.local.size,
            chunk_size: args.chunk_size,
            context,
        };

        match store
            .update_file(&cf.remote.id, FilePatch::default(), Some(media))
            .await
        {
            Ok(_) => Ok(()),
            Err(RemoteError::Cancelled) => Err(SyncError::Timeout {
                timeout: args.timeout,
            }),
            Err(err) => Err(SyncError::from(err)),
        }
    })
    .await
}

/// Deletes remote entries with no local counterpart, longest paths first so
/// every directory is empty by the time it is removed.
async fn delete_extraneous_remote_files(
    store: &dyn RemoteStore,
    files: &SyncFiles,
    args: &mut UploadSyncArgs,
) -> Result<(), SyncError> {
    let mut extraneous = files.extraneous_remote_files();
    extraneous.sort_by_key(|rf| std::cmp::Reverse(rf.rel_path.components().count()));

    let count = extraneous.len();
    if count > 0 {
        writeln!(args.out, "\n{} remote files are extraneous", count)?;
    }

    for (i, rf) in extraneous.iter().enumerate() {
        writeln!(
            args.out,
            "[{:04}/{:04}] Deleting {}",
            i + 1,
            count,
            Path::new(&files.root().name).join(&rf.rel_path).display()
        )?;

        if args.dry_run {
            continue;
        }

        with_retry("delete file", || async {
            store.delete_file(&rf.id).await.map_err(SyncError::from)
        })
        .await?;
    }

    Ok(())
}
