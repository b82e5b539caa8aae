//! Download sync: mirror a remote sync root into a local directory tree.
//!
//! The upload driver with the sides swapped: the root must already carry the
//! `syncRoot` marker, missing local directories are created parents-first,
//! missing files are downloaded, changed files are overwritten under the
//! mirrored conflict table, and extraneous local entries are optionally
//! deleted children-first.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::info;

use gdrive_core::domain::files::PROP_SYNC_ROOT;
use gdrive_core::domain::{ChangedFile, FileId, RemoteFile, SyncError};
use gdrive_core::ports::remote_store::{FileMeta, RemoteError, RemoteStore};

use crate::classify::SyncFiles;
use crate::compare::FileComparer;
use crate::conflict::{check_local_conflict, ensure_no_local_modifications, ConflictResolution, Verdict};
use crate::progress::{with_progress, ProgressSink};
use crate::retry::with_retry;
use crate::scan::{prepare_local_files, prepare_remote_files};
use crate::timeout::wrap_with;

/// Options for one download-sync cycle.
pub struct DownloadSyncArgs {
    /// Status lines are written here.
    pub out: Box<dyn Write + Send>,
    /// Progress sink for transfers; `None` disables reporting.
    pub progress: Option<ProgressSink>,
    /// Local destination directory; created when absent.
    pub path: PathBuf,
    /// Id of the remote sync root.
    pub root_id: FileId,
    /// Print the plan without touching the local side.
    pub dry_run: bool,
    /// Delete local entries that no longer exist remotely.
    pub delete_extraneous: bool,
    /// Idle timeout for transfers; zero disables the watchdog.
    pub timeout: Duration,
    /// Conflict policy for changed files.
    pub resolution: ConflictResolution,
    /// Content comparison strategy.
    pub comparer: Box<dyn FileComparer>,
}

/// Runs one download-sync cycle.
pub async fn download_sync(
    store: &dyn RemoteStore,
    mut args: DownloadSyncArgs,
) -> Result<(), SyncError> {
    writeln!(args.out, "Starting sync...")?;
    let started = Instant::now();

    let root = get_sync_root(store, &args.root_id).await?;

    // The destination may not exist on a first download.
    if !args.path.exists() {
        std::fs::create_dir_all(&args.path)?;
    }

    writeln!(args.out, "Collecting local and remote file information...")?;
    let files = prepare_sync_files(store, &args.path, &root).await?;

    let changed = files.changed_remote_files(args.comparer.as_ref())?;
    let missing = files.missing_local_files();

    writeln!(
        args.out,
        "Found {} local files and {} remote files",
        files.local_len(),
        files.remote_len()
    )?;

    if args.resolution == ConflictResolution::Abort {
        ensure_no_local_modifications(&changed)?;
    }

    create_missing_local_dirs(&files, &mut args)?;
    download_missing_files(store, &missing, &mut args).await?;
    update_changed_local_files(store, &changed, &mut args).await?;

    if args.delete_extraneous {
        delete_extraneous_local_files(&files, &mut args)?;
    }

    writeln!(args.out, "Sync finished in {:.1?}", started.elapsed())?;
    info!(
        local = files.local_len(),
        remote = files.remote_len(),
        changed = changed.len(),
        downloaded = missing.len(),
        dry_run = args.dry_run,
        "download sync complete"
    );
    Ok(())
}

/// Fetches a directory that must already be a sync root.
pub async fn get_sync_root(
    store: &dyn RemoteStore,
    root_id: &FileId,
) -> Result<FileMeta, SyncError> {
    let file = store.get_file(root_id).await.map_err(|err| match err {
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

    if !file.app_properties.contains_key(PROP_SYNC_ROOT) {
        return Err(SyncError::Validation(
            "provided directory is not a sync root".to_string(),
        ));
    }

    Ok(file)
}

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

/// Creates missing local directories, shortest paths first.
fn create_missing_local_dirs(files: &SyncFiles, args: &mut DownloadSyncArgs) -> Result<(), SyncError> {
    let mut missing_dirs = files.missing_local_dirs();
    missing_dirs.sort_by_key(|rf| rf.rel_path.components().count());

    let count = missing_dirs.len();
    if count > 0 {
        writeln!(args.out, "\n{} local directories are missing", count)?;
    }

    for (i, rf) in missing_dirs.iter().enumerate() {
        let abs_path = args.path.join(&rf.rel_path);
        writeln!(
            args.out,
            "[{:04}/{:04}] Creating directory {}",
            i + 1,
            count,
            abs_path.display()
        )?;

        if args.dry_run {
            continue;
        }
        std::fs::create_dir_all(&abs_path)?;
    }

    Ok(())
}

/// Downloads every remote file without a local counterpart.
async fn download_missing_files(
    store: &dyn RemoteStore,
    missing: &[RemoteFile],
    args: &mut DownloadSyncArgs,
) -> Result<(), SyncError> {
    let count = missing.len();
    if count > 0 {
        writeln!(args.out, "\n{} local files are missing", count)?;
    }

    for (i, rf) in missing.iter().enumerate() {
        let abs_path = args.path.join(&rf.rel_path);
        writeln!(
            args.out,
            "[{:04}/{:04}] Downloading {} -> {}",
            i + 1,
            count,
            rf.rel_path.display(),
            abs_path.display()
        )?;

        download_remote_file(store, rf, &abs_path, args).await?;
    }

    Ok(())
}

/// Overwrites every changed local file the conflict policy lets through.
async fn update_changed_local_files(
    store: &dyn RemoteStore,
    changed: &[ChangedFile],
    args: &mut DownloadSyncArgs,
) -> Result<(), SyncError> {
    let count = changed.len();
    if count > 0 {
        writeln!(args.out, "\n{} remote files have changed", count)?;
    }

    for (i, cf) in changed.iter().enumerate() {
        if let Verdict::Skip(reason) = check_local_conflict(cf, args.resolution) {
            writeln!(
                args.out,
                "[{:04}/{:04}] Skipping {} ({})",
                i + 1,
                count,
                cf.remote.rel_path.display(),
                reason
            )?;
            continue;
        }

        writeln!(
            args.out,
            "[{:04}/{:04}] Updating {}",
            i + 1,
            count,
            cf.remote.rel_path.display()
        )?;

        download_remote_file(store, &cf.remote, &cf.local.abs_path, args).await?;
    }

    Ok(())
}

/// Streams one remote file to `dest`, under the idle watchdog. The
/// cancellation context is created before the request so the transfer is
/// interrupted at the transport layer.
async fn download_remote_file(
    store: &dyn RemoteStore,
    rf: &RemoteFile,
    dest: &Path,
    args: &DownloadSyncArgs,
) -> Result<(), SyncError> {
    if args.dry_run {
        return Ok(());
    }

    with_retry("download file", || async {
        let context = CancellationToken::new();
        let stream = store.download_file(&rf.id, context.clone()).await?;
        let stream = wrap_with(stream, context.clone(), args.timeout);
        let mut reader = with_progress(stream, args.progress.clone(), rf.size);

        let mut dest_file = tokio::fs::File::create(dest).await?;

        tokio::select! {
            result = tokio::io::copy(&mut reader, &mut dest_file) => {
                result?;
                Ok(())
            }
            _ = context.cancelled() => Err(SyncError::Timeout {
                timeout: args.timeout,
            }),
        }
    })
    .await
}

/// Deletes local entries with no remote counterpart, longest paths first.
fn delete_extraneous_local_files(
    files: &SyncFiles,
    args: &mut DownloadSyncArgs,
) -> Result<(), SyncError> {
    let mut extraneous = files.extraneous_local_files();
    extraneous.sort_by_key(|lf| std::cmp::Reverse(lf.rel_path.components().count()));

    let count = extraneous.len();
    if count > 0 {
        writeln!(args.out, "\n{} local files are extraneous", count)?;
    }

    for (i, lf) in extraneous.iter().enumerate() {
        writeln!(
            args.out,
            "[{:04}/{:04}] Deleting {}",
            i + 1,
            count,
            lf.abs_path.display()
        )?;

        if args.dry_run {
            continue;
        }

        if lf.is_dir {
            std::fs::remove_dir(&lf.abs_path)?;
        } else {
            std::fs::remove_file(&lf.abs_path)?;
        }
    }

    Ok(())
}
