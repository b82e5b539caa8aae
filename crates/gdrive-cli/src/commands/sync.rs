//! Sync commands: upload, download and list.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};

use gdrive_core::config::{cache_file_path, DEFAULT_TIMEOUT_SECS, DEFAULT_UPLOAD_CHUNK_SIZE};
use gdrive_core::domain::FileId;
use gdrive_sync::compare::CachedMd5Comparer;
use gdrive_sync::conflict::ConflictResolution;
use gdrive_sync::download::{download_sync, DownloadSyncArgs};
use gdrive_sync::list::{sync_content, sync_roots};
use gdrive_sync::progress::ProgressSink;
use gdrive_sync::upload::{upload_sync, UploadSyncArgs};

use crate::commands::connect;
use crate::output::{print_sync_content, print_sync_roots};

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Mirror a local directory to a remote sync root
    Upload(UploadArgs),
    /// Mirror a remote sync root to a local directory
    Download(DownloadArgs),
    /// List sync roots, or the content of one root
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Local directory to mirror
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Id of the remote sync root directory
    #[arg(long = "root-id", alias = "rootId")]
    pub root_id: String,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Delete remote files that no longer exist locally
    #[arg(long)]
    pub delete_extraneous: bool,

    /// Upload chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_UPLOAD_CHUNK_SIZE)]
    pub chunksize: u64,

    /// Idle timeout in seconds for transfers (0 disables)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// On conflict, keep the local file
    #[arg(long, conflicts_with_all = ["keep_remote", "keep_largest"])]
    pub keep_local: bool,

    /// On conflict, keep the remote file
    #[arg(long, conflicts_with = "keep_largest")]
    pub keep_remote: bool,

    /// On conflict, keep the largest file
    #[arg(long)]
    pub keep_largest: bool,

    /// Disable transfer progress reporting
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Local destination directory
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Id of the remote sync root directory
    #[arg(long = "root-id", alias = "rootId")]
    pub root_id: String,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Delete local files that no longer exist remotely
    #[arg(long)]
    pub delete_extraneous: bool,

    /// Idle timeout in seconds for transfers (0 disables)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// On conflict, keep the local file
    #[arg(long, conflicts_with_all = ["keep_remote", "keep_largest"])]
    pub keep_local: bool,

    /// On conflict, keep the remote file
    #[arg(long, conflicts_with = "keep_largest")]
    pub keep_remote: bool,

    /// On conflict, keep the largest file
    #[arg(long)]
    pub keep_largest: bool,

    /// Disable transfer progress reporting
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Sync root to list the content of; omit to list all sync roots
    pub id: Option<String>,

    /// Print sizes in plain bytes
    #[arg(long)]
    pub size_in_bytes: bool,
}

fn resolution(keep_local: bool, keep_remote: bool, keep_largest: bool) -> ConflictResolution {
    if keep_local {
        ConflictResolution::KeepLocal
    } else if keep_remote {
        ConflictResolution::KeepRemote
    } else if keep_largest {
        ConflictResolution::KeepLargest
    } else {
        ConflictResolution::Abort
    }
}

fn progress_sink(no_progress: bool) -> Option<ProgressSink> {
    if no_progress {
        None
    } else {
        let sink: ProgressSink = Arc::new(Mutex::new(std::io::stderr()));
        Some(sink)
    }
}

impl SyncCommand {
    pub async fn execute(self) -> Result<()> {
        let store = connect()?;

        match self {
            SyncCommand::Upload(args) => {
                upload_sync(
                    &store,
                    UploadSyncArgs {
                        out: Box::new(std::io::stdout()),
                        progress: progress_sink(args.no_progress),
                        path: args.path,
                        root_id: FileId::new(args.root_id),
                        dry_run: args.dry_run,
                        delete_extraneous: args.delete_extraneous,
                        chunk_size: args.chunksize,
                        timeout: Duration::from_secs(args.timeout),
                        resolution: resolution(
                            args.keep_local,
                            args.keep_remote,
                            args.keep_largest,
                        ),
                        comparer: Box::new(CachedMd5Comparer::new(cache_file_path())),
                    },
                )
                .await?;
            }
            SyncCommand::Download(args) => {
                download_sync(
                    &store,
                    DownloadSyncArgs {
                        out: Box::new(std::io::stdout()),
                        progress: progress_sink(args.no_progress),
                        path: args.path,
                        root_id: FileId::new(args.root_id),
                        dry_run: args.dry_run,
                        delete_extraneous: args.delete_extraneous,
                        timeout: Duration::from_secs(args.timeout),
                        resolution: resolution(
                            args.keep_local,
                            args.keep_remote,
                            args.keep_largest,
                        ),
                        comparer: Box::new(CachedMd5Comparer::new(cache_file_path())),
                    },
                )
                .await?;
            }
            SyncCommand::List(args) => {
                let mut out = std::io::stdout();
                match args.id {
                    None => {
                        let roots = sync_roots(&store).await?;
                        print_sync_roots(&mut out, &roots)?;
                    }
                    Some(id) => {
                        let (_, files) = sync_content(&store, &FileId::new(id)).await?;
                        print_sync_content(&mut out, &files, args.size_in_bytes)?;
                    }
                }
                out.flush()?;
            }
        }

        Ok(())
    }
}
