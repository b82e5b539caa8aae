//! Error taxonomy for the sync engine.
//!
//! Every failure the engine can surface belongs to one of these kinds. The
//! retry harness uses [`SyncError::is_retryable`] to decide whether to back
//! off and try again; everything not explicitly transient aborts the sync
//! cycle immediately.

use std::time::Duration;

use thiserror::Error;

use crate::ports::remote_store::RemoteError;

/// Errors surfaced by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad input from the caller: missing local path, non-directory root,
    /// non-empty unmarked root.
    #[error("{0}")]
    Validation(String),

    /// The remote scan violated a structural invariant (orphaned parent,
    /// duplicate name under one parent, unreachable record).
    #[error("{0}")]
    Precondition(String),

    /// The abort policy found files whose remote copy is newer.
    #[error("conflict detected!\n{report}")]
    Conflict {
        /// Tabulated description of the conflicting files.
        report: String,
    },

    /// Not enough free space on the remote side.
    #[error("not enough free space, have {available} bytes, need {needed} bytes")]
    Quota { needed: u64, available: u64 },

    /// No bytes traversed a transfer for the configured idle window. The
    /// connection is considered stuck; the operation is not retried.
    #[error("timeout, no data was transferred for {}s", timeout.as_secs())]
    Timeout { timeout: Duration },

    /// Error reported by the remote store.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Local filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether the retry harness may re-attempt the failed operation.
    ///
    /// Only transient remote failures qualify. An idle timeout indicates a
    /// stuck connection that was deliberately cancelled and is never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            _ => false,
        }
    }
}
