//! Conflict policies, encoded as a decision table.
//!
//! A changed file is only a *conflict* when the side about to be overwritten
//! is the newer one: the remote side during upload sync, the local side
//! during download sync. Each policy's verdicts live in a data table rather
//! than branching code, so new policies compose without touching the
//! drivers. Any state the table does not cover is skipped, which is the
//! non-destructive default.

use gdrive_core::domain::{ChangedFile, ModTimeOrder, SizeOrder, SyncError};

use crate::format::{format_datetime, format_size, truncate_string};

/// How a changed file whose counterpart is newer should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictResolution {
    /// Fail the whole sync when any conflict exists.
    #[default]
    Abort,
    KeepLocal,
    KeepRemote,
    KeepLargest,
}

/// Per-file outcome of consulting the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Overwrite the other side.
    Proceed,
    /// Leave both sides untouched, with the reason reported to the user.
    Skip(&'static str),
}

/// One row of the decision table. `size: None` matches any size ordering.
struct Rule {
    resolution: ConflictResolution,
    size: Option<SizeOrder>,
    verdict: Verdict,
}

/// Verdicts for upload sync, consulted only when the remote copy is newer.
const UPLOAD_RULES: &[Rule] = &[
    Rule {
        resolution: ConflictResolution::KeepLocal,
        size: None,
        verdict: Verdict::Proceed,
    },
    Rule {
        resolution: ConflictResolution::KeepRemote,
        size: None,
        verdict: Verdict::Skip("conflicting file, keeping remote file"),
    },
    Rule {
        resolution: ConflictResolution::KeepLargest,
        size: Some(SizeOrder::RemoteLarger),
        verdict: Verdict::Skip("conflicting file, remote file is largest, keeping remote"),
    },
    Rule {
        resolution: ConflictResolution::KeepLargest,
        size: Some(SizeOrder::LocalLarger),
        verdict: Verdict::Proceed,
    },
    Rule {
        resolution: ConflictResolution::KeepLargest,
        size: Some(SizeOrder::Equal),
        verdict: Verdict::Skip("conflicting file, file sizes are equal, keeping remote"),
    },
];

/// Verdicts for download sync, consulted only when the local copy is newer.
const DOWNLOAD_RULES: &[Rule] = &[
    Rule {
        resolution: ConflictResolution::KeepRemote,
        size: None,
        verdict: Verdict::Proceed,
    },
    Rule {
        resolution: ConflictResolution::KeepLocal,
        size: None,
        verdict: Verdict::Skip("conflicting file, keeping local file"),
    },
    Rule {
        resolution: ConflictResolution::KeepLargest,
        size: Some(SizeOrder::LocalLarger),
        verdict: Verdict::Skip("conflicting file, local file is largest, keeping local"),
    },
    Rule {
        resolution: ConflictResolution::KeepLargest,
        size: Some(SizeOrder::RemoteLarger),
        verdict: Verdict::Proceed,
    },
    Rule {
        resolution: ConflictResolution::KeepLargest,
        size: Some(SizeOrder::Equal),
        verdict: Verdict::Skip("conflicting file, file sizes are equal, keeping local"),
    },
];

fn decide(rules: &[Rule], resolution: ConflictResolution, size: SizeOrder) -> Verdict {
    for rule in rules {
        if rule.resolution == resolution && rule.size.map_or(true, |s| s == size) {
            return rule.verdict;
        }
    }
    Verdict::Skip("conflicting file, unhandled case")
}

/// Upload-sync verdict for one changed file. A file whose remote copy is not
/// strictly newer is never a conflict and always proceeds.
pub fn check_remote_conflict(cf: &ChangedFile, resolution: ConflictResolution) -> Verdict {
    if cf.mod_time_order() != ModTimeOrder::RemoteNewer {
        return Verdict::Proceed;
    }
    decide(UPLOAD_RULES, resolution, cf.size_order())
}

/// Download-sync verdict for one changed file: the table above with the
/// sides swapped.
pub fn check_local_conflict(cf: &ChangedFile, resolution: ConflictResolution) -> Verdict {
    if cf.mod_time_order() != ModTimeOrder::LocalNewer {
        return Verdict::Proceed;
    }
    decide(DOWNLOAD_RULES, resolution, cf.size_order())
}

/// Pre-check for the abort policy on upload sync: fails when any changed
/// file's remote copy is newer, reporting every such file.
pub fn ensure_no_remote_modifications(files: &[ChangedFile]) -> Result<(), SyncError> {
    let conflicts: Vec<&ChangedFile> = files
        .iter()
        .filter(|cf| cf.mod_time_order() == ModTimeOrder::RemoteNewer)
        .collect();

    if conflicts.is_empty() {
        return Ok(());
    }

    let mut report = String::from(
        "the following files have changed and the remote file is newer than its local counterpart:\n\n",
    );
    report.push_str(&format_conflicts(&conflicts));
    report.push_str("\nno conflict resolution was given, aborting...");
    Err(SyncError::Conflict { report })
}

/// Pre-check for the abort policy on download sync.
pub fn ensure_no_local_modifications(files: &[ChangedFile]) -> Result<(), SyncError> {
    let conflicts: Vec<&ChangedFile> = files
        .iter()
        .filter(|cf| cf.mod_time_order() == ModTimeOrder::LocalNewer)
        .collect();

    if conflicts.is_empty() {
        return Ok(());
    }

    let mut report = String::from(
        "the following files have changed and the local file is newer than its remote counterpart:\n\n",
    );
    report.push_str(&format_conflicts(&conflicts));
    report.push_str("\nno conflict resolution was given, aborting...");
    Err(SyncError::Conflict { report })
}

/// Tabulates the conflicting files: path, both sizes, both mtimes.
fn format_conflicts(conflicts: &[&ChangedFile]) -> String {
    let mut out = format!(
        "{:<60} {:>12} {:>12}   {:<19}   {:<19}\n",
        "Path", "Size Local", "Size Remote", "Modified Local", "Modified Remote"
    );
    for cf in conflicts {
        out.push_str(&format!(
            "{:<60} {:>12} {:>12}   {:<19}   {:<19}\n",
            truncate_string(&cf.local.rel_path.to_string_lossy(), 60),
            format_size(cf.local.size, false),
            format_size(cf.remote.size, false),
            format_datetime(&cf.local.modified),
            format_datetime(&cf.remote.modified),
        ));
    }
    out
}
