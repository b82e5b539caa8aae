//! Table output for listing commands.

use std::io::Write;

use anyhow::Result;

use gdrive_core::domain::RemoteFile;
use gdrive_core::ports::remote_store::{Change, FileMeta};
use gdrive_sync::format::{format_datetime, format_size, truncate_string};

const NAME_WIDTH: usize = 40;
const PATH_WIDTH: usize = 60;

/// Lists every sync root.
pub fn print_sync_roots(out: &mut dyn Write, roots: &[FileMeta]) -> Result<()> {
    writeln!(out, "{:<30} {:<40} {:<19}", "Id", "Name", "Modified")?;
    for root in roots {
        writeln!(
            out,
            "{:<30} {:<40} {:<19}",
            root.id,
            truncate_string(&root.name, NAME_WIDTH),
            format_datetime(&root.modified),
        )?;
    }
    Ok(())
}

/// Lists the content of one sync root.
pub fn print_sync_content(
    out: &mut dyn Write,
    files: &[RemoteFile],
    size_in_bytes: bool,
) -> Result<()> {
    writeln!(
        out,
        "{:<30} {:<60} {:<5} {:>10} {:<19}",
        "Id", "Path", "Type", "Size", "Modified"
    )?;
    for file in files {
        writeln!(
            out,
            "{:<30} {:<60} {:<5} {:>10} {:<19}",
            file.id,
            truncate_string(&file.rel_path.to_string_lossy(), PATH_WIDTH),
            if file.is_dir { "dir" } else { "bin" },
            format_size(file.size, size_in_bytes),
            format_datetime(&file.modified),
        )?;
    }
    Ok(())
}

/// Lists change-log entries and the token to resume from.
pub fn print_changes(out: &mut dyn Write, changes: &[Change], resume: Option<&str>) -> Result<()> {
    if changes.is_empty() {
        writeln!(out, "No changes")?;
        return Ok(());
    }

    writeln!(out, "{:<30} {:<40} {:<7} {:<19}", "Id", "Name", "Action", "Time")?;
    for change in changes {
        let (name, action) = match (&change.file, change.removed) {
            (_, true) => (String::new(), "remove"),
            (Some(file), false) => (file.name.clone(), "update"),
            (None, false) => (String::new(), "update"),
        };
        writeln!(
            out,
            "{:<30} {:<40} {:<7} {:<19}",
            change.file_id,
            truncate_string(&name, NAME_WIDTH),
            action,
            format_datetime(&change.time),
        )?;
    }

    if let Some(token) = resume {
        writeln!(out, "\nToken: {token}")?;
    }
    Ok(())
}
