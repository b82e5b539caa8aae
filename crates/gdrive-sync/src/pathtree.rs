//! Relative-path reconstruction from a flat bag of remote records.
//!
//! The remote scan returns records in no particular order, linked only by
//! parent ids. Each record is assigned a dense integer index (root at 0) and
//! a parent-pointer array is built over those indexes; walking the pointers
//! to the root yields each record's path segments in reverse. The dense form
//! directly supports the two structural checks the scan needs: every
//! non-root record has a mapped parent, and every record reaches index 0.

use std::collections::HashMap;
use std::path::PathBuf;

use gdrive_core::domain::{FileId, SyncError};
use gdrive_core::ports::remote_store::FileMeta;

/// Maps every record to its path relative to `root`. The root itself is not
/// included in the result.
///
/// Fails with a precondition error when a record's parent is absent from the
/// set or when a record does not transitively reach the root.
pub fn build_rel_paths(
    root: &FileMeta,
    files: &[FileMeta],
) -> Result<HashMap<FileId, PathBuf>, SyncError> {
    // Dense index over root + files, root at 0.
    let mut index_of: HashMap<&FileId, usize> = HashMap::with_capacity(files.len() + 1);
    index_of.insert(&root.id, 0);
    for (i, f) in files.iter().enumerate() {
        index_of.insert(&f.id, i + 1);
    }

    // Parent pointers; the root points at itself and terminates walks.
    let mut parent_of = vec![0usize; files.len() + 1];
    let mut name_of: Vec<&str> = vec![""; files.len() + 1];

    for (i, f) in files.iter().enumerate() {
        let parent_id = f.parents.first().ok_or_else(|| {
            SyncError::Precondition(format!("file {} does not have exactly one parent", f.id))
        })?;
        let parent_idx = index_of.get(parent_id).ok_or_else(|| {
            SyncError::Precondition(format!("could not find parent of {} ({})", f.id, f.name))
        })?;
        parent_of[i + 1] = *parent_idx;
        name_of[i + 1] = &f.name;
    }

    let mut paths = HashMap::with_capacity(files.len());

    for (i, f) in files.iter().enumerate() {
        let mut segments: Vec<&str> = Vec::new();
        let mut cursor = i + 1;
        let mut steps = 0;

        while cursor != 0 {
            segments.push(name_of[cursor]);
            cursor = parent_of[cursor];
            steps += 1;
            if steps > files.len() {
                return Err(SyncError::Precondition(format!(
                    "file {} ({}) does not reach the sync root",
                    f.id, f.name
                )));
            }
        }

        let mut path = PathBuf::new();
        for segment in segments.iter().rev() {
            path.push(segment);
        }
        paths.insert(f.id.clone(), path);
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gdrive_core::ports::remote_store::FOLDER_MIME_TYPE;

    fn record(id: &str, name: &str, parent: Option<&str>) -> FileMeta {
        FileMeta {
            id: FileId::from(id),
            name: name.to_string(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            parents: parent.map(|p| vec![FileId::from(p)]).unwrap_or_default(),
            size: 0,
            modified: Utc::now(),
            md5: None,
            app_properties: Default::default(),
        }
    }

    #[test]
    fn test_single_level() {
        let root = record("root", "Sync", None);
        let files = vec![record("a", "a.txt", Some("root"))];

        let paths = build_rel_paths(&root, &files).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[&FileId::from("a")], PathBuf::from("a.txt"));
    }

    #[test]
    fn test_nested_paths_join_parent_and_name() {
        let root = record("root", "Sync", None);
        let files = vec![
            record("d1", "docs", Some("root")),
            record("d2", "2024", Some("d1")),
            record("f1", "report.pdf", Some("d2")),
            record("f2", "readme.txt", Some("root")),
        ];

        let paths = build_rel_paths(&root, &files).unwrap();
        assert_eq!(paths[&FileId::from("d1")], PathBuf::from("docs"));
        assert_eq!(paths[&FileId::from("d2")], PathBuf::from("docs/2024"));
        assert_eq!(
            paths[&FileId::from("f1")],
            PathBuf::from("docs/2024/report.pdf")
        );
        assert_eq!(paths[&FileId::from("f2")], PathBuf::from("readme.txt"));

        // relPath(child) == join(relPath(parent), child.name) for every
        // non-root record.
        for f in &files {
            let parent = f.parents.first().unwrap();
            let expected_parent = if parent == &FileId::from("root") {
                PathBuf::new()
            } else {
                paths[parent].clone()
            };
            assert_eq!(paths[&f.id], expected_parent.join(&f.name));
        }
    }

    #[test]
    fn test_root_is_excluded_from_result() {
        let root = record("root", "Sync", None);
        let files = vec![record("a", "a.txt", Some("root"))];
        let paths = build_rel_paths(&root, &files).unwrap();
        assert!(!paths.contains_key(&FileId::from("root")));
    }

    #[test]
    fn test_orphan_parent_is_a_precondition_error() {
        let root = record("root", "Sync", None);
        let files = vec![record("a", "a.txt", Some("ghost"))];

        let err = build_rel_paths(&root, &files).unwrap_err();
        assert!(matches!(err, SyncError::Precondition(_)));
        assert!(err.to_string().contains("a"));
    }

    #[test]
    fn test_record_without_parent_is_a_precondition_error() {
        let root = record("root", "Sync", None);
        let files = vec![record("a", "a.txt", None)];

        let err = build_rel_paths(&root, &files).unwrap_err();
        assert!(matches!(err, SyncError::Precondition(_)));
    }

    #[test]
    fn test_cycle_never_reaches_root() {
        let root = record("root", "Sync", None);
        // a and b point at each other; both parents resolve, but neither
        // walk terminates at the root.
        let files = vec![record("a", "a", Some("b")), record("b", "b", Some("a"))];

        let err = build_rel_paths(&root, &files).unwrap_err();
        assert!(matches!(err, SyncError::Precondition(_)));
        assert!(err.to_string().contains("does not reach the sync root"));
    }

    #[test]
    fn test_empty_input() {
        let root = record("root", "Sync", None);
        let paths = build_rel_paths(&root, &[]).unwrap();
        assert!(paths.is_empty());
    }
}
