//! Six-way classification of the local and remote scans.
//!
//! [`SyncFiles`] holds both snapshots plus by-path indexes and derives the
//! disjoint sets the drivers act on: directories/files missing on either
//! side, files changed on both sides, and entries extraneous to one side.
//! Newly created remote directories are appended through [`SyncFiles::add_remote`]
//! so later parent lookups find them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gdrive_core::domain::files::ROOT_REL_PATH;
use gdrive_core::domain::{ChangedFile, LocalFile, RemoteFile, SyncError};

use crate::compare::FileComparer;

/// The two scans of one sync cycle, indexed by relative path.
#[derive(Debug)]
pub struct SyncFiles {
    root: RemoteFile,
    local: Vec<LocalFile>,
    remote: Vec<RemoteFile>,
    local_index: HashMap<PathBuf, usize>,
    remote_index: HashMap<PathBuf, usize>,
}

impl SyncFiles {
    pub fn new(root: RemoteFile, local: Vec<LocalFile>, remote: Vec<RemoteFile>) -> Self {
        let local_index = local
            .iter()
            .enumerate()
            .map(|(i, f)| (f.rel_path.clone(), i))
            .collect();
        let remote_index = remote
            .iter()
            .enumerate()
            .map(|(i, f)| (f.rel_path.clone(), i))
            .collect();
        Self {
            root,
            local,
            remote,
            local_index,
            remote_index,
        }
    }

    pub fn root(&self) -> &RemoteFile {
        &self.root
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    pub fn remote_len(&self) -> usize {
        self.remote.len()
    }

    /// Looks up a remote entry by relative path; `"."` resolves to the root.
    pub fn find_remote(&self, rel_path: &Path) -> Option<&RemoteFile> {
        if rel_path == Path::new(ROOT_REL_PATH) {
            return Some(&self.root);
        }
        self.remote_index.get(rel_path).map(|&i| &self.remote[i])
    }

    pub fn find_local(&self, rel_path: &Path) -> Option<&LocalFile> {
        self.local_index.get(rel_path).map(|&i| &self.local[i])
    }

    /// Appends a newly created remote entry so subsequent lookups find it.
    pub fn add_remote(&mut self, file: RemoteFile) {
        self.remote_index
            .insert(file.rel_path.clone(), self.remote.len());
        self.remote.push(file);
    }

    /// Local directories with no remote counterpart.
    pub fn missing_remote_dirs(&self) -> Vec<LocalFile> {
        self.local
            .iter()
            .filter(|lf| lf.is_dir && self.find_remote(&lf.rel_path).is_none())
            .cloned()
            .collect()
    }

    /// Remote directories with no local counterpart.
    pub fn missing_local_dirs(&self) -> Vec<RemoteFile> {
        self.remote
            .iter()
            .filter(|rf| rf.is_dir && self.find_local(&rf.rel_path).is_none())
            .cloned()
            .collect()
    }

    /// Local files with no remote counterpart.
    pub fn missing_remote_files(&self) -> Vec<LocalFile> {
        self.local
            .iter()
            .filter(|lf| !lf.is_dir && self.find_remote(&lf.rel_path).is_none())
            .cloned()
            .collect()
    }

    /// Remote files with no local counterpart.
    pub fn missing_local_files(&self) -> Vec<RemoteFile> {
        self.remote
            .iter()
            .filter(|rf| !rf.is_dir && self.find_local(&rf.rel_path).is_none())
            .cloned()
            .collect()
    }

    /// Files present on both sides whose contents differ, iterated from the
    /// local side (upload direction).
    pub fn changed_local_files(
        &self,
        compare: &dyn FileComparer,
    ) -> Result<Vec<ChangedFile>, SyncError> {
        let mut changed = Vec::new();
        for lf in &self.local {
            if lf.is_dir {
                continue;
            }
            let Some(rf) = self.find_remote(&lf.rel_path) else {
                continue;
            };
            if rf.is_dir {
                continue;
            }
            if compare.changed(lf, rf)? {
                changed.push(ChangedFile {
                    local: lf.clone(),
                    remote: rf.clone(),
                });
            }
        }
        Ok(changed)
    }

    /// Files present on both sides whose contents differ, iterated from the
    /// remote side (download direction).
    pub fn changed_remote_files(
        &self,
        compare: &dyn FileComparer,
    ) -> Result<Vec<ChangedFile>, SyncError> {
        let mut changed = Vec::new();
        for rf in &self.remote {
            if rf.is_dir {
                continue;
            }
            let Some(lf) = self.find_local(&rf.rel_path) else {
                continue;
            };
            if lf.is_dir {
                continue;
            }
            if compare.changed(lf, rf)? {
                changed.push(ChangedFile {
                    local: lf.clone(),
                    remote: rf.clone(),
                });
            }
        }
        Ok(changed)
    }

    /// Remote entries (files and directories) that do not exist locally.
    pub fn extraneous_remote_files(&self) -> Vec<RemoteFile> {
        self.remote
            .iter()
            .filter(|rf| self.find_local(&rf.rel_path).is_none())
            .cloned()
            .collect()
    }

    /// Local entries (files and directories) that do not exist remotely.
    pub fn extraneous_local_files(&self) -> Vec<LocalFile> {
        self.local
            .iter()
            .filter(|lf| self.find_remote(&lf.rel_path).is_none())
            .cloned()
            .collect()
    }
}
