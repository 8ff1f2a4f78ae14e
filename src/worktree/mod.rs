//! worktree
//!
//! The working-tree adapter: the engine's only view of the checked-out
//! files.
//!
//! # Architecture
//!
//! The history engine never touches working files directly; it drives a
//! [`WorkTree`] implementation. [`FsWorkTree`] is the filesystem
//! implementation used in production and integration tests; unit tests
//! can substitute an in-memory one.
//!
//! The repository directory (`.R/`) is invisible to the adapter: it is
//! never removed, never hashed, never listed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::REPO_DIR_NAME;
use crate::core::types::Oid;
use crate::odb::{hash_object, ObjectKind, ObjectStore, OdbError, Tree};

/// Errors from working-tree synchronisation.
#[derive(Debug, Error)]
pub enum WorktreeError {
    /// Underlying filesystem failure.
    #[error("worktree i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Object database failure while materialising or hashing.
    #[error(transparent)]
    Odb(#[from] OdbError),

    /// A path escapes the working tree or names the repo directory.
    #[error("illegal worktree path: {0}")]
    IllegalPath(String),
}

/// The working-tree contract consumed by the history engine.
pub trait WorkTree {
    /// Replace the entire working copy with the given `path -> blob`
    /// map.
    fn checkout_entries(
        &mut self,
        odb: &ObjectStore,
        entries: &BTreeMap<String, Oid>,
    ) -> Result<(), WorktreeError>;

    /// Replace the working copy with a stored tree.
    fn checkout_tree(&mut self, odb: &ObjectStore, tree: &Oid) -> Result<(), WorktreeError> {
        let flat = Tree::flatten(odb, tree)?;
        self.checkout_entries(odb, &flat)
    }

    /// Materialise conflict-marker bytes at a path.
    fn write_conflict_markers(&mut self, path: &str, bytes: &[u8]) -> Result<(), WorktreeError>;

    /// Hash a working file's content into the object database and
    /// return its blob oid.
    fn hash_file(&mut self, odb: &ObjectStore, path: &str) -> Result<Oid, WorktreeError>;

    /// Remove one working file, pruning directories left empty.
    ///
    /// Removing a path that is already absent is a no-op, mirroring
    /// how staging treats a vanished file as a deletion.
    fn remove(&mut self, path: &str) -> Result<(), WorktreeError>;

    /// Hash every working file without storing anything, as a
    /// `path -> would-be blob oid` map.
    fn snapshot(&self) -> Result<BTreeMap<String, Oid>, WorktreeError>;
}

/// Filesystem-backed working tree rooted next to the repository
/// directory.
#[derive(Debug, Clone)]
pub struct FsWorkTree {
    root: PathBuf,
}

impl FsWorkTree {
    /// Open a working tree at the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The working tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, WorktreeError> {
        let illegal = path.is_empty()
            || path.starts_with('/')
            || path
                .split('/')
                .any(|c| c.is_empty() || c == "." || c == ".." || c == REPO_DIR_NAME);
        if illegal {
            return Err(WorktreeError::IllegalPath(path.to_string()));
        }
        Ok(self.root.join(path))
    }

    /// Remove every tracked-able file and empty directory, leaving the
    /// repository directory untouched.
    fn empty_working_copy(&self) -> Result<(), WorktreeError> {
        self.remove_dir_contents(&self.root, true)?;
        Ok(())
    }

    fn remove_dir_contents(&self, dir: &Path, is_root: bool) -> Result<(), WorktreeError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if is_root && entry.file_name() == REPO_DIR_NAME {
                continue;
            }
            if entry.file_type()?.is_dir() {
                self.remove_dir_contents(&path, false)?;
                // May be non-empty if it held the repo dir; only the
                // root can, so this remove is safe to attempt.
                let _ = fs::remove_dir(&path);
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn collect_files(
        &self,
        dir: &Path,
        prefix: &str,
        out: &mut BTreeMap<String, Oid>,
    ) -> Result<(), WorktreeError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if prefix.is_empty() && name == REPO_DIR_NAME {
                continue;
            }
            let rel = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            if entry.file_type()?.is_dir() {
                self.collect_files(&entry.path(), &rel, out)?;
            } else {
                let bytes = fs::read(entry.path())?;
                out.insert(rel, hash_object(ObjectKind::Blob, &bytes));
            }
        }
        Ok(())
    }
}

impl WorkTree for FsWorkTree {
    fn checkout_entries(
        &mut self,
        odb: &ObjectStore,
        entries: &BTreeMap<String, Oid>,
    ) -> Result<(), WorktreeError> {
        self.empty_working_copy()?;
        for (path, oid) in entries {
            let full = self.full_path(path)?;
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            let bytes = odb.get_blob(oid)?;
            fs::write(&full, bytes)?;
        }
        Ok(())
    }

    fn write_conflict_markers(&mut self, path: &str, bytes: &[u8]) -> Result<(), WorktreeError> {
        let full = self.full_path(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, bytes)?;
        Ok(())
    }

    fn hash_file(&mut self, odb: &ObjectStore, path: &str) -> Result<Oid, WorktreeError> {
        let full = self.full_path(path)?;
        let bytes = fs::read(&full)?;
        Ok(odb.put_blob(&bytes)?)
    }

    fn remove(&mut self, path: &str) -> Result<(), WorktreeError> {
        let full = self.full_path(path)?;
        match fs::remove_file(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        // Prune now-empty parent directories up to the root; the
        // remove_dir fails harmlessly on the first non-empty one.
        let mut dir = full.parent();
        while let Some(parent) = dir {
            if parent == self.root || fs::remove_dir(parent).is_err() {
                break;
            }
            dir = parent.parent();
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<BTreeMap<String, Oid>, WorktreeError> {
        let mut out = BTreeMap::new();
        if self.root.exists() {
            self.collect_files(&self.root, "", &mut out)?;
        }
        Ok(out)
    }
}
