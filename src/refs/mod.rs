//! refs
//!
//! The reference store: named pointers into the object database.
//!
//! # Architecture
//!
//! A ref is a text file whose location mirrors its name under the
//! repository directory. It holds either a 40-hex oid (`direct`) or a
//! line `ref: <name>` (`symbolic`). `HEAD` is normally symbolic,
//! pointing at the checked-out branch; the other root refs
//! (`MERGE_HEAD`, `ORIG_HEAD`, `CHERRY_PICK_HEAD`) are direct and
//! present only mid-operation.
//!
//! # CAS Semantics
//!
//! Every write goes through an exclusive `.lock` file (created with
//! `create_new`) followed by a rename onto the ref. [`RefStore::update_cas`]
//! additionally compares the current value against an expected one and
//! fails with [`RefError::CasFailed`] on mismatch, which callers surface
//! as a concurrent-update error. Updates addressed at a symbolic ref
//! are transparently applied to the terminal ref of the chain.
//!
//! # Example
//!
//! ```ignore
//! let refs = RefStore::new(paths.clone());
//! refs.set_symbolic(&RefName::head(), &RefName::branch("main")?)?;
//! refs.update(&RefName::head(), &commit_oid)?;   // writes refs/heads/main
//! assert_eq!(refs.resolve(&RefName::head())?, commit_oid);
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::RepoPaths;
use crate::core::types::{Oid, RefName, TypeError, ROOT_REFS};

/// Bound on symbolic chain length; longer chains are reported as cycles.
const MAX_SYMREF_DEPTH: usize = 10;

/// Errors from reference store operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The named ref does not exist.
    #[error("ref not found: {0}")]
    NotFound(RefName),

    /// Compare-and-set precondition failed: another actor updated the
    /// ref since it was read.
    #[error("concurrent update of {name}: expected {expected:?}, found {actual:?}")]
    CasFailed {
        name: RefName,
        expected: Option<Oid>,
        actual: Option<Oid>,
    },

    /// A symbolic chain exceeded the depth bound.
    #[error("symbolic ref cycle at {0}")]
    SymbolicCycle(RefName),

    /// Another writer holds the ref's lock file.
    #[error("ref {0} is locked by another writer")]
    Locked(RefName),

    /// The ref file content is neither an oid nor a symbolic pointer.
    #[error("ref {name} has malformed content: {content:?}")]
    Malformed { name: RefName, content: String },

    /// Name validation failed.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Underlying filesystem failure.
    #[error("ref store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The raw value of a ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    /// Points directly at an object.
    Direct(Oid),
    /// Points at another ref.
    Symbolic(RefName),
}

/// The reference store.
#[derive(Debug, Clone)]
pub struct RefStore {
    paths: RepoPaths,
}

impl RefStore {
    /// Open a store over a repository's paths.
    pub fn new(paths: RepoPaths) -> Self {
        Self { paths }
    }

    /// Read a ref without dereferencing symbolic pointers.
    ///
    /// Returns `Ok(None)` when the ref does not exist.
    pub fn read(&self, name: &RefName) -> Result<Option<RefValue>, RefError> {
        let path = self.paths.ref_path(name);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content = content.trim();

        if let Some(target) = content.strip_prefix("ref:") {
            let target = RefName::new(target.trim()).map_err(|_| RefError::Malformed {
                name: name.clone(),
                content: content.to_string(),
            })?;
            return Ok(Some(RefValue::Symbolic(target)));
        }

        let oid = Oid::new(content).map_err(|_| RefError::Malformed {
            name: name.clone(),
            content: content.to_string(),
        })?;
        Ok(Some(RefValue::Direct(oid)))
    }

    /// Follow a symbolic chain to its terminal ref, returning that
    /// ref's name and current value (which may be `None` for an unborn
    /// branch).
    ///
    /// A direct ref is its own terminus.
    pub fn resolve_terminal(
        &self,
        name: &RefName,
    ) -> Result<(RefName, Option<Oid>), RefError> {
        let mut current = name.clone();
        for _ in 0..MAX_SYMREF_DEPTH {
            match self.read(&current)? {
                Some(RefValue::Symbolic(target)) => current = target,
                Some(RefValue::Direct(oid)) => return Ok((current, Some(oid))),
                None => return Ok((current, None)),
            }
        }
        Err(RefError::SymbolicCycle(name.clone()))
    }

    /// Resolve a ref to an oid, following symbolic chains.
    ///
    /// # Errors
    ///
    /// [`RefError::NotFound`] when the ref (or the branch a symbolic
    /// chain terminates at) does not exist.
    pub fn resolve(&self, name: &RefName) -> Result<Oid, RefError> {
        match self.try_resolve(name)? {
            Some(oid) => Ok(oid),
            None => Err(RefError::NotFound(name.clone())),
        }
    }

    /// Resolve a ref to an oid, returning `Ok(None)` when missing or
    /// unborn.
    pub fn try_resolve(&self, name: &RefName) -> Result<Option<Oid>, RefError> {
        let (_, oid) = self.resolve_terminal(name)?;
        Ok(oid)
    }

    /// Whether the ref file itself exists (no dereferencing).
    pub fn exists(&self, name: &RefName) -> bool {
        self.paths.ref_path(name).exists()
    }

    /// Update a ref to point at an oid, unconditionally.
    ///
    /// Symbolic chains are followed: updating `HEAD` while it points
    /// at a branch writes the branch.
    pub fn update(&self, name: &RefName, new: &Oid) -> Result<(), RefError> {
        let (terminal, _) = self.resolve_terminal(name)?;
        self.write_locked(&terminal, &format!("{new}\n"), None)
    }

    /// Update a ref with compare-and-set semantics.
    ///
    /// The write succeeds only if the terminal ref's current value
    /// equals `expected_old`; pass `None` to require that the ref not
    /// exist yet. A mismatch is a concurrent update.
    pub fn update_cas(
        &self,
        name: &RefName,
        new: &Oid,
        expected_old: Option<&Oid>,
    ) -> Result<(), RefError> {
        let (terminal, _) = self.resolve_terminal(name)?;
        self.write_locked(&terminal, &format!("{new}\n"), Some(expected_old))
    }

    /// Make a ref symbolic, pointing at another ref.
    ///
    /// Writes the named ref itself; no dereferencing.
    pub fn set_symbolic(&self, name: &RefName, target: &RefName) -> Result<(), RefError> {
        self.write_locked(name, &format!("ref: {target}\n"), None)
    }

    /// Detach a ref: write a direct oid into the named ref itself,
    /// without following a symbolic chain.
    pub fn set_detached(&self, name: &RefName, oid: &Oid) -> Result<(), RefError> {
        self.write_locked(name, &format!("{oid}\n"), None)
    }

    /// Delete a ref file (no dereferencing).
    ///
    /// Returns whether the ref existed.
    pub fn delete(&self, name: &RefName) -> Result<bool, RefError> {
        let path = self.paths.ref_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List refs whose name starts with `prefix`, resolved to oids,
    /// sorted by name.
    ///
    /// Unborn symbolic refs are skipped. The distinguished roots are
    /// included when they match the prefix.
    pub fn list(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>, RefError> {
        let mut names: Vec<RefName> = Vec::new();

        for root in ROOT_REFS {
            names.push(RefName::new(root)?);
        }

        let refs_dir = self.paths.repo_dir().join("refs");
        if refs_dir.exists() {
            let mut stack = vec![refs_dir];
            while let Some(dir) = stack.pop() {
                for entry in fs::read_dir(&dir)? {
                    let entry = entry?;
                    let path = entry.path();
                    if entry.file_type()?.is_dir() {
                        stack.push(path);
                    } else if let Some(name) = self.refname_for_path(&path) {
                        names.push(name);
                    }
                }
            }
        }

        let mut out = Vec::new();
        for name in names {
            if !name.as_str().starts_with(prefix) {
                continue;
            }
            if let Some(oid) = self.try_resolve(&name)? {
                out.push((name, oid));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// Reconstruct a ref name from a file path under the repo dir.
    fn refname_for_path(&self, path: &Path) -> Option<RefName> {
        let rel = path.strip_prefix(self.paths.repo_dir()).ok()?;
        let name = rel.to_str()?;
        // Skip in-flight lock files.
        if name.ends_with(".lock") {
            return None;
        }
        RefName::new(name).ok()
    }

    /// Serialize a write through the ref's `.lock` file.
    ///
    /// `expected`: `None` skips the comparison; `Some(None)` requires
    /// absence; `Some(Some(oid))` requires that exact current value.
    fn write_locked(
        &self,
        name: &RefName,
        content: &str,
        expected: Option<Option<&Oid>>,
    ) -> Result<(), RefError> {
        let path = self.paths.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_path = self.lock_path(&path);
        let mut lock = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(RefError::Locked(name.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let result = (|| {
            if let Some(expected_old) = expected {
                // Callers that pass expectations address the terminal
                // ref, so a symbolic value here counts as absent.
                let actual = match self.read(name)? {
                    Some(RefValue::Direct(oid)) => Some(oid),
                    Some(RefValue::Symbolic(_)) | None => None,
                };
                if actual.as_ref() != expected_old {
                    return Err(RefError::CasFailed {
                        name: name.clone(),
                        expected: expected_old.cloned(),
                        actual,
                    });
                }
            }

            lock.write_all(content.as_bytes())?;
            lock.sync_all()?;
            fs::rename(&lock_path, &path)?;
            Ok(())
        })();

        if result.is_err() {
            // Leave no stale lock behind on failure.
            let _ = fs::remove_file(&lock_path);
        }
        result
    }

    fn lock_path(&self, ref_path: &Path) -> PathBuf {
        let mut os = ref_path.as_os_str().to_owned();
        os.push(".lock");
        PathBuf::from(os)
    }
}
