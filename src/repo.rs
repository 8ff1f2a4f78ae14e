//! repo
//!
//! The repository handle: the single doorway tying together the object
//! database, the reference store, and the on-disk layout.
//!
//! # Architecture
//!
//! [`Repository`] owns no mutable state; it carries the path routing
//! and store handles that every operation works through. History
//! operations live in [`crate::engine`] and take a `&Repository`
//! together with a working-tree adapter.
//!
//! # Example
//!
//! ```ignore
//! let repo = Repository::init("/work/project")?;
//! let mut wt = repo.work_tree();
//! engine::stage(&repo, &mut wt, &["a.txt"])?;
//! engine::commit(&repo, &SystemClock, "first")?;
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::config::{Config, ConfigError};
use crate::core::paths::{RepoPaths, REPO_DIR_NAME};
use crate::core::types::{Oid, RefName, TypeError};
use crate::index::{Index, IndexError};
use crate::odb::ObjectStore;
use crate::refs::{RefError, RefStore, RefValue};
use crate::worktree::FsWorkTree;

/// The branch a fresh repository's `HEAD` points at.
pub const DEFAULT_BRANCH: &str = "main";

/// Errors from opening or initialising a repository.
#[derive(Debug, Error)]
pub enum RepoError {
    /// `init` on a directory that already has a repository.
    #[error("repository already exists at {0}")]
    AlreadyExists(PathBuf),

    /// `open` on a directory without a repository.
    #[error("no repository found at {0}")]
    NotARepo(PathBuf),

    /// Underlying filesystem failure.
    #[error("repository i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Reference store failure during setup.
    #[error(transparent)]
    Ref(#[from] RefError),

    /// Name validation failure.
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// A repository rooted at a working directory containing `.R/`.
#[derive(Debug, Clone)]
pub struct Repository {
    paths: RepoPaths,
    odb: ObjectStore,
    refs: RefStore,
}

impl Repository {
    /// Create a new repository at `root`.
    ///
    /// Lays down `.R/objects/` and a symbolic `HEAD` pointing at the
    /// unborn default branch.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let root = root.into();
        let paths = RepoPaths::new(root);
        if paths.repo_dir().exists() {
            return Err(RepoError::AlreadyExists(paths.repo_dir()));
        }
        fs::create_dir_all(paths.objects_dir())?;

        let repo = Self::from_paths(paths);
        repo.refs
            .set_symbolic(&RefName::head(), &RefName::branch(DEFAULT_BRANCH)?)?;
        log::info!("initialised repository at {}", repo.paths.repo_dir().display());
        Ok(repo)
    }

    /// Open an existing repository at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let root = root.into();
        let paths = RepoPaths::new(root);
        if !paths.repo_dir().is_dir() {
            return Err(RepoError::NotARepo(paths.repo_dir()));
        }
        Ok(Self::from_paths(paths))
    }

    fn from_paths(paths: RepoPaths) -> Self {
        let odb = ObjectStore::new(paths.objects_dir());
        let refs = RefStore::new(paths.clone());
        Self { paths, odb, refs }
    }

    /// Path routing for this repository.
    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    /// The object database.
    pub fn odb(&self) -> &ObjectStore {
        &self.odb
    }

    /// The reference store.
    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    /// The working tree root (the directory containing `.R/`).
    pub fn work_dir(&self) -> &Path {
        self.paths.work_dir()
    }

    /// A filesystem working-tree adapter for this repository.
    pub fn work_tree(&self) -> FsWorkTree {
        FsWorkTree::new(self.paths.work_dir())
    }

    /// Load the configuration.
    pub fn config(&self) -> Result<Config, ConfigError> {
        Config::load(&self.paths)
    }

    /// Load the index.
    pub fn load_index(&self) -> Result<Index, IndexError> {
        Index::load(&self.paths)
    }

    /// The commit `HEAD` resolves to, or `None` on an unborn branch.
    pub fn head_oid(&self) -> Result<Option<Oid>, RefError> {
        self.refs.try_resolve(&RefName::head())
    }

    /// The branch `HEAD` points at, or `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>, RefError> {
        match self.refs.read(&RefName::head())? {
            Some(RefValue::Symbolic(target)) => Ok(target
                .strip_prefix("refs/heads/")
                .map(str::to_owned)),
            _ => Ok(None),
        }
    }

    /// Create a branch at an oid.
    ///
    /// Fails with a concurrent-update error if the branch exists.
    pub fn create_branch(&self, name: &str, oid: &Oid) -> Result<(), RepoError> {
        let refname = RefName::branch(name)?;
        self.refs.update_cas(&refname, oid, None)?;
        Ok(())
    }

    /// Delete a branch; returns whether it existed.
    pub fn delete_branch(&self, name: &str) -> Result<bool, RepoError> {
        let refname = RefName::branch(name)?;
        Ok(self.refs.delete(&refname)?)
    }

    /// List branch names with their tips, sorted.
    pub fn branches(&self) -> Result<Vec<(String, Oid)>, RepoError> {
        let refs = self.refs.list("refs/heads/")?;
        Ok(refs
            .into_iter()
            .filter_map(|(name, oid)| {
                name.strip_prefix("refs/heads/")
                    .map(|short| (short.to_owned(), oid))
            })
            .collect())
    }

    /// Whether a branch exists.
    pub fn branch_exists(&self, name: &str) -> Result<bool, RepoError> {
        let refname = RefName::branch(name)?;
        Ok(self.refs.exists(&refname))
    }

    /// Create a lightweight tag at an oid.
    pub fn create_tag(&self, name: &str, oid: &Oid) -> Result<(), RepoError> {
        let refname = RefName::tag(name)?;
        self.refs.update_cas(&refname, oid, None)?;
        Ok(())
    }

    /// Whether this directory contains a repository.
    pub fn is_repo(root: &Path) -> bool {
        root.join(REPO_DIR_NAME).is_dir()
    }
}
