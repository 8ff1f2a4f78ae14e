//! core::paths
//!
//! Centralized path routing for repository storage locations.
//!
//! # Architecture
//!
//! All on-disk locations are routed through [`RepoPaths`] so that no
//! other module hardcodes the `.R/` layout. The layout is:
//!
//! - `objects/<hh>/<rest>` - compressed framed objects
//! - `HEAD`, `MERGE_HEAD`, `ORIG_HEAD`, `CHERRY_PICK_HEAD` - root refs
//! - `refs/heads/*`, `refs/tags/*`, `refs/remote/<r>/*` - namespaced refs
//! - `index` - staging area (JSON)
//! - `config` - repository configuration (JSON)
//! - `REBASE_STATE` - sequencer state, present only mid-rebase
//! - `MERGE_MSG` - sentinel message file for a paused apply
//! - `lock` - exclusive repository lock
//!
//! # Example
//!
//! ```
//! use strata::core::paths::RepoPaths;
//! use std::path::PathBuf;
//!
//! let paths = RepoPaths::new(PathBuf::from("/work/project"));
//! assert_eq!(paths.repo_dir(), PathBuf::from("/work/project/.R").as_path());
//! assert_eq!(paths.index_path(), PathBuf::from("/work/project/.R/index"));
//! ```

use std::path::{Path, PathBuf};

use crate::core::types::{Oid, RefName};

/// Name of the repository directory under the working tree root.
pub const REPO_DIR_NAME: &str = ".R";

/// Centralized path routing for repository storage.
///
/// # Invariants
///
/// - No code outside this module computes `.R/`-relative paths
/// - Ref paths mirror the ref name exactly (`refs/heads/x` is a file
///   at `.R/refs/heads/x`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    /// Working tree root; the repository lives at `<root>/.R`.
    root: PathBuf,
}

impl RepoPaths {
    /// Create paths rooted at a working tree directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The working tree root.
    pub fn work_dir(&self) -> &Path {
        &self.root
    }

    /// The repository directory (`<root>/.R`).
    pub fn repo_dir(&self) -> PathBuf {
        self.root.join(REPO_DIR_NAME)
    }

    /// The object database directory.
    pub fn objects_dir(&self) -> PathBuf {
        self.repo_dir().join("objects")
    }

    /// The storage path of an object, fanned out on the first two hex
    /// characters of the oid.
    pub fn object_path(&self, oid: &Oid) -> PathBuf {
        let hex = oid.as_str();
        self.objects_dir().join(&hex[..2]).join(&hex[2..])
    }

    /// The file backing a ref.
    ///
    /// Root refs live directly under `.R/`; namespaced refs mirror
    /// their name.
    pub fn ref_path(&self, name: &RefName) -> PathBuf {
        self.repo_dir().join(name.as_str())
    }

    /// The staging area file.
    pub fn index_path(&self) -> PathBuf {
        self.repo_dir().join("index")
    }

    /// The repository configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.repo_dir().join("config")
    }

    /// The persisted sequencer state, present only during a rebase.
    pub fn sequencer_path(&self) -> PathBuf {
        self.repo_dir().join("REBASE_STATE")
    }

    /// The sentinel message file written when an apply pauses on
    /// conflict.
    pub fn merge_msg_path(&self) -> PathBuf {
        self.repo_dir().join("MERGE_MSG")
    }

    /// The exclusive repository lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.repo_dir().join("lock")
    }
}
