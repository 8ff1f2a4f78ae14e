//! index
//!
//! The staging area: a path-to-entry mapping persisted as JSON.
//!
//! # Architecture
//!
//! Each tracked path has exactly one entry, either `clean` (a staged
//! blob) or `conflict` (an unresolved three-way merge result carrying
//! the typed conflict kind and the `base`/`head`/`other` input oids).
//! Staging a path with [`Index::stage`] overwrites whatever was there,
//! which is how conflicts transition back to clean after resolution.
//!
//! # Invariants
//!
//! - At most one entry per path; paths use `/` separators
//! - `write_tree` refuses while any conflict entry exists
//! - Saves are atomic: write to a temp file, fsync, rename
//!
//! # Example
//!
//! ```ignore
//! let mut index = Index::load(&paths)?;
//! index.stage("src/main.rs", blob_oid)?;
//! let tree = index.write_tree(&odb)?;
//! index.save(&paths)?;
//! ```

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::paths::RepoPaths;
use crate::core::types::{ConflictKind, Oid};
use crate::odb::{ObjectStore, OdbError, Tree};

/// Errors from index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// I/O error reading or writing the index file.
    #[error("index i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The index file is not valid JSON of the expected shape.
    #[error("malformed index file: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A staged path is not a legal working-tree-relative path.
    #[error("illegal index path: {0}")]
    IllegalPath(String),

    /// `write_tree` was called while conflicts are staged.
    #[error("index has unresolved conflicts in: {}", .0.join(", "))]
    HasConflicts(Vec<String>),

    /// Object database failure while building trees.
    #[error(transparent)]
    Odb(#[from] OdbError),
}

/// One index entry, discriminated on `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexEntry {
    /// A staged blob.
    Clean {
        oid: Oid,
    },
    /// An unresolved conflict.
    ///
    /// `oid` points at the marker-bearing merged blob when a textual
    /// merge was attempted; `base`/`head`/`other` preserve the
    /// three-way inputs so resolution tools can re-merge.
    Conflict {
        #[serde(rename = "type")]
        kind: ConflictKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        oid: Option<Oid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        base: Option<Oid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        head: Option<Oid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        other: Option<Oid>,
    },
}

impl IndexEntry {
    /// Whether this entry is an unresolved conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, IndexEntry::Conflict { .. })
    }

    /// The staged oid of a clean entry.
    pub fn clean_oid(&self) -> Option<&Oid> {
        match self {
            IndexEntry::Clean { oid } => Some(oid),
            IndexEntry::Conflict { .. } => None,
        }
    }
}

/// The staging area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    /// Load the index, returning an empty one when the file does not
    /// exist yet. An empty index is legal.
    pub fn load(paths: &RepoPaths) -> Result<Self, IndexError> {
        let path = paths.index_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let entries = serde_json::from_str(&content)?;
        Ok(Self { entries })
    }

    /// Persist the index atomically: temp file, fsync, rename.
    ///
    /// A crash leaves either the pre-save or post-save index, never a
    /// partial write.
    pub fn save(&self, paths: &RepoPaths) -> Result<(), IndexError> {
        let path = paths.index_path();
        let tmp = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(&self.entries)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Stage a blob at a path, replacing any existing entry.
    ///
    /// Staging over a conflict entry resolves it.
    pub fn stage(&mut self, path: impl Into<String>, oid: Oid) -> Result<(), IndexError> {
        let path = path.into();
        Self::validate_path(&path)?;
        self.entries.insert(path, IndexEntry::Clean { oid });
        Ok(())
    }

    /// Stage an unresolved conflict at a path.
    pub fn stage_conflict(
        &mut self,
        path: impl Into<String>,
        kind: ConflictKind,
        base: Option<Oid>,
        head: Option<Oid>,
        other: Option<Oid>,
        merged: Option<Oid>,
    ) -> Result<(), IndexError> {
        let path = path.into();
        Self::validate_path(&path)?;
        self.entries.insert(
            path,
            IndexEntry::Conflict {
                kind,
                oid: merged,
                base,
                head,
                other,
            },
        );
        Ok(())
    }

    /// Remove a path from the index; returns whether it was present.
    pub fn clear(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    /// Drop every entry.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// All entries, sorted by path.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.entries.iter().map(|(p, e)| (p.as_str(), e))
    }

    /// Look up one entry.
    pub fn entry(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry is an unresolved conflict.
    pub fn has_conflicts(&self) -> bool {
        self.entries.values().any(IndexEntry::is_conflict)
    }

    /// Paths of all unresolved conflicts, sorted.
    pub fn conflict_paths(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_conflict())
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Conflicted paths with their kinds, sorted by path.
    pub fn conflicts(&self) -> Vec<(String, ConflictKind)> {
        self.entries
            .iter()
            .filter_map(|(p, e)| match e {
                IndexEntry::Conflict { kind, .. } => Some((p.clone(), *kind)),
                IndexEntry::Clean { .. } => None,
            })
            .collect()
    }

    /// The clean portion of the index as a `path -> oid` map.
    pub fn clean_entries(&self) -> BTreeMap<String, Oid> {
        self.entries
            .iter()
            .filter_map(|(p, e)| e.clean_oid().map(|oid| (p.clone(), oid.clone())))
            .collect()
    }

    /// Replace the index contents with a commit's tree.
    pub fn read_tree(&mut self, odb: &ObjectStore, tree_oid: &Oid) -> Result<(), IndexError> {
        let flat = Tree::flatten(odb, tree_oid)?;
        self.entries = flat
            .into_iter()
            .map(|(path, oid)| (path, IndexEntry::Clean { oid }))
            .collect();
        Ok(())
    }

    /// Build tree objects bottom-up from the staged entries and return
    /// the root tree oid.
    ///
    /// # Errors
    ///
    /// [`IndexError::HasConflicts`] if any entry is unresolved.
    pub fn write_tree(&self, odb: &ObjectStore) -> Result<Oid, IndexError> {
        if self.has_conflicts() {
            return Err(IndexError::HasConflicts(self.conflict_paths()));
        }
        let flat = self.clean_entries();
        Ok(Tree::write_flat(odb, &flat)?)
    }

    fn validate_path(path: &str) -> Result<(), IndexError> {
        let illegal = path.is_empty()
            || path.starts_with('/')
            || path.ends_with('/')
            || path
                .split('/')
                .any(|c| c.is_empty() || c == "." || c == "..");
        if illegal {
            return Err(IndexError::IllegalPath(path.to_string()));
        }
        Ok(())
    }
}
