//! merge::trees
//!
//! Three-way tree merge with typed conflict classification.
//!
//! # Algorithm
//!
//! The three trees are flattened to `path -> blob oid` maps and every
//! path in their union is classified:
//!
//! 1. Both derived sides agree - take either.
//! 2. One side unchanged from base - take the changed side.
//! 3. Absent on both derived sides - drop.
//! 4. Added on both sides with different content - `add_add`; a
//!    textual merge is attempted as if the base were empty.
//! 5. Deleted on one side, modified on the other - a delete/modify
//!    conflict; no textual merge is attempted.
//! 6. Modified on both sides - `content_conflict`; the textual merger
//!    runs and may still reconcile cleanly.
//!
//! Marker-bearing merge output is stored as a blob and referenced from
//! the conflict record together with the three input oids.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::types::{ConflictKind, Oid};
use crate::odb::{ObjectStore, OdbError, Tree};

use super::text::merge3;

/// Errors from tree merging.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Object database failure while reading or writing trees/blobs.
    #[error(transparent)]
    Odb(#[from] OdbError),
}

/// An unresolved conflict at one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    /// The typed classification.
    pub kind: ConflictKind,
    /// The base side's blob, when the path existed in the base.
    pub base: Option<Oid>,
    /// Our side's blob, when present.
    pub head: Option<Oid>,
    /// The other side's blob, when present.
    pub other: Option<Oid>,
    /// Marker-bearing merged blob, when a textual merge was attempted.
    pub merged: Option<Oid>,
}

/// The merged disposition of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergedEntry {
    /// Reconciled to a single blob.
    Clean(Oid),
    /// Needs resolution.
    Conflict(ConflictRecord),
}

/// The result of a three-way tree merge.
#[derive(Debug, Clone, Default)]
pub struct TreeMerge {
    entries: BTreeMap<String, MergedEntry>,
}

impl TreeMerge {
    /// All merged entries, sorted by path.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &MergedEntry)> {
        self.entries.iter().map(|(p, e)| (p.as_str(), e))
    }

    /// Whether every path reconciled cleanly.
    pub fn is_clean(&self) -> bool {
        self.entries
            .values()
            .all(|e| matches!(e, MergedEntry::Clean(_)))
    }

    /// Conflicted paths with their records, sorted by path.
    pub fn conflicts(&self) -> Vec<(String, ConflictRecord)> {
        self.entries
            .iter()
            .filter_map(|(p, e)| match e {
                MergedEntry::Conflict(record) => Some((p.clone(), record.clone())),
                MergedEntry::Clean(_) => None,
            })
            .collect()
    }

    /// The clean portion as a `path -> oid` map.
    pub fn clean_entries(&self) -> BTreeMap<String, Oid> {
        self.entries
            .iter()
            .filter_map(|(p, e)| match e {
                MergedEntry::Clean(oid) => Some((p.clone(), oid.clone())),
                MergedEntry::Conflict(_) => None,
            })
            .collect()
    }

    /// Build and store the merged tree when clean.
    ///
    /// Returns `None` while conflicts remain; the caller must drive
    /// resolution through the index instead.
    pub fn write_tree(&self, odb: &ObjectStore) -> Result<Option<Oid>, MergeError> {
        if !self.is_clean() {
            return Ok(None);
        }
        Ok(Some(Tree::write_flat(odb, &self.clean_entries())?))
    }
}

/// Merge two derived trees against their common base.
///
/// `None` stands for the empty tree on any side.
pub fn merge_trees(
    odb: &ObjectStore,
    base: Option<&Oid>,
    ours: Option<&Oid>,
    theirs: Option<&Oid>,
) -> Result<TreeMerge, MergeError> {
    let base_flat = flatten_opt(odb, base)?;
    let our_flat = flatten_opt(odb, ours)?;
    let their_flat = flatten_opt(odb, theirs)?;

    let mut paths: Vec<&String> = base_flat
        .keys()
        .chain(our_flat.keys())
        .chain(their_flat.keys())
        .collect();
    paths.sort();
    paths.dedup();

    let mut entries = BTreeMap::new();
    for path in paths {
        let b = base_flat.get(path);
        let o = our_flat.get(path);
        let t = their_flat.get(path);

        if let Some(entry) = classify(odb, b, o, t)? {
            entries.insert(path.clone(), entry);
        }
    }

    let merge = TreeMerge { entries };
    if !merge.is_clean() {
        log::debug!(
            "merge_trees: {} conflicted path(s)",
            merge.conflicts().len()
        );
    }
    Ok(merge)
}

fn flatten_opt(odb: &ObjectStore, tree: Option<&Oid>) -> Result<BTreeMap<String, Oid>, MergeError> {
    match tree {
        Some(oid) => Ok(Tree::flatten(odb, oid)?),
        None => Ok(BTreeMap::new()),
    }
}

/// Decide one path's disposition; `None` means the path is absent from
/// the merged result.
fn classify(
    odb: &ObjectStore,
    base: Option<&Oid>,
    ours: Option<&Oid>,
    theirs: Option<&Oid>,
) -> Result<Option<MergedEntry>, MergeError> {
    // Both sides agree (including both absent).
    if ours == theirs {
        return Ok(ours.cloned().map(MergedEntry::Clean));
    }

    // One side unchanged from base: take the other.
    if ours == base {
        return Ok(theirs.cloned().map(MergedEntry::Clean));
    }
    if theirs == base {
        return Ok(ours.cloned().map(MergedEntry::Clean));
    }

    // All three disagree; classify the conflict.
    match (base, ours, theirs) {
        // Added on both sides with different content: a textual merge
        // against the empty base may still reconcile.
        (None, Some(o), Some(t)) => {
            Ok(Some(text_merge(odb, ConflictKind::AddAdd, None, o, t)?))
        }

        // Deleted here, modified there. No textual merge.
        (Some(b), None, Some(t)) => Ok(Some(MergedEntry::Conflict(ConflictRecord {
            kind: ConflictKind::CurrentDeleteTargetModify,
            base: Some(b.clone()),
            head: None,
            other: Some(t.clone()),
            merged: None,
        }))),

        // Modified here, deleted there. No textual merge.
        (Some(b), Some(o), None) => Ok(Some(MergedEntry::Conflict(ConflictRecord {
            kind: ConflictKind::CurrentModifyTargetDelete,
            base: Some(b.clone()),
            head: Some(o.clone()),
            other: None,
            merged: None,
        }))),

        // Modified on both sides.
        (Some(_), Some(o), Some(t)) => Ok(Some(text_merge(
            odb,
            ConflictKind::ContentConflict,
            base,
            o,
            t,
        )?)),

        // Any remaining shape has a side equal to the base or to the
        // other side, which the agreement cases already resolved.
        (None, _, _) | (_, None, None) => {
            unreachable!("resolved by the agreement cases")
        }
    }
}

fn text_merge(
    odb: &ObjectStore,
    kind: ConflictKind,
    base: Option<&Oid>,
    ours: &Oid,
    theirs: &Oid,
) -> Result<MergedEntry, MergeError> {
    let base_bytes = match base {
        Some(oid) => odb.get_blob(oid)?,
        None => Vec::new(),
    };
    let our_bytes = odb.get_blob(ours)?;
    let their_bytes = odb.get_blob(theirs)?;

    let result = merge3(&base_bytes, &our_bytes, &their_bytes);
    let merged_oid = odb.put_blob(&result.bytes)?;

    if result.is_clean() {
        Ok(MergedEntry::Clean(merged_oid))
    } else {
        Ok(MergedEntry::Conflict(ConflictRecord {
            kind,
            base: base.cloned(),
            head: Some(ours.clone()),
            other: Some(theirs.clone()),
            merged: Some(merged_oid),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, ObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        (dir, store)
    }

    fn tree_of(store: &ObjectStore, files: &[(&str, &str)]) -> Oid {
        let mut flat = BTreeMap::new();
        for (path, content) in files {
            let blob = store.put_blob(content.as_bytes()).unwrap();
            flat.insert(path.to_string(), blob);
        }
        Tree::write_flat(store, &flat).unwrap()
    }

    #[test]
    fn identical_trees_merge_to_themselves() {
        let (_dir, store) = temp_store();
        let tree = tree_of(&store, &[("a.txt", "x\n")]);
        let merge = merge_trees(&store, Some(&tree), Some(&tree), Some(&tree)).unwrap();
        assert!(merge.is_clean());
        assert_eq!(merge.write_tree(&store).unwrap(), Some(tree));
    }

    #[test]
    fn theirs_unchanged_takes_ours() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[("a.txt", "base\n")]);
        let ours = tree_of(&store, &[("a.txt", "changed\n")]);
        let merge = merge_trees(&store, Some(&base), Some(&ours), Some(&base)).unwrap();
        assert!(merge.is_clean());
        assert_eq!(merge.write_tree(&store).unwrap(), Some(ours));
    }

    #[test]
    fn ours_unchanged_takes_theirs() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[("a.txt", "base\n")]);
        let theirs = tree_of(&store, &[("a.txt", "changed\n")]);
        let merge = merge_trees(&store, Some(&base), Some(&base), Some(&theirs)).unwrap();
        assert!(merge.is_clean());
        assert_eq!(merge.write_tree(&store).unwrap(), Some(theirs));
    }

    #[test]
    fn independent_files_merge_cleanly() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[("a.txt", "a\n")]);
        let ours = tree_of(&store, &[("a.txt", "a\n"), ("ours.txt", "o\n")]);
        let theirs = tree_of(&store, &[("a.txt", "a\n"), ("theirs.txt", "t\n")]);

        let merge = merge_trees(&store, Some(&base), Some(&ours), Some(&theirs)).unwrap();
        assert!(merge.is_clean());
        let merged = merge.clean_entries();
        assert!(merged.contains_key("a.txt"));
        assert!(merged.contains_key("ours.txt"));
        assert!(merged.contains_key("theirs.txt"));
    }

    #[test]
    fn deletion_against_unchanged_side_is_accepted() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[("a.txt", "a\n"), ("gone.txt", "g\n")]);
        let ours = tree_of(&store, &[("a.txt", "a\n")]);

        let merge = merge_trees(&store, Some(&base), Some(&ours), Some(&base)).unwrap();
        assert!(merge.is_clean());
        assert!(!merge.clean_entries().contains_key("gone.txt"));
    }

    #[test]
    fn both_deleted_is_clean() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[("gone.txt", "g\n")]);
        let empty = tree_of(&store, &[]);
        let merge = merge_trees(&store, Some(&base), Some(&empty), Some(&empty)).unwrap();
        assert!(merge.is_clean());
        assert!(merge.clean_entries().is_empty());
    }

    #[test]
    fn content_conflict_carries_all_three_inputs() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[("a.txt", "1\n")]);
        let ours = tree_of(&store, &[("a.txt", "2\n")]);
        let theirs = tree_of(&store, &[("a.txt", "3\n")]);

        let merge = merge_trees(&store, Some(&base), Some(&ours), Some(&theirs)).unwrap();
        assert!(!merge.is_clean());
        assert_eq!(merge.write_tree(&store).unwrap(), None);

        let conflicts = merge.conflicts();
        assert_eq!(conflicts.len(), 1);
        let (path, record) = &conflicts[0];
        assert_eq!(path, "a.txt");
        assert_eq!(record.kind, ConflictKind::ContentConflict);
        assert!(record.base.is_some());
        assert!(record.head.is_some());
        assert!(record.other.is_some());

        // The merged blob carries diff3 markers including the BASE section.
        let marked = store.get_blob(record.merged.as_ref().unwrap()).unwrap();
        let text = String::from_utf8(marked).unwrap();
        assert!(text.contains("<<<<<<< HEAD"));
        assert!(text.contains("||||||| BASE"));
        assert!(text.contains(">>>>>>> MERGE_HEAD"));
    }

    #[test]
    fn overlapping_edits_may_still_reconcile() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[("f.txt", "one\ntwo\nthree\nfour\nfive\n")]);
        let ours = tree_of(&store, &[("f.txt", "ONE\ntwo\nthree\nfour\nfive\n")]);
        let theirs = tree_of(&store, &[("f.txt", "one\ntwo\nthree\nfour\nFIVE\n")]);

        let merge = merge_trees(&store, Some(&base), Some(&ours), Some(&theirs)).unwrap();
        assert!(merge.is_clean());
        let merged_oid = merge.clean_entries()["f.txt"].clone();
        assert_eq!(
            store.get_blob(&merged_oid).unwrap(),
            b"ONE\ntwo\nthree\nfour\nFIVE\n"
        );
    }

    #[test]
    fn add_add_conflict_has_no_base() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[]);
        let ours = tree_of(&store, &[("new.txt", "mine\n")]);
        let theirs = tree_of(&store, &[("new.txt", "yours\n")]);

        let merge = merge_trees(&store, Some(&base), Some(&ours), Some(&theirs)).unwrap();
        let conflicts = merge.conflicts();
        assert_eq!(conflicts.len(), 1);
        let record = &conflicts[0].1;
        assert_eq!(record.kind, ConflictKind::AddAdd);
        assert_eq!(record.base, None);
        assert!(record.merged.is_some());
    }

    #[test]
    fn add_add_identical_content_is_clean() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[]);
        let side = tree_of(&store, &[("new.txt", "same\n")]);

        let merge = merge_trees(&store, Some(&base), Some(&side), Some(&side)).unwrap();
        assert!(merge.is_clean());
    }

    #[test]
    fn delete_modify_conflict_skips_text_merge() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[("x", "a\n")]);
        let ours = tree_of(&store, &[]);
        let theirs = tree_of(&store, &[("x", "b\n")]);

        let merge = merge_trees(&store, Some(&base), Some(&ours), Some(&theirs)).unwrap();
        let conflicts = merge.conflicts();
        assert_eq!(conflicts.len(), 1);
        let record = &conflicts[0].1;
        assert_eq!(record.kind, ConflictKind::CurrentDeleteTargetModify);
        assert_eq!(record.head, None);
        assert!(record.base.is_some());
        assert!(record.other.is_some());
        // No marker blob for delete/modify.
        assert_eq!(record.merged, None);
    }

    #[test]
    fn modify_delete_conflict_mirrors() {
        let (_dir, store) = temp_store();
        let base = tree_of(&store, &[("x", "a\n")]);
        let ours = tree_of(&store, &[("x", "b\n")]);
        let theirs = tree_of(&store, &[]);

        let merge = merge_trees(&store, Some(&base), Some(&ours), Some(&theirs)).unwrap();
        let record = &merge.conflicts()[0].1;
        assert_eq!(record.kind, ConflictKind::CurrentModifyTargetDelete);
        assert!(record.head.is_some());
        assert_eq!(record.other, None);
    }

    #[test]
    fn deletion_of_modified_base_detected_with_none_base() {
        // With no base at all and one side absent, the present side wins.
        let (_dir, store) = temp_store();
        let ours = tree_of(&store, &[("only.txt", "here\n")]);
        let empty = tree_of(&store, &[]);

        let merge = merge_trees(&store, None, Some(&ours), Some(&empty)).unwrap();
        assert!(merge.is_clean());
        // ours differs from (empty) base, theirs matches it: take ours.
        assert!(merge.clean_entries().contains_key("only.txt"));
    }
}
