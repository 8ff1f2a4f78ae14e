//! engine::walk
//!
//! Commit-graph traversals: merge-base, ancestry, and reachability
//! closures.
//!
//! The DAG lives in the object store; traversal state is small
//! in-memory sets and queues keyed by oid. Parent order inside commit
//! objects is significant and preserved, which makes the bidirectional
//! search deterministic.

use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::core::types::Oid;
use crate::odb::{EntryKind, ObjectStore, OdbError};

/// Find a lowest common ancestor of two commits via bidirectional BFS.
///
/// Two frontiers expand in strict alternation, one pop per side per
/// round; the first commit seen from both sides is returned. Returns
/// `None` when the histories are unrelated.
///
/// `merge_base(a, a) == a`, and an ancestor of the other argument is
/// returned directly.
pub fn merge_base(odb: &ObjectStore, a: &Oid, b: &Oid) -> Result<Option<Oid>, OdbError> {
    if a == b {
        return Ok(Some(a.clone()));
    }

    let mut visited_a: HashSet<Oid> = HashSet::from([a.clone()]);
    let mut visited_b: HashSet<Oid> = HashSet::from([b.clone()]);
    let mut frontier_a: VecDeque<Oid> = VecDeque::from([a.clone()]);
    let mut frontier_b: VecDeque<Oid> = VecDeque::from([b.clone()]);

    while !frontier_a.is_empty() || !frontier_b.is_empty() {
        if let Some(current) = frontier_a.pop_front() {
            if visited_b.contains(&current) {
                return Ok(Some(current));
            }
            for parent in odb.get_commit(&current)?.parents {
                if visited_a.insert(parent.clone()) {
                    frontier_a.push_back(parent);
                }
            }
        }

        if let Some(current) = frontier_b.pop_front() {
            if visited_a.contains(&current) {
                return Ok(Some(current));
            }
            for parent in odb.get_commit(&current)?.parents {
                if visited_b.insert(parent.clone()) {
                    frontier_b.push_back(parent);
                }
            }
        }
    }

    Ok(None)
}

/// Whether `ancestor` is reachable from `descendant` (inclusive:
/// every commit is its own ancestor).
pub fn is_ancestor(odb: &ObjectStore, ancestor: &Oid, descendant: &Oid) -> Result<bool, OdbError> {
    let mut visited: HashSet<Oid> = HashSet::new();
    let mut queue: VecDeque<Oid> = VecDeque::from([descendant.clone()]);

    while let Some(current) = queue.pop_front() {
        if &current == ancestor {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        for parent in odb.get_commit(&current)?.parents {
            if !visited.contains(&parent) {
                queue.push_back(parent);
            }
        }
    }

    Ok(false)
}

/// The first-parent chain from `head` down to `stop` (exclusive),
/// oldest first.
///
/// This is the rebase pick list: the commits on the current line of
/// development that are not part of the upstream.
pub fn first_parent_chain(
    odb: &ObjectStore,
    head: &Oid,
    stop: &Oid,
) -> Result<Vec<Oid>, OdbError> {
    let mut chain = Vec::new();
    let mut current = Some(head.clone());

    while let Some(oid) = current {
        if &oid == stop {
            break;
        }
        let commit = odb.get_commit(&oid)?;
        chain.push(oid);
        current = commit.first_parent().cloned();
    }

    chain.reverse();
    Ok(chain)
}

/// Commits reachable from `tip`, pruned at commits for which `have`
/// returns true (those commits and their ancestors are skipped).
///
/// First parents are walked before later parents, matching the order
/// history is usually read in.
pub fn commit_closure(
    odb: &ObjectStore,
    tip: &Oid,
    have: &dyn Fn(&Oid) -> bool,
) -> Result<Vec<Oid>, OdbError> {
    let mut out = Vec::new();
    let mut visited: HashSet<Oid> = HashSet::new();
    let mut queue: VecDeque<Oid> = VecDeque::from([tip.clone()]);

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        if have(&current) {
            continue;
        }
        let commit = odb.get_commit(&current)?;
        out.push(current);
        for (i, parent) in commit.parents.iter().enumerate() {
            if visited.contains(parent) {
                continue;
            }
            if i == 0 {
                queue.push_front(parent.clone());
            } else {
                queue.push_back(parent.clone());
            }
        }
    }

    Ok(out)
}

/// Every object (trees and blobs) under a tree, including the tree
/// itself, accumulated into `out`.
pub fn tree_objects(
    odb: &ObjectStore,
    tree_oid: &Oid,
    out: &mut BTreeSet<Oid>,
) -> Result<(), OdbError> {
    if !out.insert(tree_oid.clone()) {
        return Ok(());
    }
    let tree = odb.get_tree(tree_oid)?;
    for entry in tree.entries() {
        match entry.kind {
            EntryKind::Blob => {
                out.insert(entry.oid.clone());
            }
            EntryKind::Tree => tree_objects(odb, &entry.oid, out)?,
        }
    }
    Ok(())
}
