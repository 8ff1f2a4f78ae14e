//! engine::commit
//!
//! Staging files and writing commits.

use crate::core::clock::Clock;
use crate::core::lock::RepoLock;
use crate::core::types::{Oid, RefName, Signature};
use crate::index::Index;
use crate::odb::{Commit, ObjectKind};
use crate::refs::RefValue;
use crate::repo::Repository;
use crate::worktree::WorkTree;

use super::{ensure_no_conflicts, EngineError, Outcome};

/// Stage working files into the index.
///
/// A path naming an existing file is hashed and staged; a path that no
/// longer exists on disk but is tracked is removed from the index,
/// staging the deletion. Staging over a conflict entry resolves it.
pub fn stage<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    paths: &[&str],
) -> Result<(), EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    let mut index = repo.load_index()?;

    for path in paths {
        let full = repo.work_dir().join(path);
        if full.is_file() {
            let oid = wt.hash_file(repo.odb(), path)?;
            index.stage(*path, oid)?;
        } else {
            index.clear(path);
        }
    }

    index.save(repo.paths())?;
    Ok(())
}

/// Create a commit from the staged tree.
///
/// Parents are the resolved `HEAD` (absent for a root commit) plus
/// `MERGE_HEAD` when a merge is being concluded. The branch `HEAD`
/// names is advanced with a compare-and-set against the old tip;
/// detached `HEAD` advances by oid. On success the in-progress refs
/// and the sentinel message file are cleared.
///
/// A commit whose tree equals its sole parent's tree reports
/// [`Outcome::Empty`] without mutating anything.
pub fn commit(repo: &Repository, clock: &dyn Clock, message: &str) -> Result<Outcome, EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    let index = repo.load_index()?;
    ensure_no_conflicts(&index)?;

    let tree = index.write_tree(repo.odb())?;
    let head = repo.head_oid()?;
    let merge_head = match repo.refs().read(&RefName::merge_head())? {
        Some(RefValue::Direct(oid)) => Some(oid),
        _ => None,
    };

    let mut parents = Vec::new();
    if let Some(head_oid) = &head {
        parents.push(head_oid.clone());
    }
    if let Some(merge_oid) = &merge_head {
        parents.push(merge_oid.clone());
    }

    // An unchanged tree is only "empty" outside a merge conclusion; a
    // merge commit records the second parent even when the tree is
    // identical.
    if merge_head.is_none() {
        if let Some(head_oid) = &head {
            if repo.odb().get_commit(head_oid)?.tree == tree {
                return Ok(Outcome::Empty);
            }
        }
    }

    let identity = repo.config()?.identity();
    let committer = clock.signature(&identity.name, &identity.email);
    let oid = create_commit(
        repo,
        tree,
        parents,
        committer.clone(),
        committer,
        message,
        head.as_ref(),
    )?;

    clear_in_progress(repo)?;
    log::info!("committed {}", oid.short(10));
    Ok(Outcome::Completed(oid))
}

/// Write a commit object and advance `HEAD` to it.
///
/// The advance is a compare-and-set against `expected_head`, so a
/// concurrent move of the branch fails the operation instead of
/// silently overwriting it.
pub(crate) fn create_commit(
    repo: &Repository,
    tree: Oid,
    parents: Vec<Oid>,
    author: Signature,
    committer: Signature,
    message: &str,
    expected_head: Option<&Oid>,
) -> Result<Oid, EngineError> {
    // Parents must already exist: the graph stays acyclic by
    // construction.
    for parent in &parents {
        if !repo.odb().exists(parent) {
            return Err(EngineError::NotFound(parent.to_string()));
        }
    }

    let mut message = message.to_string();
    if !message.ends_with('\n') {
        message.push('\n');
    }

    let commit = Commit {
        tree,
        parents,
        author,
        committer,
        message,
    };
    let oid = repo.odb().put(ObjectKind::Commit, &commit.to_bytes())?;

    repo.refs()
        .update_cas(&RefName::head(), &oid, expected_head)?;
    Ok(oid)
}

/// Clear every in-progress marker after a concluding commit.
pub(crate) fn clear_in_progress(repo: &Repository) -> Result<(), EngineError> {
    repo.refs().delete(&RefName::merge_head())?;
    repo.refs().delete(&RefName::cherry_pick_head())?;
    repo.refs().delete(&RefName::orig_head())?;
    let msg = repo.paths().merge_msg_path();
    if msg.exists() {
        std::fs::remove_file(&msg)?;
    }
    Ok(())
}

/// Refuse when staged or working state diverges from `HEAD`.
///
/// Used by operations that replay commits over the working tree and
/// would otherwise clobber uncommitted work. An unborn `HEAD` counts
/// as clean.
pub(crate) fn ensure_clean_worktree<W: WorkTree>(
    repo: &Repository,
    wt: &W,
    index: &Index,
) -> Result<(), EngineError> {
    let head = match repo.head_oid()? {
        Some(oid) => oid,
        None => return Ok(()),
    };

    let head_tree = repo.odb().get_commit(&head)?.tree;
    let head_flat = crate::odb::Tree::flatten(repo.odb(), &head_tree)?;
    let staged = index.clean_entries();

    if staged != head_flat {
        return Err(EngineError::DirtyWorktree("staged changes exist".into()));
    }

    let working = wt.snapshot()?;
    if working != staged {
        return Err(EngineError::DirtyWorktree("unstaged changes exist".into()));
    }

    Ok(())
}
