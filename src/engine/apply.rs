//! engine::apply
//!
//! The apply-commit kernel and the operations built on it: the merge
//! driver and cherry-pick with its continue/abort flow.
//!
//! # The kernel
//!
//! Merge, cherry-pick, and each rebase step share one function:
//! three-way merge the relevant trees, stage the result, synchronise
//! the working copy, and either finish with a commit or pause with the
//! conflicts staged and an in-progress ref set. Keeping empty-commit
//! detection, conflict staging, and in-progress-ref handling in one
//! place keeps the state machines honest.

use crate::core::clock::Clock;
use crate::core::lock::RepoLock;
use crate::core::types::{Oid, RefName, Signature};
use crate::merge::merge_trees;
use crate::refs::RefValue;
use crate::repo::Repository;
use crate::worktree::WorkTree;

use super::commit::{clear_in_progress, create_commit, ensure_clean_worktree};
use super::walk::merge_base;
use super::{
    ensure_no_conflicts, ensure_no_operation_in_progress, resolve_name, EngineError, Outcome,
};

/// How the kernel should conclude a clean apply.
pub(crate) struct FinishSpec {
    /// Parents of the commit to create.
    pub parents: Vec<Oid>,
    /// Preserved author, or `None` for the current identity.
    pub author: Option<Signature>,
    /// Commit message.
    pub message: String,
    /// Whether an unchanged tree still commits (merges do; picks
    /// skip).
    pub commit_when_empty: bool,
}

/// The in-progress ref the kernel sets when it pauses on conflict.
pub(crate) enum ConflictMark {
    CherryPick(Oid),
    Merge(Oid),
}

/// The shared apply kernel.
///
/// Three-way merges `base`/`ours`/`theirs`, stages the outcome into
/// the index, and synchronises the working copy. A clean result is
/// handed to [`finish_apply`]; conflicts pause the operation with the
/// appropriate in-progress ref and the sentinel message file written.
pub(crate) fn run_apply<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    clock: &dyn Clock,
    base: Option<&Oid>,
    ours: Option<&Oid>,
    theirs: Option<&Oid>,
    finish: FinishSpec,
    mark: ConflictMark,
) -> Result<Outcome, EngineError> {
    let merged = merge_trees(repo.odb(), base, ours, theirs)?;

    let mut index = repo.load_index()?;
    index.clear_all();
    for (path, entry) in merged.entries() {
        match entry {
            crate::merge::MergedEntry::Clean(oid) => index.stage(path, oid.clone())?,
            crate::merge::MergedEntry::Conflict(record) => index.stage_conflict(
                path,
                record.kind,
                record.base.clone(),
                record.head.clone(),
                record.other.clone(),
                record.merged.clone(),
            )?,
        }
    }
    index.save(repo.paths())?;

    wt.checkout_entries(repo.odb(), &merged.clean_entries())?;

    if merged.is_clean() {
        return finish_apply(repo, wt, clock, finish);
    }

    // Pause: materialise the marker files, set the in-progress ref,
    // leave the sentinel message for the finisher.
    let conflicts = merged.conflicts();
    for (path, record) in &conflicts {
        if let Some(marked) = &record.merged {
            let bytes = repo.odb().get_blob(marked)?;
            wt.write_conflict_markers(path, &bytes)?;
        }
    }

    match &mark {
        ConflictMark::CherryPick(oid) => {
            repo.refs().update(&RefName::cherry_pick_head(), oid)?
        }
        ConflictMark::Merge(oid) => repo.refs().update(&RefName::merge_head(), oid)?,
    }
    std::fs::write(repo.paths().merge_msg_path(), &finish.message)?;

    log::info!("apply paused on {} conflicted path(s)", conflicts.len());
    Ok(Outcome::Conflicted(
        conflicts
            .into_iter()
            .map(|(path, record)| (path, record.kind))
            .collect(),
    ))
}

/// Conclude an apply whose index is clean.
///
/// Detects the empty case (staged tree equals `HEAD`'s tree): the
/// working copy and index are restored to `HEAD` and the pick is
/// skipped. Otherwise a commit is created with the preserved author
/// and the given parents.
pub(crate) fn finish_apply<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    clock: &dyn Clock,
    finish: FinishSpec,
) -> Result<Outcome, EngineError> {
    let index = repo.load_index()?;
    ensure_no_conflicts(&index)?;
    let tree = index.write_tree(repo.odb())?;
    let head = repo.head_oid()?;

    if !finish.commit_when_empty {
        if let Some(head_oid) = &head {
            let head_tree = repo.odb().get_commit(head_oid)?.tree;
            if head_tree == tree {
                let mut index = repo.load_index()?;
                index.read_tree(repo.odb(), &head_tree)?;
                index.save(repo.paths())?;
                wt.checkout_tree(repo.odb(), &head_tree)?;
                return Ok(Outcome::Empty);
            }
        }
    }

    let identity = repo.config()?.identity();
    let committer = clock.signature(&identity.name, &identity.email);
    let author = finish.author.unwrap_or_else(|| committer.clone());

    let oid = create_commit(
        repo,
        tree,
        finish.parents,
        author,
        committer,
        &finish.message,
        head.as_ref(),
    )?;
    Ok(Outcome::Completed(oid))
}

/// Merge another line of history into `HEAD`.
///
/// Fast-forwards when `HEAD` is the merge base; reports
/// [`Outcome::Empty`] when the target is already reachable. Otherwise
/// sets `MERGE_HEAD`/`ORIG_HEAD` and runs the kernel with parents
/// `[HEAD, MERGE_HEAD]`; a clean merge commits immediately, a
/// conflicted one pauses for `commit` (conclude) or [`merge_abort`].
pub fn merge<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    clock: &dyn Clock,
    rev: &str,
) -> Result<Outcome, EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    ensure_no_operation_in_progress(repo)?;
    let index = repo.load_index()?;
    ensure_no_conflicts(&index)?;

    let other = resolve_name(repo, rev)?;
    let head = repo.head_oid()?.ok_or(EngineError::UnbornHead)?;

    if other == head {
        return Ok(Outcome::Empty);
    }
    let base = merge_base(repo.odb(), &head, &other)?
        .ok_or(EngineError::UnrelatedHistories)?;
    if base == other {
        // Already reachable from HEAD.
        return Ok(Outcome::Empty);
    }
    if base == head {
        // Fast-forward: advance the branch, no new commit.
        let target_tree = repo.odb().get_commit(&other)?.tree;
        let mut index = repo.load_index()?;
        index.read_tree(repo.odb(), &target_tree)?;
        index.save(repo.paths())?;
        wt.checkout_tree(repo.odb(), &target_tree)?;
        repo.refs()
            .update_cas(&RefName::head(), &other, Some(&head))?;
        log::info!("fast-forwarded to {}", other.short(10));
        return Ok(Outcome::FastForward(other));
    }

    repo.refs().update(&RefName::merge_head(), &other)?;
    repo.refs().update(&RefName::orig_head(), &head)?;

    let into = repo
        .current_branch()?
        .unwrap_or_else(|| "HEAD".to_string());
    let message = format!("Merge {rev} into {into}");

    let base_tree = repo.odb().get_commit(&base)?.tree;
    let our_tree = repo.odb().get_commit(&head)?.tree;
    let their_tree = repo.odb().get_commit(&other)?.tree;

    let outcome = run_apply(
        repo,
        wt,
        clock,
        Some(&base_tree),
        Some(&our_tree),
        Some(&their_tree),
        FinishSpec {
            parents: vec![head.clone(), other.clone()],
            author: None,
            message,
            commit_when_empty: true,
        },
        ConflictMark::Merge(other),
    )?;

    if let Outcome::Completed(oid) = &outcome {
        clear_in_progress(repo)?;
        log::info!("merged as {}", oid.short(10));
    }
    Ok(outcome)
}

/// Abort an unfinished merge, restoring `ORIG_HEAD`.
pub fn merge_abort<W: WorkTree>(repo: &Repository, wt: &mut W) -> Result<(), EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    if !matches!(
        repo.refs().read(&RefName::merge_head())?,
        Some(RefValue::Direct(_))
    ) {
        return Err(EngineError::NoOperationInProgress("merge"));
    }
    let orig = match repo.refs().read(&RefName::orig_head())? {
        Some(RefValue::Direct(oid)) => oid,
        _ => return Err(EngineError::MissingOrigHead),
    };

    super::reset::reset_to(repo, wt, &orig, super::ResetMode::Hard)?;
    clear_in_progress(repo)?;
    log::info!("merge aborted; restored {}", orig.short(10));
    Ok(())
}

/// Apply a single commit onto `HEAD`, preserving its author and
/// message.
///
/// Conflicts pause with `CHERRY_PICK_HEAD` set; resolve and
/// [`cherry_pick_continue`], or [`cherry_pick_abort`]. Merge commits
/// are refused (no mainline selection) as are root commits (no base).
pub fn cherry_pick<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    clock: &dyn Clock,
    rev: &str,
) -> Result<Outcome, EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    ensure_no_operation_in_progress(repo)?;
    let index = repo.load_index()?;
    ensure_no_conflicts(&index)?;
    ensure_clean_worktree(repo, wt, &index)?;

    let pick = resolve_name(repo, rev)?;
    let picked = repo.odb().get_commit(&pick)?;
    if picked.is_merge() {
        return Err(EngineError::CannotApplyMerge(pick));
    }
    let parent = picked
        .first_parent()
        .ok_or_else(|| EngineError::CannotApplyRoot(pick.clone()))?;

    let head = repo.head_oid()?.ok_or(EngineError::UnbornHead)?;
    repo.refs().update(&RefName::orig_head(), &head)?;

    let base_tree = repo.odb().get_commit(parent)?.tree;
    let our_tree = repo.odb().get_commit(&head)?.tree;

    let outcome = run_apply(
        repo,
        wt,
        clock,
        Some(&base_tree),
        Some(&our_tree),
        Some(&picked.tree),
        FinishSpec {
            parents: vec![head],
            author: Some(picked.author.clone()),
            message: picked.message.clone(),
            commit_when_empty: false,
        },
        ConflictMark::CherryPick(pick.clone()),
    )?;

    match &outcome {
        Outcome::Conflicted(_) => {
            log::info!("cherry-pick of {} paused on conflicts", pick.short(10));
        }
        Outcome::Completed(new_oid) => {
            clear_in_progress(repo)?;
            log::info!("cherry-picked {} as {}", pick.short(10), new_oid.short(10));
        }
        _ => clear_in_progress(repo)?,
    }
    Ok(outcome)
}

/// Conclude a cherry-pick after conflict resolution.
pub fn cherry_pick_continue<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    clock: &dyn Clock,
) -> Result<Outcome, EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    let pick = match repo.refs().read(&RefName::cherry_pick_head())? {
        Some(RefValue::Direct(oid)) => oid,
        _ => return Err(EngineError::NoOperationInProgress("cherry-pick")),
    };
    let index = repo.load_index()?;
    ensure_no_conflicts(&index)?;

    let picked = repo.odb().get_commit(&pick)?;
    let head = repo.head_oid()?.ok_or(EngineError::UnbornHead)?;

    let outcome = finish_apply(
        repo,
        wt,
        clock,
        FinishSpec {
            parents: vec![head],
            author: Some(picked.author),
            message: picked.message,
            commit_when_empty: false,
        },
    )?;
    clear_in_progress(repo)?;
    Ok(outcome)
}

/// Abort an unfinished cherry-pick, restoring `ORIG_HEAD`.
pub fn cherry_pick_abort<W: WorkTree>(repo: &Repository, wt: &mut W) -> Result<(), EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    if !matches!(
        repo.refs().read(&RefName::cherry_pick_head())?,
        Some(RefValue::Direct(_))
    ) {
        return Err(EngineError::NoOperationInProgress("cherry-pick"));
    }
    let orig = match repo.refs().read(&RefName::orig_head())? {
        Some(RefValue::Direct(oid)) => oid,
        _ => return Err(EngineError::MissingOrigHead),
    };

    super::reset::reset_to(repo, wt, &orig, super::ResetMode::Hard)?;
    clear_in_progress(repo)?;
    log::info!("cherry-pick aborted; restored {}", orig.short(10));
    Ok(())
}
