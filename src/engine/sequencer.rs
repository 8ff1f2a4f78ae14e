//! engine::sequencer
//!
//! Rebase: replaying a line of commits onto a new upstream, with
//! persisted state so a conflict can pause the sequence and
//! `--continue`/`--abort` recover it, across process restarts.
//!
//! # Storage
//!
//! The state lives at `.R/REBASE_STATE` as JSON, rewritten with fsync
//! after every replayed commit. Its presence is the crash-safe marker
//! that a rebase is mid-flight; `ORIG_HEAD` carries the tip to restore
//! on abort.

use std::fs::{self, OpenOptions};
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::core::clock::Clock;
use crate::core::lock::RepoLock;
use crate::core::paths::RepoPaths;
use crate::core::types::{Oid, RefName};
use crate::repo::Repository;
use crate::worktree::WorkTree;

use super::apply::{finish_apply, run_apply, ConflictMark, FinishSpec};
use super::commit::ensure_clean_worktree;
use super::reset::{reset_to, ResetMode};
use super::walk::{first_parent_chain, merge_base};
use super::{
    ensure_no_conflicts, ensure_no_operation_in_progress, resolve_name, EngineError, Outcome,
};

/// Persisted rebase state: the pending pick list and a cursor into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerState {
    /// The tip the rebased branch started at; restored on abort.
    pub orig_head: Oid,
    /// The commit the line is being replayed onto.
    pub upstream: Oid,
    /// Commits to replay, oldest first.
    pub pending: Vec<Oid>,
    /// Index of the next (or currently conflicted) pick.
    pub cursor: usize,
    /// When the rebase started, epoch seconds.
    pub started_at: i64,
}

impl SequencerState {
    /// The pick the cursor points at, if the sequence is unfinished.
    pub fn current(&self) -> Option<&Oid> {
        self.pending.get(self.cursor)
    }

    /// Read the persisted state, `None` when no rebase is in progress.
    pub fn load(paths: &RepoPaths) -> Result<Option<Self>, EngineError> {
        let path = paths.sequencer_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Persist with fsync; called after every replay step so a crash
    /// resumes at the right pick.
    pub fn save(&self, paths: &RepoPaths) -> Result<(), EngineError> {
        let path = paths.sequencer_path();
        let content = serde_json::to_string_pretty(self)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Remove the persisted state.
    pub fn delete(paths: &RepoPaths) -> Result<(), EngineError> {
        let path = paths.sequencer_path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Rebase the current line of development onto `upstream`.
///
/// The pick list is the first-parent chain from `HEAD` back to the
/// merge base, replayed oldest-first on top of `upstream`. A conflict
/// pauses with the sequencer state persisted; [`rebase_continue`]
/// resumes after resolution and [`rebase_abort`] restores the original
/// tip. Merge commits in the list are refused; empty picks are
/// skipped.
pub fn rebase<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    clock: &dyn Clock,
    upstream_rev: &str,
) -> Result<Outcome, EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    ensure_no_operation_in_progress(repo)?;
    let index = repo.load_index()?;
    ensure_no_conflicts(&index)?;
    ensure_clean_worktree(repo, wt, &index)?;

    let upstream = resolve_name(repo, upstream_rev)?;
    let head = repo.head_oid()?.ok_or(EngineError::UnbornHead)?;

    let base = merge_base(repo.odb(), &head, &upstream)?
        .ok_or(EngineError::UnrelatedHistories)?;
    if base == upstream || head == upstream {
        // Upstream contributes nothing new.
        return Ok(Outcome::Empty);
    }

    let pending = first_parent_chain(repo.odb(), &head, &base)?;
    if pending.is_empty() {
        return Ok(Outcome::Empty);
    }
    for pick in &pending {
        if repo.odb().get_commit(pick)?.is_merge() {
            return Err(EngineError::CannotApplyMerge(pick.clone()));
        }
    }

    log::info!(
        "rebasing {} commit(s) onto {}",
        pending.len(),
        upstream.short(10)
    );

    repo.refs().update(&RefName::orig_head(), &head)?;
    let state = SequencerState {
        orig_head: head,
        upstream: upstream.clone(),
        pending,
        cursor: 0,
        started_at: clock.now().0,
    };
    state.save(repo.paths())?;

    reset_to(repo, wt, &upstream, ResetMode::Hard)?;
    replay(repo, wt, clock, state)
}

/// Resume a paused rebase after conflicts were resolved and staged.
pub fn rebase_continue<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    clock: &dyn Clock,
) -> Result<Outcome, EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    let mut state = SequencerState::load(repo.paths())?
        .ok_or(EngineError::NoOperationInProgress("rebase"))?;
    let index = repo.load_index()?;
    ensure_no_conflicts(&index)?;

    // Conclude the pick the sequence paused on.
    if let Some(pick) = state.current().cloned() {
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
        match outcome {
            Outcome::Completed(oid) => log::info!("applied {} as {}", pick.short(10), oid.short(10)),
            Outcome::Empty => log::info!("skipped {} (empty)", pick.short(10)),
            _ => {}
        }
        repo.refs().delete(&RefName::cherry_pick_head())?;
        state.cursor += 1;
        state.save(repo.paths())?;
    }

    replay(repo, wt, clock, state)
}

/// Abort a rebase, restoring the branch to where it started.
pub fn rebase_abort<W: WorkTree>(repo: &Repository, wt: &mut W) -> Result<(), EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    let state = SequencerState::load(repo.paths())?
        .ok_or(EngineError::NoOperationInProgress("rebase"))?;

    reset_to(repo, wt, &state.orig_head, ResetMode::Hard)?;
    cleanup(repo)?;
    log::info!("rebase aborted; restored {}", state.orig_head.short(10));
    Ok(())
}

/// Replay pending picks until done or a conflict pauses the sequence.
fn replay<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    clock: &dyn Clock,
    mut state: SequencerState,
) -> Result<Outcome, EngineError> {
    while let Some(pick) = state.current().cloned() {
        let picked = repo.odb().get_commit(&pick)?;
        let parent = picked
            .first_parent()
            .ok_or_else(|| EngineError::CannotApplyRoot(pick.clone()))?;
        let head = repo.head_oid()?.ok_or(EngineError::UnbornHead)?;

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

        match outcome {
            Outcome::Conflicted(conflicts) => {
                // Cursor stays on the conflicted pick for continue.
                state.save(repo.paths())?;
                log::info!("rebase paused on {}", pick.short(10));
                return Ok(Outcome::Conflicted(conflicts));
            }
            Outcome::Completed(oid) => {
                log::info!("applied {} as {}", pick.short(10), oid.short(10));
            }
            Outcome::Empty => {
                log::info!("skipped {} (empty)", pick.short(10));
            }
            Outcome::FastForward(_) => unreachable!("apply never fast-forwards"),
        }

        state.cursor += 1;
        state.save(repo.paths())?;
    }

    let final_head = repo.head_oid()?.ok_or(EngineError::UnbornHead)?;
    cleanup(repo)?;
    log::info!("rebase complete at {}", final_head.short(10));
    Ok(Outcome::Completed(final_head))
}

/// Remove every rebase marker.
fn cleanup(repo: &Repository) -> Result<(), EngineError> {
    SequencerState::delete(repo.paths())?;
    repo.refs().delete(&RefName::orig_head())?;
    repo.refs().delete(&RefName::cherry_pick_head())?;
    let msg = repo.paths().merge_msg_path();
    if msg.exists() {
        fs::remove_file(&msg)?;
    }
    Ok(())
}
