//! engine
//!
//! The history engine: every operation that reads or mutates the
//! commit DAG.
//!
//! # Architecture
//!
//! Operations are free functions taking a [`Repository`] plus, when
//! they synchronise files, a [`WorkTree`] adapter and a [`Clock`].
//! Each mutating operation acquires the exclusive repository lock on
//! entry and works through internal helpers only, so the lock is never
//! taken twice.
//!
//! Success shapes are the [`Outcome`] enum; failures are
//! [`EngineError`]. Merge conflicts are an outcome, not an error: the
//! operation stages them and halts cleanly, leaving `--continue` or
//! `--abort` as the legal next steps.
//!
//! # Modules
//!
//! - [`walk`] - merge-base, ancestry, and closure traversals
//! - [`commit`] - staging, commit creation, the shared finisher
//! - [`apply`] - the apply-commit kernel, merge driver, cherry-pick
//! - [`sequencer`] - persisted rebase state, continue/abort
//! - [`reset`] - reset modes and checkout

pub mod apply;
pub mod commit;
pub mod reset;
pub mod sequencer;
pub mod walk;

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::lock::LockError;
use crate::core::types::{ConflictKind, Oid, RefName, TypeError};
use crate::index::IndexError;
use crate::merge::MergeError;
use crate::odb::OdbError;
use crate::refs::{RefError, RefValue};
use crate::repo::Repository;
use crate::worktree::WorktreeError;

pub use apply::{cherry_pick, cherry_pick_abort, cherry_pick_continue, merge, merge_abort};
pub use commit::{commit, stage};
pub use reset::{checkout, reset, ResetMode};
pub use sequencer::{rebase, rebase_abort, rebase_continue, SequencerState};
pub use walk::{is_ancestor, merge_base};

/// How an operation concluded when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A commit was created or the operation finished at this commit.
    Completed(Oid),
    /// The branch advanced to an existing descendant; no commit was
    /// created.
    FastForward(Oid),
    /// Conflicts were staged into the index; the repository is paused
    /// mid-operation.
    Conflicted(Vec<(String, ConflictKind)>),
    /// There was nothing to do (tree unchanged, or already up to
    /// date).
    Empty,
}

impl Outcome {
    /// The resulting commit for `Completed`/`FastForward`.
    pub fn commit_oid(&self) -> Option<&Oid> {
        match self {
            Outcome::Completed(oid) | Outcome::FastForward(oid) => Some(oid),
            _ => None,
        }
    }

    /// Whether the operation paused on conflicts.
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Outcome::Conflicted(_))
    }
}

/// Errors surfaced by history operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A name did not resolve to a known ref or object.
    #[error("unknown revision: {0}")]
    NotFound(String),

    /// The index holds unresolved conflicts.
    #[error("unresolved conflicts in: {}", .0.join(", "))]
    ConflictsPending(Vec<String>),

    /// Another multi-step operation is mid-flight.
    #[error("a {0} is already in progress")]
    OperationInProgress(&'static str),

    /// `--continue`/`--abort` with nothing pending.
    #[error("no {0} in progress")]
    NoOperationInProgress(&'static str),

    /// Uncommitted changes preclude the operation.
    #[error("working tree is not clean: {0}")]
    DirtyWorktree(String),

    /// `HEAD` does not resolve to a commit yet.
    #[error("HEAD does not point at a commit yet")]
    UnbornHead,

    /// The two commits share no history.
    #[error("refusing to operate across unrelated histories")]
    UnrelatedHistories,

    /// The commit is a merge and no mainline parent was specified.
    #[error("cannot apply merge commit {0} without a mainline parent")]
    CannotApplyMerge(Oid),

    /// The commit has no parent to use as a merge base.
    #[error("cannot apply root commit {0}")]
    CannotApplyRoot(Oid),

    /// `ORIG_HEAD` is missing, so there is no state to restore.
    #[error("ORIG_HEAD missing; cannot abort")]
    MissingOrigHead,

    #[error(transparent)]
    Odb(#[from] OdbError),

    #[error(transparent)]
    Ref(#[from] RefError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Worktree(#[from] WorktreeError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed sequencer state: {0}")]
    SequencerState(#[from] serde_json::Error),
}

/// Resolve a revision string to an oid.
///
/// `@` is an alias for `HEAD`. Names are tried as a full ref, then
/// under `refs/`, `refs/tags/`, and `refs/heads/`; a 40-hex string
/// naming an existing object resolves to itself.
pub fn resolve_name(repo: &Repository, name: &str) -> Result<Oid, EngineError> {
    let name = if name == "@" { "HEAD" } else { name };

    let candidates = [
        name.to_string(),
        format!("refs/{name}"),
        format!("refs/tags/{name}"),
        format!("refs/heads/{name}"),
    ];
    for candidate in &candidates {
        if let Ok(refname) = RefName::new(candidate.clone()) {
            if repo.refs().exists(&refname) {
                if let Some(oid) = repo.refs().try_resolve(&refname)? {
                    return Ok(oid);
                }
            }
        }
    }

    if let Ok(oid) = Oid::new(name) {
        if repo.odb().exists(&oid) {
            return Ok(oid);
        }
    }

    Err(EngineError::NotFound(name.to_string()))
}

/// The multi-step operation currently in progress, if any.
pub fn operation_in_progress(repo: &Repository) -> Result<Option<&'static str>, EngineError> {
    if sequencer::SequencerState::load(repo.paths())?.is_some() {
        return Ok(Some("rebase"));
    }
    if matches!(
        repo.refs().read(&RefName::merge_head())?,
        Some(RefValue::Direct(_))
    ) {
        return Ok(Some("merge"));
    }
    if matches!(
        repo.refs().read(&RefName::cherry_pick_head())?,
        Some(RefValue::Direct(_))
    ) {
        return Ok(Some("cherry-pick"));
    }
    Ok(None)
}

/// Refuse to start a new multi-step operation while one is mid-flight.
pub(crate) fn ensure_no_operation_in_progress(repo: &Repository) -> Result<(), EngineError> {
    match operation_in_progress(repo)? {
        Some(op) => Err(EngineError::OperationInProgress(op)),
        None => Ok(()),
    }
}

/// Refuse while the index holds unresolved conflicts.
pub(crate) fn ensure_no_conflicts(index: &crate::index::Index) -> Result<(), EngineError> {
    if index.has_conflicts() {
        return Err(EngineError::ConflictsPending(index.conflict_paths()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn clock() -> FixedClock {
        FixedClock::new(1700000000, "+0000")
    }

    #[test]
    fn resolve_unknown_name_fails() {
        let (_dir, repo) = fixture();
        assert!(matches!(
            resolve_name(&repo, "nope"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn resolve_branch_and_aliases() {
        let (dir, repo) = fixture();
        let mut wt = repo.work_tree();
        std::fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        stage(&repo, &mut wt, &["a.txt"]).unwrap();
        let head = match commit(&repo, &clock(), "c1").unwrap() {
            Outcome::Completed(oid) => oid,
            other => panic!("unexpected outcome {other:?}"),
        };

        assert_eq!(resolve_name(&repo, "main").unwrap(), head);
        assert_eq!(resolve_name(&repo, "heads/main").unwrap(), head);
        assert_eq!(resolve_name(&repo, "HEAD").unwrap(), head);
        assert_eq!(resolve_name(&repo, "@").unwrap(), head);
        assert_eq!(resolve_name(&repo, head.as_str()).unwrap(), head);
    }

    #[test]
    fn resolve_oid_requires_existing_object() {
        let (_dir, repo) = fixture();
        let missing = "d".repeat(40);
        assert!(matches!(
            resolve_name(&repo, &missing),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn no_operation_in_fresh_repo() {
        let (_dir, repo) = fixture();
        assert_eq!(operation_in_progress(&repo).unwrap(), None);
    }
}
