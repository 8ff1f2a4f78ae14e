//! engine::reset
//!
//! Moving `HEAD`: reset in its three strengths, and checkout.

use crate::core::lock::RepoLock;
use crate::core::types::{Oid, RefName};
use crate::repo::Repository;
use crate::worktree::WorkTree;

use super::{ensure_no_conflicts, resolve_name, EngineError};

/// How much state a reset rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Move `HEAD` only.
    Soft,
    /// Move `HEAD` and reload the index from the target tree.
    Mixed,
    /// Additionally overwrite the working tree.
    Hard,
}

/// Reset `HEAD` to a revision.
///
/// When `HEAD` is symbolic the branch it names moves; a detached
/// `HEAD` moves by oid.
pub fn reset<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    rev: &str,
    mode: ResetMode,
) -> Result<(), EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    let target = resolve_name(repo, rev)?;
    reset_to(repo, wt, &target, mode)
}

/// Lock-free worker shared with the abort flows.
pub(crate) fn reset_to<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    target: &Oid,
    mode: ResetMode,
) -> Result<(), EngineError> {
    let commit = repo.odb().get_commit(target)?;

    repo.refs().update(&RefName::head(), target)?;

    if mode != ResetMode::Soft {
        let mut index = repo.load_index()?;
        index.read_tree(repo.odb(), &commit.tree)?;
        index.save(repo.paths())?;
    }
    if mode == ResetMode::Hard {
        wt.checkout_tree(repo.odb(), &commit.tree)?;
    }

    log::info!("reset {:?} to {}", mode, target.short(10));
    Ok(())
}

/// Switch the working copy to a revision.
///
/// A branch name leaves `HEAD` symbolic on that branch; anything else
/// detaches `HEAD` at the resolved commit. Refused while conflicts
/// are staged.
pub fn checkout<W: WorkTree>(
    repo: &Repository,
    wt: &mut W,
    name: &str,
) -> Result<(), EngineError> {
    let _lock = RepoLock::acquire(repo.paths())?;
    let index = repo.load_index()?;
    ensure_no_conflicts(&index)?;

    let target = resolve_name(repo, name)?;
    let commit = repo.odb().get_commit(&target)?;

    let mut index = repo.load_index()?;
    index.read_tree(repo.odb(), &commit.tree)?;
    index.save(repo.paths())?;
    wt.checkout_tree(repo.odb(), &commit.tree)?;

    if repo.branch_exists(name).unwrap_or(false) {
        repo.refs()
            .set_symbolic(&RefName::head(), &RefName::branch(name)?)?;
    } else {
        repo.refs().set_detached(&RefName::head(), &target)?;
    }

    log::info!("checked out {name}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::engine::{commit, stage, Outcome};
    use crate::refs::RefValue;
    use std::fs;
    use tempfile::TempDir;

    fn clock() -> FixedClock {
        FixedClock::new(1700000000, "+0000")
    }

    fn fixture() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn commit_file(repo: &Repository, dir: &TempDir, path: &str, content: &str, msg: &str) -> Oid {
        let mut wt = repo.work_tree();
        fs::write(dir.path().join(path), content).unwrap();
        stage(repo, &mut wt, &[path]).unwrap();
        match commit(repo, &clock(), msg).unwrap() {
            Outcome::Completed(oid) => oid,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn soft_reset_moves_head_only() {
        let (dir, repo) = fixture();
        let first = commit_file(&repo, &dir, "a.txt", "1\n", "c1");
        commit_file(&repo, &dir, "a.txt", "2\n", "c2");

        let mut wt = repo.work_tree();
        reset(&repo, &mut wt, first.as_str(), ResetMode::Soft).unwrap();

        assert_eq!(repo.head_oid().unwrap(), Some(first));
        // Index and working tree still hold the second version.
        let index = repo.load_index().unwrap();
        let staged = index.clean_entries();
        let blob = &staged["a.txt"];
        assert_eq!(repo.odb().get_blob(blob).unwrap(), b"2\n");
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"2\n");
    }

    #[test]
    fn mixed_reset_reloads_index() {
        let (dir, repo) = fixture();
        let first = commit_file(&repo, &dir, "a.txt", "1\n", "c1");
        commit_file(&repo, &dir, "a.txt", "2\n", "c2");

        let mut wt = repo.work_tree();
        reset(&repo, &mut wt, first.as_str(), ResetMode::Mixed).unwrap();

        let index = repo.load_index().unwrap();
        let blob = &index.clean_entries()["a.txt"];
        assert_eq!(repo.odb().get_blob(blob).unwrap(), b"1\n");
        // Working tree untouched.
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"2\n");
    }

    #[test]
    fn hard_reset_overwrites_working_tree() {
        let (dir, repo) = fixture();
        let first = commit_file(&repo, &dir, "a.txt", "1\n", "c1");
        commit_file(&repo, &dir, "a.txt", "2\n", "c2");

        let mut wt = repo.work_tree();
        reset(&repo, &mut wt, first.as_str(), ResetMode::Hard).unwrap();
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"1\n");
    }

    #[test]
    fn reset_moves_branch_through_symbolic_head() {
        let (dir, repo) = fixture();
        let first = commit_file(&repo, &dir, "a.txt", "1\n", "c1");
        commit_file(&repo, &dir, "a.txt", "2\n", "c2");

        let mut wt = repo.work_tree();
        reset(&repo, &mut wt, first.as_str(), ResetMode::Hard).unwrap();

        assert_eq!(repo.current_branch().unwrap(), Some("main".into()));
        assert_eq!(
            repo.refs()
                .resolve(&RefName::branch("main").unwrap())
                .unwrap(),
            first
        );
    }

    #[test]
    fn checkout_branch_keeps_head_symbolic() {
        let (dir, repo) = fixture();
        let first = commit_file(&repo, &dir, "a.txt", "1\n", "c1");
        repo.create_branch("other", &first).unwrap();
        commit_file(&repo, &dir, "a.txt", "2\n", "c2");

        let mut wt = repo.work_tree();
        checkout(&repo, &mut wt, "other").unwrap();

        assert_eq!(repo.current_branch().unwrap(), Some("other".into()));
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"1\n");
    }

    #[test]
    fn checkout_oid_detaches_head() {
        let (dir, repo) = fixture();
        let first = commit_file(&repo, &dir, "a.txt", "1\n", "c1");
        commit_file(&repo, &dir, "a.txt", "2\n", "c2");

        let mut wt = repo.work_tree();
        checkout(&repo, &mut wt, first.as_str()).unwrap();

        assert_eq!(repo.current_branch().unwrap(), None);
        assert_eq!(
            repo.refs().read(&RefName::head()).unwrap(),
            Some(RefValue::Direct(first))
        );
    }

    #[test]
    fn checkout_refused_with_conflicts() {
        let (dir, repo) = fixture();
        let first = commit_file(&repo, &dir, "a.txt", "1\n", "c1");

        let mut index = repo.load_index().unwrap();
        index
            .stage_conflict(
                "a.txt",
                crate::core::types::ConflictKind::ContentConflict,
                None,
                None,
                None,
                None,
            )
            .unwrap();
        index.save(repo.paths()).unwrap();

        let mut wt = repo.work_tree();
        assert!(matches!(
            checkout(&repo, &mut wt, first.as_str()),
            Err(EngineError::ConflictsPending(_))
        ));
    }
}
