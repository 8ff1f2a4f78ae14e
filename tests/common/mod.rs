//! Shared fixture for integration tests: a real repository in a
//! temporary directory with staging/commit helpers.

// Each integration binary uses a different subset of the helpers.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use strata::core::clock::FixedClock;
use strata::core::types::Oid;
use strata::engine::{self, Outcome};
use strata::repo::Repository;
use strata::worktree::FsWorkTree;

/// A repository under a temp directory.
pub struct TestRepo {
    dir: TempDir,
    pub repo: Repository,
}

impl TestRepo {
    /// Create a repository with a configured identity.
    pub fn new() -> Self {
        Self::with_identity("Test User", "test@example.com")
    }

    /// Create a repository with a specific identity.
    pub fn with_identity(name: &str, email: &str) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let repo = Repository::init(dir.path()).expect("failed to init repo");
        let fixture = Self { dir, repo };
        fixture.set_identity(name, email);
        fixture
    }

    /// Rewrite the configured identity.
    pub fn set_identity(&self, name: &str, email: &str) {
        let mut config = self.repo.config().unwrap();
        config.set("user.name", name);
        config.set("user.email", email);
        config.save(self.repo.paths()).unwrap();
    }

    /// The working tree root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A working-tree adapter.
    pub fn work_tree(&self) -> FsWorkTree {
        self.repo.work_tree()
    }

    /// A deterministic clock.
    pub fn clock(&self) -> FixedClock {
        FixedClock::new(1700000000, "+0000")
    }

    /// Write a working file.
    pub fn write_file(&self, path: &str, content: &str) {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    /// Read a working file.
    pub fn read_file(&self, path: &str) -> String {
        String::from_utf8(fs::read(self.dir.path().join(path)).unwrap()).unwrap()
    }

    /// Whether a working file exists.
    pub fn file_exists(&self, path: &str) -> bool {
        self.dir.path().join(path).exists()
    }

    /// Delete a working file.
    pub fn remove_file(&self, path: &str) {
        fs::remove_file(self.dir.path().join(path)).unwrap();
    }

    /// Stage paths.
    pub fn stage(&self, paths: &[&str]) {
        let mut wt = self.work_tree();
        engine::stage(&self.repo, &mut wt, paths).unwrap();
    }

    /// Stage and commit one file, returning the commit oid.
    pub fn commit_file(&self, path: &str, content: &str, message: &str) -> Oid {
        self.write_file(path, content);
        self.stage(&[path]);
        self.commit(message)
    }

    /// Commit the staged state, expecting a new commit.
    pub fn commit(&self, message: &str) -> Oid {
        match engine::commit(&self.repo, &self.clock(), message).unwrap() {
            Outcome::Completed(oid) => oid,
            other => panic!("expected a commit, got {other:?}"),
        }
    }

    /// Create a branch at the current HEAD.
    pub fn branch(&self, name: &str) {
        let head = self.repo.head_oid().unwrap().expect("HEAD is unborn");
        self.repo.create_branch(name, &head).unwrap();
    }

    /// Check out a branch or revision.
    pub fn checkout(&self, name: &str) {
        let mut wt = self.work_tree();
        engine::checkout(&self.repo, &mut wt, name).unwrap();
    }

    /// Resolve a revision string.
    pub fn resolve(&self, name: &str) -> Oid {
        engine::resolve_name(&self.repo, name).unwrap()
    }
}
