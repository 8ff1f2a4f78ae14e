//! core::lock
//!
//! Exclusive repository lock for mutating operations.
//!
//! # Architecture
//!
//! The repository is designed for a single mutating actor at a time.
//! Every operation that rewrites the index or drives a multi-step state
//! machine takes this lock first, so two concurrent commands cannot
//! interleave index saves or sequencer updates.
//!
//! # Invariants
//!
//! - The lock is held for the whole operation
//! - The lock is released on drop (RAII), including on panic
//! - Acquisition is non-blocking and fails fast when contended
//!
//! # Example
//!
//! ```ignore
//! let lock = RepoLock::acquire(&paths)?;
//! // mutate index / refs / sequencer state
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::RepoPaths;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("repository is locked by another process")]
    AlreadyLocked,

    /// Failed to create the lock file or its directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
}

/// An exclusive lock on the repository.
///
/// Released when dropped.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    file: Option<File>,
}

impl RepoLock {
    /// Attempt to acquire the repository lock.
    ///
    /// Uses OS-level file locking via `fs2`, which works across
    /// processes. Non-blocking: returns [`LockError::AlreadyLocked`]
    /// immediately when contended.
    pub fn acquire(paths: &RepoPaths) -> Result<Self, LockError> {
        let repo_dir = paths.repo_dir();
        fs::create_dir_all(&repo_dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", repo_dir.display(), e))
        })?;

        let path = paths.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Whether this guard currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Path to the lock file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            // Unlock errors on drop are unreportable; the OS releases
            // the lock when the handle closes anyway.
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_paths() -> (TempDir, RepoPaths) {
        let dir = TempDir::new().unwrap();
        let paths = RepoPaths::new(dir.path());
        (dir, paths)
    }

    #[test]
    fn acquire_and_release() {
        let (_dir, paths) = temp_paths();
        let lock = RepoLock::acquire(&paths).unwrap();
        assert!(lock.is_held());
        drop(lock);

        // Re-acquirable after release.
        let lock = RepoLock::acquire(&paths).unwrap();
        assert!(lock.is_held());
    }

    #[test]
    fn contended_lock_fails_fast() {
        let (_dir, paths) = temp_paths();
        let _held = RepoLock::acquire(&paths).unwrap();
        assert!(matches!(
            RepoLock::acquire(&paths),
            Err(LockError::AlreadyLocked)
        ));
    }

    #[test]
    fn creates_repo_dir_if_missing() {
        let dir = TempDir::new().unwrap();
        let paths = RepoPaths::new(dir.path().join("nested"));
        let lock = RepoLock::acquire(&paths).unwrap();
        assert!(lock.path().exists());
    }
}
