//! Strata - a content-addressed version control engine
//!
//! Strata stores snapshots of a working tree in an immutable object
//! database, names commits through a reference namespace, and mutates
//! the commit DAG through a small set of history operations: commit,
//! merge, cherry-pick, rebase, reset, fetch, and push.
//!
//! # Architecture
//!
//! The crate is layered, leaves first:
//!
//! - [`core`] - Domain types, path routing, config, time, and locking
//! - [`odb`] - Content-addressed object database (blobs, trees, commits)
//! - [`refs`] - Direct and symbolic refs with compare-and-set updates
//! - [`index`] - Staging area with multi-stage conflict entries
//! - [`merge`] - Tree diff, three-way tree merge, diff3 text merger
//! - [`engine`] - The history engine: DAG walks, the apply kernel,
//!   the rebase sequencer, reset
//! - [`remote`] - Reachability-walk transfer, fast-forward-safe push
//! - [`worktree`] - Working-tree adapter consumed by the engine
//! - [`repo`] - The repository handle tying the stores together
//!
//! # Correctness Invariants
//!
//! 1. Objects are immutable and content-addressed; writes are
//!    idempotent
//! 2. Every ref advance is a compare-and-set; a lost race aborts the
//!    operation instead of overwriting history
//! 3. Conflicts are staged state, never errors: a paused operation is
//!    always recoverable via continue or abort
//! 4. In-progress refs (`MERGE_HEAD`, `CHERRY_PICK_HEAD`, the
//!    sequencer file) exist exactly while the operation they mark is
//!    mid-flight

pub mod core;
pub mod engine;
pub mod index;
pub mod merge;
pub mod odb;
pub mod refs;
pub mod remote;
pub mod repo;
pub mod worktree;
