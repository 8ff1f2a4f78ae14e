//! merge
//!
//! Tree comparison and reconciliation: the pairwise tree diff, the
//! line-level diff3 textual merger, and the three-way tree merge with
//! its typed conflict classification.

pub mod diff;
pub mod text;
pub mod trees;

pub use diff::{diff, DiffEntry};
pub use text::{merge3, TextMerge};
pub use trees::{merge_trees, ConflictRecord, MergeError, MergedEntry, TreeMerge};
