//! merge::diff
//!
//! Pairwise tree comparison.
//!
//! The diff is a synchronised recursive walk over the sorted entries of
//! two trees. Subtrees with equal oids are pruned without descending;
//! a record is produced for every file path whose oids differ or that
//! exists on only one side.

use crate::core::types::Oid;
use crate::odb::{EntryKind, ObjectStore, OdbError, Tree};

/// One changed path.
///
/// `a`/`b` are the blob oids on each side; `None` means the path is
/// absent there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: String,
    pub a: Option<Oid>,
    pub b: Option<Oid>,
}

/// Compare two trees, returning changed file paths sorted by path.
///
/// `None` on either side stands for the empty tree.
pub fn diff(
    odb: &ObjectStore,
    a: Option<&Oid>,
    b: Option<&Oid>,
) -> Result<Vec<DiffEntry>, OdbError> {
    let mut out = Vec::new();
    walk(odb, a, b, "", &mut out)?;
    out.sort_by(|x, y| x.path.cmp(&y.path));
    Ok(out)
}

fn walk(
    odb: &ObjectStore,
    a: Option<&Oid>,
    b: Option<&Oid>,
    prefix: &str,
    out: &mut Vec<DiffEntry>,
) -> Result<(), OdbError> {
    if a == b {
        return Ok(());
    }

    let empty = Tree::default();
    let tree_a = match a {
        Some(oid) => odb.get_tree(oid)?,
        None => empty.clone(),
    };
    let tree_b = match b {
        Some(oid) => odb.get_tree(oid)?,
        None => empty,
    };

    let mut iter_a = tree_a.entries().iter().peekable();
    let mut iter_b = tree_b.entries().iter().peekable();

    loop {
        let ordering = match (iter_a.peek(), iter_b.peek()) {
            (None, None) => break,
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (Some(ea), Some(eb)) => ea.name.cmp(&eb.name),
        };

        match ordering {
            std::cmp::Ordering::Less => {
                let entry = iter_a.next().expect("peeked");
                one_sided(odb, entry, prefix, Side::A, out)?;
            }
            std::cmp::Ordering::Greater => {
                let entry = iter_b.next().expect("peeked");
                one_sided(odb, entry, prefix, Side::B, out)?;
            }
            std::cmp::Ordering::Equal => {
                let ea = iter_a.next().expect("peeked");
                let eb = iter_b.next().expect("peeked");
                let path = join(prefix, &ea.name);
                match (ea.kind, eb.kind) {
                    (EntryKind::Blob, EntryKind::Blob) => {
                        if ea.oid != eb.oid {
                            out.push(DiffEntry {
                                path,
                                a: Some(ea.oid.clone()),
                                b: Some(eb.oid.clone()),
                            });
                        }
                    }
                    (EntryKind::Tree, EntryKind::Tree) => {
                        walk(odb, Some(&ea.oid), Some(&eb.oid), &path, out)?;
                    }
                    // A file replaced by a directory (or vice versa) is
                    // a removal on one side plus additions on the other.
                    (EntryKind::Blob, EntryKind::Tree) => {
                        out.push(DiffEntry {
                            path: path.clone(),
                            a: Some(ea.oid.clone()),
                            b: None,
                        });
                        walk(odb, None, Some(&eb.oid), &path, out)?;
                    }
                    (EntryKind::Tree, EntryKind::Blob) => {
                        walk(odb, Some(&ea.oid), None, &path, out)?;
                        out.push(DiffEntry {
                            path,
                            a: None,
                            b: Some(eb.oid.clone()),
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

enum Side {
    A,
    B,
}

/// Emit every file under an entry present on only one side.
fn one_sided(
    odb: &ObjectStore,
    entry: &crate::odb::TreeEntry,
    prefix: &str,
    side: Side,
    out: &mut Vec<DiffEntry>,
) -> Result<(), OdbError> {
    let path = join(prefix, &entry.name);
    match entry.kind {
        EntryKind::Blob => {
            let (a, b) = match side {
                Side::A => (Some(entry.oid.clone()), None),
                Side::B => (None, Some(entry.oid.clone())),
            };
            out.push(DiffEntry { path, a, b });
        }
        EntryKind::Tree => match side {
            Side::A => walk(odb, Some(&entry.oid), None, &path, out)?,
            Side::B => walk(odb, None, Some(&entry.oid), &path, out)?,
        },
    }
    Ok(())
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
