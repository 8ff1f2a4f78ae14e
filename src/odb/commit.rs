//! odb::commit
//!
//! Commit object payload format.
//!
//! The payload is line-oriented headers followed by a blank line and
//! the raw message bytes:
//!
//! ```text
//! tree <40hex>\n
//! parent <40hex>\n        (zero or more, order significant)
//! author <name> <email> <epoch> <tz>\n
//! committer <name> <email> <epoch> <tz>\n
//! \n
//! <message>
//! ```
//!
//! Parent order is preserved exactly as written; merge-base traversal
//! depends on it for determinism.

use crate::core::types::{Oid, Signature};

/// A parsed commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// The root tree snapshot.
    pub tree: Oid,
    /// Parent commits, in order. Empty for a root commit; two or more
    /// for a merge.
    pub parents: Vec<Oid>,
    /// Who wrote the change.
    pub author: Signature,
    /// Who created the commit object.
    pub committer: Signature,
    /// The commit message.
    pub message: String,
}

impl Commit {
    /// Whether this commit is a merge (two or more parents).
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Whether this commit is a root (no parents).
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// The first parent, if any.
    pub fn first_parent(&self) -> Option<&Oid> {
        self.parents.first()
    }

    /// Serialize to the payload byte format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("tree {}\n", self.tree));
        for parent in &self.parents {
            out.push_str(&format!("parent {parent}\n"));
        }
        out.push_str(&format!("author {}\n", self.author.to_line()));
        out.push_str(&format!("committer {}\n", self.committer.to_line()));
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    /// Parse a payload.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason on malformed input; the caller
    /// wraps it with the offending oid.
    pub fn parse(payload: &[u8]) -> Result<Self, String> {
        let text = std::str::from_utf8(payload).map_err(|_| "payload is not UTF-8".to_string())?;

        let (headers, message) = match text.split_once("\n\n") {
            Some((h, m)) => (h, m.to_string()),
            None => return Err("missing blank line before message".into()),
        };

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| format!("malformed header line '{line}'"))?;
            match key {
                "tree" => {
                    tree = Some(Oid::new(value).map_err(|e| e.to_string())?);
                }
                "parent" => {
                    parents.push(Oid::new(value).map_err(|e| e.to_string())?);
                }
                "author" => {
                    author = Some(Signature::parse_line(value).map_err(|e| e.to_string())?);
                }
                "committer" => {
                    committer = Some(Signature::parse_line(value).map_err(|e| e.to_string())?);
                }
                other => return Err(format!("unknown header '{other}'")),
            }
        }

        let tree = tree.ok_or_else(|| "missing tree header".to_string())?;
        let author = author.ok_or_else(|| "missing author header".to_string())?;
        let committer = committer.unwrap_or_else(|| author.clone());

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(fill: char) -> Oid {
        Oid::new(fill.to_string().repeat(40)).unwrap()
    }

    fn sig(name: &str) -> Signature {
        Signature::new(name, "t@example.com", 1700000000, "+0000").unwrap()
    }

    #[test]
    fn roundtrip_root_commit() {
        let commit = Commit {
            tree: oid('a'),
            parents: vec![],
            author: sig("Author"),
            committer: sig("Committer"),
            message: "initial\n".into(),
        };
        let parsed = Commit::parse(&commit.to_bytes()).unwrap();
        assert_eq!(parsed, commit);
        assert!(parsed.is_root());
        assert!(!parsed.is_merge());
    }

    #[test]
    fn roundtrip_merge_commit_preserves_parent_order() {
        let commit = Commit {
            tree: oid('a'),
            parents: vec![oid('b'), oid('c')],
            author: sig("Author"),
            committer: sig("Committer"),
            message: "merge\n".into(),
        };
        let parsed = Commit::parse(&commit.to_bytes()).unwrap();
        assert_eq!(parsed.parents, vec![oid('b'), oid('c')]);
        assert!(parsed.is_merge());
        assert_eq!(parsed.first_parent(), Some(&oid('b')));
    }

    #[test]
    fn multiline_message_preserved() {
        let commit = Commit {
            tree: oid('a'),
            parents: vec![oid('b')],
            author: sig("A"),
            committer: sig("C"),
            message: "subject\n\nbody line one\nbody line two\n".into(),
        };
        let parsed = Commit::parse(&commit.to_bytes()).unwrap();
        assert_eq!(parsed.message, "subject\n\nbody line one\nbody line two\n");
    }

    #[test]
    fn empty_message_accepted() {
        let commit = Commit {
            tree: oid('a'),
            parents: vec![],
            author: sig("A"),
            committer: sig("C"),
            message: String::new(),
        };
        let parsed = Commit::parse(&commit.to_bytes()).unwrap();
        assert_eq!(parsed.message, "");
    }

    #[test]
    fn missing_tree_rejected() {
        let payload = b"author A a@b 0 +0000\ncommitter A a@b 0 +0000\n\nmsg";
        assert!(Commit::parse(payload).unwrap_err().contains("tree"));
    }

    #[test]
    fn missing_blank_line_rejected() {
        let payload = format!("tree {}\nauthor A a@b 0 +0000", "a".repeat(40));
        assert!(Commit::parse(payload.as_bytes())
            .unwrap_err()
            .contains("blank line"));
    }

    #[test]
    fn unknown_header_rejected() {
        let payload = format!(
            "tree {}\nencoding utf-8\nauthor A a@b 0 +0000\ncommitter A a@b 0 +0000\n\nmsg",
            "a".repeat(40)
        );
        assert!(Commit::parse(payload.as_bytes())
            .unwrap_err()
            .contains("unknown header"));
    }

    #[test]
    fn committer_defaults_to_author() {
        let payload = format!("tree {}\nauthor A a@b 7 +0000\n\nmsg", "a".repeat(40));
        let parsed = Commit::parse(payload.as_bytes()).unwrap();
        assert_eq!(parsed.committer, parsed.author);
    }
}
