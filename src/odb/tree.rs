//! odb::tree
//!
//! Tree object payload format and recursive helpers.
//!
//! A tree is an ordered sequence of entries
//!
//! ```text
//! <kind> <name>\0<binary-oid>
//! ```
//!
//! with `kind ∈ {blob, tree}`, names unique and sorted bytewise. The
//! binary oid is the 20-byte digest, not hex.

use std::collections::BTreeMap;

use crate::core::types::{Oid, OID_RAW_LEN};

use super::{ObjectKind, ObjectStore, OdbError};

/// The kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Blob,
    Tree,
}

impl EntryKind {
    /// The kind name as framed in the entry header.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Blob => "blob",
            EntryKind::Tree => "tree",
        }
    }

    /// Parse a kind name from an entry header.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(EntryKind::Blob),
            "tree" => Some(EntryKind::Tree),
            _ => None,
        }
    }
}

/// One entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub kind: EntryKind,
    pub name: String,
    pub oid: Oid,
}

/// A parsed tree object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree from entries, sorting by name.
    ///
    /// Duplicate names are rejected with a reason string.
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Result<Self, String> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        for pair in entries.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(format!("duplicate entry name '{}'", pair[0].name));
            }
        }
        Ok(Self { entries })
    }

    /// The entries, sorted by name.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Look up an entry by name.
    pub fn entry(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Serialize to the payload byte format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.kind.as_str().as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(0);
            out.extend_from_slice(&entry.oid.to_raw());
        }
        out
    }

    /// Parse a payload.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason on malformed input; the caller
    /// wraps it with the offending oid.
    pub fn parse(payload: &[u8]) -> Result<Self, String> {
        let mut entries = Vec::new();
        let mut rest = payload;

        while !rest.is_empty() {
            let null_pos = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| "entry missing name terminator".to_string())?;
            let header = std::str::from_utf8(&rest[..null_pos])
                .map_err(|_| "entry header is not UTF-8".to_string())?;
            let (kind_str, name) = header
                .split_once(' ')
                .ok_or_else(|| format!("malformed entry header '{header}'"))?;
            let kind = EntryKind::parse(kind_str)
                .ok_or_else(|| format!("unknown entry kind '{kind_str}'"))?;
            if name.is_empty() || name.contains('/') || name == "." || name == ".." {
                return Err(format!("illegal entry name '{name}'"));
            }

            let oid_start = null_pos + 1;
            let oid_end = oid_start + OID_RAW_LEN;
            if rest.len() < oid_end {
                return Err("entry truncated before oid".into());
            }
            let oid = Oid::from_raw_slice(&rest[oid_start..oid_end])
                .map_err(|e| e.to_string())?;

            entries.push(TreeEntry {
                kind,
                name: name.to_string(),
                oid,
            });
            rest = &rest[oid_end..];
        }

        // Re-validate ordering and uniqueness rather than trusting the
        // producer.
        Self::from_entries(entries)
    }

    /// Recursively flatten a stored tree into a `path -> blob oid` map.
    ///
    /// Paths use `/` separators relative to the tree root.
    pub fn flatten(odb: &ObjectStore, tree_oid: &Oid) -> Result<BTreeMap<String, Oid>, OdbError> {
        let mut flat = BTreeMap::new();
        Self::flatten_into(odb, tree_oid, String::new(), &mut flat)?;
        Ok(flat)
    }

    fn flatten_into(
        odb: &ObjectStore,
        tree_oid: &Oid,
        prefix: String,
        flat: &mut BTreeMap<String, Oid>,
    ) -> Result<(), OdbError> {
        let tree = odb.get_tree(tree_oid)?;
        for entry in tree.entries() {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            match entry.kind {
                EntryKind::Blob => {
                    flat.insert(path, entry.oid.clone());
                }
                EntryKind::Tree => {
                    Self::flatten_into(odb, &entry.oid, path, flat)?;
                }
            }
        }
        Ok(())
    }

    /// Build and store tree objects bottom-up from a flat
    /// `path -> blob oid` map, returning the root tree oid.
    ///
    /// An empty map produces the empty tree object.
    pub fn write_flat(
        odb: &ObjectStore,
        flat: &BTreeMap<String, Oid>,
    ) -> Result<Oid, OdbError> {
        // Nested representation: name -> blob oid | subtree.
        enum Node {
            Blob(Oid),
            Dir(BTreeMap<String, Node>),
        }

        let mut root: BTreeMap<String, Node> = BTreeMap::new();
        for (path, oid) in flat {
            let mut parts = path.split('/').peekable();
            let mut current = &mut root;
            while let Some(part) = parts.next() {
                if parts.peek().is_none() {
                    current.insert(part.to_string(), Node::Blob(oid.clone()));
                } else {
                    let next = current
                        .entry(part.to_string())
                        .or_insert_with(|| Node::Dir(BTreeMap::new()));
                    current = match next {
                        Node::Dir(dir) => dir,
                        // A file and a directory cannot share a path.
                        Node::Blob(_) => {
                            return Err(OdbError::MalformedPayload {
                                oid: oid.clone(),
                                kind: ObjectKind::Tree,
                                reason: format!("path '{path}' nests under a blob"),
                            });
                        }
                    };
                }
            }
        }

        fn write_dir(odb: &ObjectStore, dir: &BTreeMap<String, Node>) -> Result<Oid, OdbError> {
            let mut entries = Vec::with_capacity(dir.len());
            for (name, node) in dir {
                let (kind, oid) = match node {
                    Node::Blob(oid) => (EntryKind::Blob, oid.clone()),
                    Node::Dir(sub) => (EntryKind::Tree, write_dir(odb, sub)?),
                };
                entries.push(TreeEntry {
                    kind,
                    name: name.clone(),
                    oid,
                });
            }
            // Names are unique by construction of the BTreeMap.
            let tree = Tree::from_entries(entries).expect("map keys are unique");
            odb.put(ObjectKind::Tree, &tree.to_bytes())
        }

        write_dir(odb, &root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn oid(fill: char) -> Oid {
        Oid::new(fill.to_string().repeat(40)).unwrap()
    }

    fn temp_store() -> (TempDir, ObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        (dir, store)
    }

    #[test]
    fn roundtrip_sorted_entries() {
        let tree = Tree::from_entries(vec![
            TreeEntry {
                kind: EntryKind::Blob,
                name: "zeta".into(),
                oid: oid('a'),
            },
            TreeEntry {
                kind: EntryKind::Tree,
                name: "alpha".into(),
                oid: oid('b'),
            },
        ])
        .unwrap();

        // Construction sorts by name.
        assert_eq!(tree.entries()[0].name, "alpha");

        let parsed = Tree::parse(&tree.to_bytes()).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn empty_tree_roundtrip() {
        let tree = Tree::default();
        assert!(tree.to_bytes().is_empty());
        assert_eq!(Tree::parse(b"").unwrap(), tree);
    }

    #[test]
    fn duplicate_names_rejected() {
        let result = Tree::from_entries(vec![
            TreeEntry {
                kind: EntryKind::Blob,
                name: "same".into(),
                oid: oid('a'),
            },
            TreeEntry {
                kind: EntryKind::Blob,
                name: "same".into(),
                oid: oid('b'),
            },
        ]);
        assert!(result.unwrap_err().contains("duplicate"));
    }

    #[test]
    fn truncated_payload_rejected() {
        let tree = Tree::from_entries(vec![TreeEntry {
            kind: EntryKind::Blob,
            name: "file".into(),
            oid: oid('a'),
        }])
        .unwrap();
        let bytes = tree.to_bytes();
        assert!(Tree::parse(&bytes[..bytes.len() - 5]).unwrap_err().contains("truncated"));
    }

    #[test]
    fn slash_in_name_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"blob a/b\0");
        bytes.extend_from_slice(&oid('a').to_raw());
        assert!(Tree::parse(&bytes).unwrap_err().contains("illegal"));
    }

    #[test]
    fn entry_lookup() {
        let tree = Tree::from_entries(vec![
            TreeEntry {
                kind: EntryKind::Blob,
                name: "a".into(),
                oid: oid('a'),
            },
            TreeEntry {
                kind: EntryKind::Blob,
                name: "b".into(),
                oid: oid('b'),
            },
        ])
        .unwrap();
        assert_eq!(tree.entry("b").unwrap().oid, oid('b'));
        assert!(tree.entry("c").is_none());
    }

    #[test]
    fn write_and_flatten_nested() {
        let (_dir, store) = temp_store();
        let blob_a = store.put_blob(b"a").unwrap();
        let blob_b = store.put_blob(b"b").unwrap();
        let blob_c = store.put_blob(b"c").unwrap();

        let mut flat = BTreeMap::new();
        flat.insert("top.txt".to_string(), blob_a.clone());
        flat.insert("dir/inner.txt".to_string(), blob_b.clone());
        flat.insert("dir/sub/deep.txt".to_string(), blob_c.clone());

        let root = Tree::write_flat(&store, &flat).unwrap();
        let rebuilt = Tree::flatten(&store, &root).unwrap();
        assert_eq!(rebuilt, flat);
    }

    #[test]
    fn write_flat_empty_produces_empty_tree() {
        let (_dir, store) = temp_store();
        let root = Tree::write_flat(&store, &BTreeMap::new()).unwrap();
        let tree = store.get_tree(&root).unwrap();
        assert!(tree.entries().is_empty());
    }

    #[test]
    fn write_flat_is_deterministic() {
        let (_dir, store) = temp_store();
        let blob = store.put_blob(b"x").unwrap();
        let mut flat = BTreeMap::new();
        flat.insert("a/b.txt".to_string(), blob.clone());
        flat.insert("a/c.txt".to_string(), blob.clone());

        let first = Tree::write_flat(&store, &flat).unwrap();
        let second = Tree::write_flat(&store, &flat).unwrap();
        assert_eq!(first, second);
    }
}
