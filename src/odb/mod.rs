//! odb
//!
//! The content-addressed object database.
//!
//! # Architecture
//!
//! Objects are stored loose, one file per object, under
//! `objects/<hh>/<rest>` where `hh` is the first two hex characters of
//! the oid. The stored representation is the frame `<kind>\0<payload>`
//! compressed with zlib; the oid is the SHA-1 of the uncompressed
//! frame, so content uniquely determines identity.
//!
//! # Invariants
//!
//! - Objects are immutable once written
//! - `put` of an existing oid is a no-op
//! - Writes go through a temp file + rename, so concurrent writers of
//!   the same oid race safely over identical content
//! - `get` re-verifies the hash and surfaces corruption as typed errors
//!
//! # Example
//!
//! ```ignore
//! let odb = ObjectStore::new(paths.objects_dir());
//! let oid = odb.put(ObjectKind::Blob, b"hello\n")?;
//! let (kind, bytes) = odb.get(&oid)?;
//! assert_eq!(kind, ObjectKind::Blob);
//! assert_eq!(bytes, b"hello\n");
//! ```

pub mod commit;
pub mod tree;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::core::types::{Oid, TypeError};

pub use commit::Commit;
pub use tree::{EntryKind, Tree, TreeEntry};

/// Errors from object database operations.
#[derive(Debug, Error)]
pub enum OdbError {
    /// No object with the requested oid exists.
    #[error("object not found: {0}")]
    NotFound(Oid),

    /// The stored bytes failed zlib decompression.
    #[error("object {0} failed decompression")]
    Decompression(Oid),

    /// The decompressed frame is missing its `<kind>\0` header or
    /// names an unknown kind.
    #[error("object {oid} has corrupt framing: {reason}")]
    CorruptFrame { oid: Oid, reason: String },

    /// The stored content does not hash to its filename.
    #[error("object {expected} is corrupt: content hashes to {actual}")]
    HashMismatch { expected: Oid, actual: Oid },

    /// The caller expected one kind and found another.
    #[error("object {oid} is a {actual}, expected {expected}")]
    KindMismatch {
        oid: Oid,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    /// A payload failed to parse as its object kind.
    #[error("object {oid} has a malformed {kind} payload: {reason}")]
    MalformedPayload {
        oid: Oid,
        kind: ObjectKind,
        reason: String,
    },

    /// Type-level validation failed while decoding a payload.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Underlying filesystem failure.
    #[error("object store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The kind of a stored object.
///
/// Tags are lightweight refs and have no object representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    /// The kind name as framed in the object header.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }

    /// Parse a kind name from an object header.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(ObjectKind::Blob),
            "tree" => Some(ObjectKind::Tree),
            "commit" => Some(ObjectKind::Commit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute the oid an object would be stored under, without storing it.
pub fn hash_object(kind: ObjectKind, payload: &[u8]) -> Oid {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(payload);
    let digest: [u8; 20] = hasher.finalize().into();
    Oid::from_raw(&digest)
}

/// The loose object store.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    objects_dir: PathBuf,
}

impl ObjectStore {
    /// Open a store rooted at an objects directory.
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
        }
    }

    /// The path an oid is stored at, fanned out on its first two hex
    /// characters.
    pub fn object_path(&self, oid: &Oid) -> PathBuf {
        let hex = oid.as_str();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Store an object, returning its oid.
    ///
    /// Idempotent: writing content that already exists is a no-op. The
    /// write lands via a temp file in the fan-out directory followed by
    /// a rename, so a concurrent `put` of the same content is safe.
    pub fn put(&self, kind: ObjectKind, payload: &[u8]) -> Result<Oid, OdbError> {
        let oid = hash_object(kind, payload);
        let path = self.object_path(&oid);
        if path.exists() {
            return Ok(oid);
        }

        let mut frame = Vec::with_capacity(kind.as_str().len() + 1 + payload.len());
        frame.extend_from_slice(kind.as_str().as_bytes());
        frame.push(0);
        frame.extend_from_slice(payload);
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&frame, 6);

        let dir = path.parent().expect("object path has a fan-out parent");
        fs::create_dir_all(dir)?;

        let tmp = dir.join(format!(".tmp-{}", oid.as_str()));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&compressed)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        log::debug!("odb: wrote {} {}", kind, oid);
        Ok(oid)
    }

    /// Read an object back as `(kind, payload)`.
    ///
    /// # Errors
    ///
    /// - [`OdbError::NotFound`] when no such object exists
    /// - [`OdbError::Decompression`] / [`OdbError::CorruptFrame`] /
    ///   [`OdbError::HashMismatch`] when the stored bytes are damaged
    pub fn get(&self, oid: &Oid) -> Result<(ObjectKind, Vec<u8>), OdbError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OdbError::NotFound(oid.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let frame = miniz_oxide::inflate::decompress_to_vec_zlib(&compressed)
            .map_err(|_| OdbError::Decompression(oid.clone()))?;

        let null_pos = frame
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| OdbError::CorruptFrame {
                oid: oid.clone(),
                reason: "missing kind separator".into(),
            })?;
        let kind_str =
            std::str::from_utf8(&frame[..null_pos]).map_err(|_| OdbError::CorruptFrame {
                oid: oid.clone(),
                reason: "kind is not UTF-8".into(),
            })?;
        let kind = ObjectKind::parse(kind_str).ok_or_else(|| OdbError::CorruptFrame {
            oid: oid.clone(),
            reason: format!("unknown kind '{kind_str}'"),
        })?;
        let payload = frame[null_pos + 1..].to_vec();

        let actual = hash_object(kind, &payload);
        if &actual != oid {
            return Err(OdbError::HashMismatch {
                expected: oid.clone(),
                actual,
            });
        }

        Ok((kind, payload))
    }

    /// Read an object, requiring a specific kind.
    pub fn get_kind(&self, oid: &Oid, expected: ObjectKind) -> Result<Vec<u8>, OdbError> {
        let (kind, payload) = self.get(oid)?;
        if kind != expected {
            return Err(OdbError::KindMismatch {
                oid: oid.clone(),
                expected,
                actual: kind,
            });
        }
        Ok(payload)
    }

    /// Whether an object exists, without reading it.
    pub fn exists(&self, oid: &Oid) -> bool {
        self.object_path(oid).exists()
    }

    /// Enumerate every oid in the store.
    ///
    /// Files that do not look like object storage (wrong fan-out shape,
    /// leftover temp files) are skipped.
    pub fn iter_all(&self) -> Result<Vec<Oid>, OdbError> {
        let mut oids = Vec::new();
        if !self.objects_dir.exists() {
            return Ok(oids);
        }
        for fan in fs::read_dir(&self.objects_dir)? {
            let fan = fan?;
            let prefix = fan.file_name();
            let prefix = match prefix.to_str() {
                Some(p) if p.len() == 2 => p.to_owned(),
                _ => continue,
            };
            if !fan.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(fan.path())? {
                let entry = entry?;
                if let Some(rest) = entry.file_name().to_str() {
                    if let Ok(oid) = Oid::new(format!("{prefix}{rest}")) {
                        oids.push(oid);
                    }
                }
            }
        }
        Ok(oids)
    }

    /// Convenience: store a blob.
    pub fn put_blob(&self, bytes: &[u8]) -> Result<Oid, OdbError> {
        self.put(ObjectKind::Blob, bytes)
    }

    /// Convenience: read a blob's content.
    pub fn get_blob(&self, oid: &Oid) -> Result<Vec<u8>, OdbError> {
        self.get_kind(oid, ObjectKind::Blob)
    }

    /// Read and parse a commit object.
    pub fn get_commit(&self, oid: &Oid) -> Result<Commit, OdbError> {
        let payload = self.get_kind(oid, ObjectKind::Commit)?;
        Commit::parse(&payload).map_err(|reason| OdbError::MalformedPayload {
            oid: oid.clone(),
            kind: ObjectKind::Commit,
            reason,
        })
    }

    /// Read and parse a tree object.
    pub fn get_tree(&self, oid: &Oid) -> Result<Tree, OdbError> {
        let payload = self.get_kind(oid, ObjectKind::Tree)?;
        Tree::parse(&payload).map_err(|reason| OdbError::MalformedPayload {
            oid: oid.clone(),
            kind: ObjectKind::Tree,
            reason,
        })
    }

    /// The objects directory this store reads from.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }
}
