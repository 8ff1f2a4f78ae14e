//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`Oid`] - Content-address of a stored object (40-hex SHA-1)
//! - [`RefName`] - Validated reference name
//! - [`Signature`] - Author/committer identity with timestamp
//! - [`ConflictKind`] - Typed taxonomy of three-way merge conflicts
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use strata::core::types::{Oid, RefName};
//!
//! let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! let refname = RefName::branch("main").unwrap();
//! assert_eq!(refname.as_str(), "refs/heads/main");
//!
//! assert!(Oid::new("not-a-sha").is_err());
//! assert!(RefName::new("bad..name").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Number of bytes in an object id digest.
pub const OID_RAW_LEN: usize = 20;

/// Number of hex characters in an object id.
pub const OID_HEX_LEN: usize = 40;

/// The content-address of a stored object.
///
/// An oid is the SHA-1 of the framed object payload, normalized to
/// lowercase hex.
///
/// # Example
///
/// ```
/// use strata::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// The oid is normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not 40 hex characters.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        Self::validate(&oid)?;
        Ok(Self(oid))
    }

    /// Create an oid from a raw 20-byte digest.
    pub fn from_raw(raw: &[u8; OID_RAW_LEN]) -> Self {
        Self(hex::encode(raw))
    }

    /// Decode the oid back into its raw 20-byte digest.
    pub fn to_raw(&self) -> [u8; OID_RAW_LEN] {
        let mut raw = [0u8; OID_RAW_LEN];
        // Infallible: the constructor guarantees 40 hex characters.
        hex::decode_to_slice(&self.0, &mut raw).expect("validated oid is hex");
        raw
    }

    /// Parse an oid from a raw byte slice of digest length.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the slice is not 20 bytes.
    pub fn from_raw_slice(raw: &[u8]) -> Result<Self, TypeError> {
        let raw: &[u8; OID_RAW_LEN] = raw.try_into().map_err(|_| {
            TypeError::InvalidOid(format!("expected 20 raw bytes, got {}", raw.len()))
        })?;
        Ok(Self::from_raw(raw))
    }

    /// Get an abbreviated form of the oid.
    ///
    /// Returns the first `len` characters, or the full oid if `len`
    /// exceeds it.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(oid: &str) -> Result<(), TypeError> {
        if oid.len() != OID_HEX_LEN {
            return Err(TypeError::InvalidOid(format!(
                "expected {} hex characters, got {}",
                OID_HEX_LEN,
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(())
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference roots that live at the repository top level rather than
/// under `refs/`.
///
/// These exist only while the corresponding operation is in progress
/// (except `HEAD`, which is always present).
pub const ROOT_REFS: [&str; 4] = ["HEAD", "MERGE_HEAD", "ORIG_HEAD", "CHERRY_PICK_HEAD"];

/// A validated reference name.
///
/// Either one of the distinguished roots (`HEAD`, `MERGE_HEAD`,
/// `ORIG_HEAD`, `CHERRY_PICK_HEAD`) or a path under `refs/`:
/// - Cannot be empty, start or end with `/`, or end with `.lock`
/// - Cannot contain `..`, `//`, spaces, control characters, or
///   `~`, `^`, `:`, `\`, `?`, `*`, `[`
/// - Path components cannot start with `.`
///
/// # Example
///
/// ```
/// use strata::core::types::RefName;
///
/// let branch = RefName::branch("feature/foo").unwrap();
/// assert_eq!(branch.as_str(), "refs/heads/feature/foo");
/// assert!(branch.is_branch());
///
/// assert!(RefName::new("HEAD").is_ok());
/// assert!(RefName::new("refs/heads/bad..name").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name is neither a
    /// distinguished root nor a valid `refs/` path.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// The `HEAD` ref.
    pub fn head() -> Self {
        Self("HEAD".into())
    }

    /// The `MERGE_HEAD` ref, present during an unfinished merge.
    pub fn merge_head() -> Self {
        Self("MERGE_HEAD".into())
    }

    /// The `ORIG_HEAD` ref, captured before destructive operations.
    pub fn orig_head() -> Self {
        Self("ORIG_HEAD".into())
    }

    /// The `CHERRY_PICK_HEAD` ref, present during an unfinished pick.
    pub fn cherry_pick_head() -> Self {
        Self("CHERRY_PICK_HEAD".into())
    }

    /// Create a branch ref name (`refs/heads/<name>`).
    pub fn branch(name: &str) -> Result<Self, TypeError> {
        Self::new(format!("refs/heads/{name}"))
    }

    /// Create a tag ref name (`refs/tags/<name>`).
    pub fn tag(name: &str) -> Result<Self, TypeError> {
        Self::new(format!("refs/tags/{name}"))
    }

    /// Create a remote-tracking ref name (`refs/remote/<remote>/<name>`).
    pub fn remote(remote: &str, name: &str) -> Result<Self, TypeError> {
        Self::new(format!("refs/remote/{remote}/{name}"))
    }

    /// Check if this is one of the distinguished root refs.
    pub fn is_root(&self) -> bool {
        ROOT_REFS.contains(&self.0.as_str())
    }

    /// Check if this ref is a branch ref.
    pub fn is_branch(&self) -> bool {
        self.0.starts_with("refs/heads/")
    }

    /// Check if this ref is a tag ref.
    pub fn is_tag(&self) -> bool {
        self.0.starts_with("refs/tags/")
    }

    /// Strip a prefix from the ref name and return the remainder.
    ///
    /// Returns `None` if the ref doesn't start with the given prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use strata::core::types::RefName;
    ///
    /// let refname = RefName::new("refs/heads/feature/foo").unwrap();
    /// assert_eq!(refname.strip_prefix("refs/heads/"), Some("feature/foo"));
    /// assert_eq!(refname.strip_prefix("refs/tags/"), None);
    /// ```
    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidRefName("ref name cannot be empty".into()));
        }

        // Distinguished roots bypass the refs/ requirement.
        if ROOT_REFS.contains(&name) {
            return Ok(());
        }

        if !name.starts_with("refs/") {
            return Err(TypeError::InvalidRefName(
                "ref name must be a root ref or start with 'refs/'".into(),
            ));
        }

        if name.ends_with('/') {
            return Err(TypeError::InvalidRefName(
                "ref name cannot end with '/'".into(),
            ));
        }
        if name.ends_with(".lock") {
            return Err(TypeError::InvalidRefName(
                "ref name cannot end with '.lock'".into(),
            ));
        }

        if name.contains("..") {
            return Err(TypeError::InvalidRefName(
                "ref name cannot contain '..'".into(),
            ));
        }
        if name.contains("//") {
            return Err(TypeError::InvalidRefName(
                "ref name cannot contain '//'".into(),
            ));
        }

        const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
        for c in INVALID_CHARS {
            if name.contains(c) {
                return Err(TypeError::InvalidRefName(format!(
                    "ref name cannot contain '{c}'"
                )));
            }
        }

        for c in name.chars() {
            if c.is_ascii_control() {
                return Err(TypeError::InvalidRefName(
                    "ref name cannot contain control characters".into(),
                ));
            }
        }

        for component in name.split('/') {
            if component.is_empty() {
                continue;
            }
            if component.starts_with('.') {
                return Err(TypeError::InvalidRefName(
                    "path component cannot start with '.'".into(),
                ));
            }
        }

        Ok(())
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An author or committer identity with timestamp.
///
/// Serialized in commit payloads as `<name> <email> <epoch> <tz>`,
/// e.g. `Ada Lovelace ada@example.com 1851700000 +0100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Human-readable name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Timezone offset in `+HHMM`/`-HHMM` form.
    pub tz: String,
}

impl Signature {
    /// Create a signature.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidSignature` if name or email contain
    /// newlines (which would corrupt the commit payload framing) or the
    /// timezone is not `+HHMM`/`-HHMM`.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: i64,
        tz: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let name = name.into();
        let email = email.into();
        let tz = tz.into();

        if name.contains('\n') || email.contains('\n') {
            return Err(TypeError::InvalidSignature(
                "name and email cannot contain newlines".into(),
            ));
        }
        if email.contains(' ') {
            return Err(TypeError::InvalidSignature(
                "email cannot contain spaces".into(),
            ));
        }
        if !Self::valid_tz(&tz) {
            return Err(TypeError::InvalidSignature(format!(
                "timezone must be +HHMM or -HHMM, got '{tz}'"
            )));
        }

        Ok(Self {
            name,
            email,
            timestamp,
            tz,
        })
    }

    fn valid_tz(tz: &str) -> bool {
        tz.len() == 5
            && (tz.starts_with('+') || tz.starts_with('-'))
            && tz[1..].chars().all(|c| c.is_ascii_digit())
    }

    /// Format as a commit payload line value: `<name> <email> <epoch> <tz>`.
    pub fn to_line(&self) -> String {
        format!("{} {} {} {}", self.name, self.email, self.timestamp, self.tz)
    }

    /// Parse a commit payload line value.
    ///
    /// The name may contain spaces; email, epoch and tz are the last
    /// three space-separated fields.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidSignature` on malformed input.
    pub fn parse_line(line: &str) -> Result<Self, TypeError> {
        let mut fields = line.rsplitn(4, ' ');
        let tz = fields.next();
        let epoch = fields.next();
        let email = fields.next();
        let name = fields.next();

        match (name, email, epoch, tz) {
            (Some(name), Some(email), Some(epoch), Some(tz)) => {
                let timestamp = epoch.parse::<i64>().map_err(|_| {
                    TypeError::InvalidSignature(format!("bad epoch '{epoch}' in '{line}'"))
                })?;
                Self::new(name, email, timestamp, tz)
            }
            _ => Err(TypeError::InvalidSignature(format!(
                "expected '<name> <email> <epoch> <tz>', got '{line}'"
            ))),
        }
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_line())
    }
}

/// The typed taxonomy of three-way merge conflicts.
///
/// Carried by conflict records and index entries so call sites can
/// discriminate without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides modified the same path with different results.
    ContentConflict,
    /// Both sides added the same path with different content.
    AddAdd,
    /// Our side deleted the path, the other side modified it.
    CurrentDeleteTargetModify,
    /// Our side modified the path, the other side deleted it.
    CurrentModifyTargetDelete,
}

impl ConflictKind {
    /// Whether a textual merge is attempted for this conflict kind.
    ///
    /// Delete/modify conflicts have no meaningful line-level merge.
    pub fn merges_text(&self) -> bool {
        matches!(self, ConflictKind::ContentConflict | ConflictKind::AddAdd)
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictKind::ContentConflict => "content_conflict",
            ConflictKind::AddAdd => "add_add",
            ConflictKind::CurrentDeleteTargetModify => "current_delete_target_modify",
            ConflictKind::CurrentModifyTargetDelete => "current_modify_target_delete",
        };
        write!(f, "{s}")
    }
}
