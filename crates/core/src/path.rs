//! Interned repository-relative paths

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::sync::Arc;

/// An interned repository-relative path.
///
/// Stored as a shared normalized string, so clones are cheap and the journal
/// can hold many references to the same path without copying it. Equality,
/// ordering, and hashing operate on the normalized string form.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath(Arc<str>);

/// Borrowed form of a relative path, for argument positions.
///
/// Validated on construction like [`RelativePath`] but does not allocate;
/// call [`RelativePathPiece::to_owned`] to intern it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePathPiece<'a>(&'a str);

impl RelativePath {
    /// Intern a relative path, normalizing a leading `./`
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let path = path.as_ref();
        let path = path.strip_prefix("./").unwrap_or(path);
        validate(path)?;
        Ok(Self(Arc::from(path)))
    }

    /// The normalized path string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Borrowed view of this path
    pub fn as_piece(&self) -> RelativePathPiece<'_> {
        RelativePathPiece(&self.0)
    }
}

impl<'a> RelativePathPiece<'a> {
    /// Validate a borrowed relative path without allocating
    pub fn new(path: &'a str) -> Result<Self> {
        validate(path)?;
        Ok(Self(path))
    }

    /// The path string
    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// Intern this path
    pub fn to_owned(self) -> RelativePath {
        RelativePath(Arc::from(self.0))
    }
}

/// Reject paths that are not normalized repository-relative paths.
///
/// Rules: non-empty, forward slashes only, not absolute, no `.` or `..`
/// components, no empty components, no trailing slash.
fn validate(path: &str) -> Result<()> {
    if path.is_empty() {
        anyhow::bail!("Empty relative path");
    }
    if path.starts_with('/') {
        anyhow::bail!("Absolute path not allowed: {path}");
    }
    if path.contains('\\') {
        anyhow::bail!("Backslash in path (use forward slashes): {path}");
    }
    if path.ends_with('/') {
        anyhow::bail!("Trailing slash in path: {path}");
    }
    for component in path.split('/') {
        match component {
            "" => anyhow::bail!("Empty component in path: {path}"),
            "." | ".." => anyhow::bail!("Dot component in path: {path}"),
            _ => {}
        }
    }
    Ok(())
}

impl From<RelativePathPiece<'_>> for RelativePath {
    fn from(piece: RelativePathPiece<'_>) -> Self {
        piece.to_owned()
    }
}

impl<'a> From<&'a RelativePath> for RelativePathPiece<'a> {
    fn from(path: &'a RelativePath) -> Self {
        path.as_piece()
    }
}

impl PartialEq<RelativePathPiece<'_>> for RelativePath {
    fn eq(&self, other: &RelativePathPiece<'_>) -> bool {
        self.as_str() == other.as_str()
    }
}

impl PartialEq<RelativePath> for RelativePathPiece<'_> {
    fn eq(&self, other: &RelativePath) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Borrow<str> for RelativePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RelativePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RelativePath({})", self.as_str())
    }
}

impl std::fmt::Display for RelativePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Debug for RelativePathPiece<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RelativePathPiece({})", self.0)
    }
}

impl std::fmt::Display for RelativePathPiece<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for RelativePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelativePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RelativePath::new(&raw).map_err(serde::de::Error::custom)
    }
}
