//! Slash-delimited repository paths.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Path separator.
pub const SEPARATOR: char = '/';

/// An immutable, normalized repository path.
///
/// Parsing splits on `/` and drops empty segments, so `//a///b/` and
/// `/a/b` are the same path. Equality and hashing follow the canonical
/// string, which makes the type safe to use as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct RepositoryPath {
    segments: Vec<String>,
}

impl RepositoryPath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Split `raw` on the separator, collapsing duplicates.
    pub fn parse(raw: &str) -> Self {
        Self {
            segments: raw
                .split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Parse and reject relative navigation segments.
    pub fn try_parse(raw: &str) -> Result<Self, AppError> {
        let path = Self::parse(raw);
        if let Some(bad) = path.segments.iter().find(|s| *s == "." || *s == "..") {
            return Err(AppError::invalid_path(format!(
                "Segment '{bad}' is not allowed in '{raw}'"
            )));
        }
        Ok(path)
    }

    /// Path segments from the root down.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments (0 for root).
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Alias of [`RepositoryPath::is_root`].
    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// The parent path, or `None` for root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The final segment, or the empty string for root.
    pub fn last_segment(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// A new path with `segment` appended. The segment is itself parsed,
    /// so `append("a/b")` adds two segments.
    pub fn append(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(
            segment
                .split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self { segments }
    }

    /// Canonical string of the first `n` segments, or the full path when
    /// `n` is at least the path length.
    pub fn prefix(&self, n: usize) -> String {
        let n = n.min(self.segments.len());
        render(&self.segments[..n])
    }

    /// Path made of the first `n` segments.
    pub fn truncate(&self, n: usize) -> Self {
        let n = n.min(self.segments.len());
        Self {
            segments: self.segments[..n].to_vec(),
        }
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Whether `other` equals `self` or lies beneath it.
    pub fn contains(&self, other: &Self) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// Segments of `self` below `ancestor`, joined without a leading
    /// separator. `None` when `ancestor` does not contain `self`.
    pub fn relative_to(&self, ancestor: &Self) -> Option<String> {
        if !ancestor.contains(self) {
            return None;
        }
        Some(self.segments[ancestor.segments.len()..].join("/"))
    }

    /// Move `self` from under `from` to under `to`.
    pub fn rebase(&self, from: &Self, to: &Self) -> Option<Self> {
        if !from.contains(self) {
            return None;
        }
        let mut segments = to.segments.clone();
        segments.extend_from_slice(&self.segments[from.segments.len()..]);
        Some(Self { segments })
    }

    /// Canonical string with a trailing separator, used for subtree
    /// prefix matching (`/a/b/`, or `/` for root).
    pub fn subtree_prefix(&self) -> String {
        if self.is_root() {
            SEPARATOR.to_string()
        } else {
            format!("{self}{SEPARATOR}")
        }
    }
}

fn render(segments: &[String]) -> String {
    if segments.is_empty() {
        return SEPARATOR.to_string();
    }
    let mut out = String::new();
    for segment in segments {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    out
}

impl fmt::Display for RepositoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.segments))
    }
}

impl From<&str> for RepositoryPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for RepositoryPath {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<RepositoryPath> for String {
    fn from(path: RepositoryPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_collapses_separators() {
        let path = RepositoryPath::parse("//a///b/c/");
        assert_eq!(path.to_string(), "/a/b/c");
        assert_eq!(path.len(), 3);
        assert_eq!(RepositoryPath::parse("").to_string(), "/");
        assert_eq!(RepositoryPath::parse("///").to_string(), "/");
    }

    #[test]
    fn test_equality_and_hash_follow_canonical_form() {
        let mut map = HashMap::new();
        map.insert(RepositoryPath::parse("/a//b"), 1);
        assert_eq!(map.get(&RepositoryPath::parse("a/b/")), Some(&1));
    }

    #[test]
    fn test_parent_and_last_segment() {
        let path = RepositoryPath::parse("/a/b/file.txt");
        assert_eq!(path.last_segment(), "file.txt");
        assert_eq!(path.parent().unwrap().to_string(), "/a/b");
        assert_eq!(RepositoryPath::parse("/a").parent(), Some(RepositoryPath::root()));
        assert_eq!(RepositoryPath::root().parent(), None);
        assert_eq!(RepositoryPath::root().last_segment(), "");
    }

    #[test]
    fn test_append_and_prefix() {
        let path = RepositoryPath::parse("/a").append("b").append("/c/d/");
        assert_eq!(path.to_string(), "/a/b/c/d");
        assert_eq!(path.prefix(0), "/");
        assert_eq!(path.prefix(2), "/a/b");
        assert_eq!(path.prefix(10), "/a/b/c/d");
    }

    #[test]
    fn test_try_parse_rejects_navigation() {
        assert!(RepositoryPath::try_parse("/a/../b").is_err());
        assert!(RepositoryPath::try_parse("/a/./b").is_err());
        assert!(RepositoryPath::try_parse("/a/.b").is_ok());
    }

    #[test]
    fn test_ancestry_and_rebase() {
        let a = RepositoryPath::parse("/a/b");
        let leaf = RepositoryPath::parse("/a/b/c/file.txt");
        let sibling = RepositoryPath::parse("/a/bc");
        assert!(a.is_ancestor_of(&leaf));
        assert!(!a.is_ancestor_of(&sibling));
        assert!(RepositoryPath::root().is_ancestor_of(&a));
        assert_eq!(leaf.relative_to(&a).as_deref(), Some("c/file.txt"));
        assert_eq!(
            leaf.rebase(&a, &RepositoryPath::parse("/a/x")).unwrap().to_string(),
            "/a/x/c/file.txt"
        );
        assert_eq!(a.subtree_prefix(), "/a/b/");
        assert_eq!(RepositoryPath::root().subtree_prefix(), "/");
    }
}
