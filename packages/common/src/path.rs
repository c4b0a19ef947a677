use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AssetError;

/// Fixed root label of the internal tree representation.
const ROOT_LABEL: &str = "root";

/// Hierarchical asset path.
///
/// Clients address assets with `/`-delimited strings (`/photos/cats`).
/// Internally the path is a tree value rooted at a fixed label and joined
/// with `.` (`root.photos.cats`), so "is descendant of" becomes a plain
/// prefix match that a btree index over the text column can serve.
///
/// Segment characters are restricted to `[A-Za-z0-9_-]`; in particular `.`
/// and `/` cannot appear inside a segment, which keeps the tree form
/// unambiguous.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetPath {
    segments: Vec<String>,
}

impl AssetPath {
    /// Parse a client-facing path like `/photos/cats` or `photos/cats`.
    pub fn parse(raw: &str) -> Result<Self, AssetError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self {
                segments: Vec::new(),
            });
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(AssetError::validation(format!(
                    "empty path segment in '{raw}'"
                )));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(AssetError::validation(format!(
                    "invalid characters in path segment '{segment}'"
                )));
            }
            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    /// The service root path (`/`).
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Internal tree form used as the stored path value, e.g. `root.photos.cats`.
    pub fn tree(&self) -> String {
        if self.segments.is_empty() {
            return ROOT_LABEL.to_string();
        }
        let mut out = String::from(ROOT_LABEL);
        for segment in &self.segments {
            out.push('.');
            out.push_str(segment);
        }
        out
    }

    /// SQL `LIKE` pattern matching strict descendants of this path.
    pub fn descendant_pattern(&self) -> String {
        format!("{}.%", self.tree())
    }

    /// True if `other` is this path or hierarchically beneath it.
    pub fn contains(&self, other: &AssetPath) -> bool {
        other.segments.len() >= self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Parse a stored tree value back into a path.
    pub fn from_tree(tree: &str) -> Result<Self, AssetError> {
        let mut labels = tree.split('.');
        if labels.next() != Some(ROOT_LABEL) {
            return Err(AssetError::validation(format!(
                "tree path '{tree}' is not rooted at '{ROOT_LABEL}'"
            )));
        }
        Self::parse(&labels.collect::<Vec<_>>().join("/"))
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl FromStr for AssetPath {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for AssetPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
