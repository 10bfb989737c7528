//! Entry paths: ordered name segments with a derived joined form.
//!
//! A node's path is the names of its ancestors followed by its own name. In
//! the wire format the path travels as `{ raw, segments }`; only `segments`
//! is authoritative, `raw` is always re-derived.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used for the joined form of a path.
pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "EntryPathRepr", into = "EntryPathRepr")]
pub struct EntryPath {
    segments: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct EntryPathRepr {
    #[serde(default)]
    raw: String,
    #[serde(default)]
    segments: Vec<String>,
}

impl From<EntryPathRepr> for EntryPath {
    fn from(repr: EntryPathRepr) -> Self {
        if repr.segments.is_empty() && !repr.raw.is_empty() {
            EntryPath::parse(&repr.raw)
        } else {
            EntryPath::new(repr.segments)
        }
    }
}

impl From<EntryPath> for EntryPathRepr {
    fn from(path: EntryPath) -> Self {
        EntryPathRepr {
            raw: path.raw(),
            segments: path.segments,
        }
    }
}

impl EntryPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EntryPath {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// The empty path (collection root).
    pub fn root() -> Self {
        EntryPath::default()
    }

    /// Parse a joined path, ignoring empty segments.
    pub fn parse(raw: &str) -> Self {
        EntryPath::new(
            raw.split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn raw(&self) -> String {
        self.segments.join(&SEPARATOR.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, i.e. the entry's own name.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn join(&self, name: &str) -> EntryPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        EntryPath { segments }
    }

    /// Concatenate two paths.
    pub fn extend(&self, tail: &EntryPath) -> EntryPath {
        let mut segments = self.segments.clone();
        segments.extend(tail.segments.iter().cloned());
        EntryPath { segments }
    }

    /// Path without its last segment. The parent of the root is the root.
    pub fn parent(&self) -> EntryPath {
        let mut segments = self.segments.clone();
        segments.pop();
        EntryPath { segments }
    }

    /// Segment-wise prefix test (`a/bc` does not start with `a/b`).
    pub fn starts_with(&self, prefix: &EntryPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Strictly below `ancestor`.
    pub fn is_under(&self, ancestor: &EntryPath) -> bool {
        self.segments.len() > ancestor.segments.len() && self.starts_with(ancestor)
    }

    pub fn strip_prefix(&self, prefix: &EntryPath) -> Option<EntryPath> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(EntryPath {
            segments: self.segments[prefix.segments.len()..].to_vec(),
        })
    }

    /// Replace the leading `old` segments with `new`. Returns `None` when
    /// `old` is not a prefix of this path.
    pub fn replace_prefix(&self, old: &EntryPath, new: &EntryPath) -> Option<EntryPath> {
        self.strip_prefix(old).map(|tail| new.extend(&tail))
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw())
    }
}
