//! Dotted option keys
//!
//! A key such as `"editor.indent.width"` is split on `.` into segments. The
//! first segment is the main key and must name a top-level default. There is
//! no escaping: a literal `.` inside a segment cannot be expressed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered path of key segments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parse a dotted key string
    pub fn parse(key: &str) -> Self {
        Self {
            segments: key.split('.').map(str::to_string).collect(),
        }
    }

    /// Use already-split segments as-is
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// First segment; empty string for an empty path
    pub fn main_key(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    /// Segments below the main key
    pub fn sub_path(&self) -> &[String] {
        self.segments.get(1..).unwrap_or(&[])
    }

    pub fn has_sub_path(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Rejoin into the dotted form used for change batches
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

impl From<&str> for KeyPath {
    fn from(key: &str) -> Self {
        Self::parse(key)
    }
}

impl From<String> for KeyPath {
    fn from(key: String) -> Self {
        Self::parse(&key)
    }
}

impl From<&String> for KeyPath {
    fn from(key: &String) -> Self {
        Self::parse(key)
    }
}

impl From<Vec<String>> for KeyPath {
    fn from(segments: Vec<String>) -> Self {
        Self { segments }
    }
}

impl From<&[&str]> for KeyPath {
    fn from(segments: &[&str]) -> Self {
        Self::from_segments(segments.iter().copied())
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> Self {
        path.dotted()
    }
}
