//! Header types for the four nesting levels of the result stream.
//!
//! ```text
//! ResponseHeader
//!   ResultHeader  [remaining, partial]
//!     SeriesHeader  [remaining, partial]
//!       RowRecord ...
//!     [remaining, partial] ...
//!   ResultHeader ...
//! ```

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chunk marker preceding a batch of sibling elements.
///
/// `complete == false` means another marker follows once `remaining`
/// elements have been consumed at that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkHeader {
    pub remaining: u64,
    pub complete: bool,
}

impl ChunkHeader {
    pub fn new(remaining: u64, complete: bool) -> Self {
        Self {
            remaining,
            complete,
        }
    }

    /// Returns whether this marker ends its level.
    pub fn is_terminal(&self) -> bool {
        self.complete && self.remaining == 0
    }
}

/// Header read once at the start of the stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseHeader {
    pub result_count: i64,
    pub error: Option<String>,
}

/// Header of one result (one statement of a query).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultHeader {
    pub id: i64,
    pub messages: Vec<Message>,
    pub error: Option<String>,
}

/// Header of one series inside a result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesHeader {
    pub name: Option<String>,
    pub tags: Tags,
    pub columns: Vec<String>,
    pub error: Option<String>,
}

/// One row record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRecord {
    pub values: Vec<Value>,
    pub error: Option<String>,
}

/// Informational message attached to a result by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    pub level: String,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Series tags in the order the server declared them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(Vec<(String, String)>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tag, replacing the value of an existing key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Tags::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}
