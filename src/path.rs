//! Paths addressing locations within the state tree.
//!
//! A path is an ordered sequence of keys from the root to a value. Keys are
//! either object member names or array indices. Two paths are equal iff they
//! have the same keys in the same order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single step in a path: an object member name or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Object member access.
    Name(String),
    /// Array element access.
    Index(usize),
}

impl Key {
    /// Get the member name if this is a name key.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(n) => Some(n),
            Key::Index(_) => None,
        }
    }

    /// Get the index if this is an index key.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Name(_) => None,
            Key::Index(i) => Some(*i),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(n) => write!(f, "{}", n),
            Key::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

/// An ordered key sequence locating a subtree within the root value.
///
/// The empty path addresses the root itself. Displays in dot notation
/// (`counter`, `nested.state`, `items.0.name`); the root displays as `$`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Key>);

impl Path {
    /// The empty path, addressing the root value.
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// Build a path from a key sequence.
    pub fn from_keys(keys: Vec<Key>) -> Self {
        Path(keys)
    }

    /// True if this path addresses the root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of keys in this path.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the path has no keys (same as [`is_root`](Self::is_root)).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The keys of this path, in order.
    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    /// The final key, if any.
    pub fn last(&self) -> Option<&Key> {
        self.0.last()
    }

    /// A new path extended by one key.
    pub fn child(&self, key: impl Into<Key>) -> Path {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Path(keys)
    }

    /// The path without its final key. `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// The prefix of this path with the given length.
    ///
    /// Panics if `len` exceeds the path length.
    pub fn prefix(&self, len: usize) -> Path {
        Path(self.0[..len].to_vec())
    }

    /// True if `prefix` matches the beginning of this path.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Iterate over the keys.
    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "$");
        }
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

impl FromIterator<Key> for Path {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Key;

    fn index(&self, index: usize) -> &Key {
        &self.0[index]
    }
}

impl From<Vec<Key>> for Path {
    fn from(keys: Vec<Key>) -> Self {
        Path(keys)
    }
}

/// Build a [`Path`] from a sequence of keys.
///
/// String literals become name keys, integers become index keys:
///
/// ```
/// use arbor::path;
///
/// let p = path!("items", 0, "name");
/// assert_eq!(p.to_string(), "items.0.name");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($key:expr),+ $(,)?) => {{
        let mut keys = Vec::new();
        $(keys.push($crate::Key::from($key));)+
        $crate::Path::from_keys(keys)
    }};
}
