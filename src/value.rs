//! The immutable state value tree.
//!
//! [`Value`] is a JSON-shaped tree whose aggregate variants share their
//! payloads behind [`Arc`]s. Cloning a value is a reference-count bump, so
//! a mutation at one path can rebuild the spine from that node to the root
//! while every untouched sibling subtree is reused by reference. Identity
//! comparison ([`Value::same`]) distinguishes "the very same subtree" from
//! a structurally equal copy; the dirty-propagation and no-op short-circuit
//! machinery is built on it.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::path::{Key, Path};

/// Object payload: ordered string-keyed members.
pub type Object = BTreeMap<String, Value>;

/// A node in the state tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<Object>),
}

impl Value {
    /// Identity equality.
    ///
    /// Aggregates compare by shared allocation (`Arc::ptr_eq`); scalars and
    /// strings compare by value, matching primitive semantics. Structural
    /// equality of two independently built aggregates does NOT make them
    /// `same`.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The child at `key`, if this value is a matching container.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        match (self, key) {
            (Value::Object(map), Key::Name(name)) => map.get(name),
            (Value::Array(items), Key::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    /// The value at `path` below this one, walking one key at a time.
    pub fn at(&self, path: &Path) -> Option<&Value> {
        let mut cur = self;
        for key in path.iter() {
            cur = cur.get(key)?;
        }
        Some(cur)
    }

    /// True if this value can hold children under the given key kind.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Mutable access to the object payload, cloning one level if shared.
    ///
    /// The clone is shallow: member values keep sharing their own subtrees.
    /// `None` if this value is not an object.
    pub fn object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(map) => Some(Arc::make_mut(map)),
            _ => None,
        }
    }

    /// Mutable access to the array payload, cloning one level if shared.
    pub fn array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(Arc::make_mut(items)),
            _ => None,
        }
    }

    /// A copy of this container with `child` substituted at `key`, cloning
    /// one shallow level and reusing every other member by reference.
    ///
    /// Inserts a new object member or appends when the index equals the
    /// array length. `None` if this value is not a container matching the
    /// key kind, or the index is past the end.
    pub(crate) fn with_entry(&self, key: &Key, child: Value) -> Option<Value> {
        match (self, key) {
            (Value::Object(map), Key::Name(name)) => {
                let mut map = (**map).clone();
                map.insert(name.clone(), child);
                Some(Value::Object(Arc::new(map)))
            }
            (Value::Array(items), Key::Index(i)) => {
                if *i > items.len() {
                    return None;
                }
                let mut items = (**items).clone();
                if *i == items.len() {
                    items.push(child);
                } else {
                    items[*i] = child;
                }
                Some(Value::Array(Arc::new(items)))
            }
            _ => None,
        }
    }

    /// A copy of this container with the entry at `key` removed.
    ///
    /// Returns the identical value (same allocation) when the key is
    /// absent, so removal of a non-existent entry stays an identity no-op.
    /// `None` if this value is not a container matching the key kind.
    pub(crate) fn without_entry(&self, key: &Key) -> Option<Value> {
        match (self, key) {
            (Value::Object(map), Key::Name(name)) => {
                if !map.contains_key(name) {
                    return Some(self.clone());
                }
                let mut map = (**map).clone();
                map.remove(name);
                Some(Value::Object(Arc::new(map)))
            }
            (Value::Array(items), Key::Index(i)) => {
                if *i >= items.len() {
                    return Some(self.clone());
                }
                let mut items = (**items).clone();
                items.remove(*i);
                Some(Value::Array(Arc::new(items)))
            }
            _ => None,
        }
    }

    /// Convert from a `serde_json` value.
    pub fn from_json(json: Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n),
            Json::String(s) => Value::String(Arc::from(s.as_str())),
            Json::Array(items) => {
                Value::Array(Arc::new(items.into_iter().map(Value::from_json).collect()))
            }
            Json::Object(map) => Value::Object(Arc::new(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            )),
        }
    }

    /// Convert to a `serde_json` value.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Number(n.clone()),
            Value::String(s) => Json::String(s.to_string()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Json::deserialize(deserializer).map(Value::from_json)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from_json(json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(i64::from(n).into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s.as_str()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Value::Object(Arc::new(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_identity_vs_structural_equality() {
        let a = Value::from_json(json!({"x": 1}));
        let b = Value::from_json(json!({"x": 1}));
        assert_eq!(a, b);
        assert!(!a.same(&b));
        assert!(a.same(&a.clone()));

        // Scalars and strings are primitives: value identity.
        assert!(Value::from("x").same(&Value::from("x")));
        assert!(Value::from(3i64).same(&Value::from(3i64)));
        assert!(!Value::from(3i64).same(&Value::from(4i64)));
    }

    #[test]
    fn test_get_and_at() {
        let v = Value::from_json(json!({"items": [{"name": "a"}, {"name": "b"}]}));
        assert_eq!(
            v.at(&path!("items", 1, "name")).and_then(Value::as_str),
            Some("b")
        );
        assert_eq!(v.at(&path!("items", 2)), None);
        assert_eq!(v.at(&path!("missing", "deep")), None);
    }

    #[test]
    fn test_with_entry_shares_siblings() {
        let root = Value::from_json(json!({"a": {"x": 1}, "b": {"y": 2}}));
        let updated = root
            .with_entry(&Key::from("a"), Value::from_json(json!({"x": 9})))
            .unwrap();

        // Untouched sibling is reused, not copied.
        let old_b = root.get(&Key::from("b")).unwrap();
        let new_b = updated.get(&Key::from("b")).unwrap();
        assert!(old_b.same(new_b));
        assert!(!root.same(&updated));
    }

    #[test]
    fn test_with_entry_array_bounds() {
        let arr = Value::from_json(json!([1, 2]));
        let replaced = arr.with_entry(&Key::from(0), Value::from(9i64)).unwrap();
        assert_eq!(replaced.to_json(), json!([9, 2]));

        let appended = arr.with_entry(&Key::from(2), Value::from(3i64)).unwrap();
        assert_eq!(appended.to_json(), json!([1, 2, 3]));

        assert!(arr.with_entry(&Key::from(5), Value::Null).is_none());
        assert!(Value::from(1i64)
            .with_entry(&Key::from("a"), Value::Null)
            .is_none());
    }

    #[test]
    fn test_without_entry_absent_is_identity() {
        let v = Value::from_json(json!({"a": 1}));
        let unchanged = v.without_entry(&Key::from("b")).unwrap();
        assert!(v.same(&unchanged));

        let removed = v.without_entry(&Key::from("a")).unwrap();
        assert_eq!(removed.to_json(), json!({}));
    }

    #[test]
    fn test_object_mut_is_shallow() {
        let shared = Value::from_json(json!({"deep": [1, 2, 3]}));
        let mut v = Value::from_json(json!({}));
        v.object_mut().unwrap().insert("child".into(), shared.clone());

        let mut copy = v.clone();
        copy.object_mut().unwrap().insert("extra".into(), Value::Null);

        // One level was cloned; the nested subtree is still shared.
        assert!(v
            .get(&Key::from("child"))
            .unwrap()
            .same(copy.get(&Key::from("child")).unwrap()));
        assert!(v.get(&Key::from("extra")).is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let json = json!({"n": 1.5, "s": "hi", "l": [true, null], "o": {"k": 2}});
        let v = Value::from_json(json.clone());
        assert_eq!(v.to_json(), json);
        assert_eq!(v.to_string(), json.to_string());
    }

    #[test]
    fn test_serde_bridge() {
        let v = Value::from_json(json!({"a": [1, "two"]}));
        let s = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(back, v);
    }
}
