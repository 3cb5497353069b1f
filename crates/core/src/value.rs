//! Value type definitions for Strand documents.
//!
//! This module defines the `Value` enum, the tagged union every document field
//! holds. It is JSON-representable, totally ordered across types and hashable,
//! so it can key dedup tables and drive query sorting.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Ordered mapping of field name to value.
pub type Fields = BTreeMap<String, Value>;

/// A value that can be stored in a document field.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit floating point number
    Number(f64),
    /// UTF-8 string
    String(String),
    /// Timestamp as Unix milliseconds
    Timestamp(i64),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Nested mapping
    Map(Fields),
}

impl Value {
    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Compares two values only when they share a type rank.
    ///
    /// Range selectors use this so that `Lt("age", 3)` never matches a string.
    pub fn compare_same_type(&self, other: &Value) -> Option<Ordering> {
        (self.type_order() == other.type_order()).then(|| self.cmp(other))
    }

    /// Converts this value into a plain JSON value.
    ///
    /// Timestamps become their millisecond number; non-finite numbers become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ms) => serde_json::Value::Number((*ms).into()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Timestamp(_) => 4,
            Value::Array(_) => 5,
            Value::Map(_) => 6,
        }
    }
}

/// Resolves a dotted path such as `owner.name` or `tags.0` inside `fields`.
pub fn lookup<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Map(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                // NaN equals NaN so documents stay comparable
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                // 0.0 and -0.0 compare equal, and so do all NaNs
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::String(s) => s.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::Array(items) => items.hash(state),
            Value::Map(map) => map.hash(state),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => {
                // NaN sorts after every other number
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
                }
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Fields> for Value {
    fn from(v: Fields) -> Self {
        Value::Map(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Number(3.5).as_f64(), Some(3.5));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Timestamp(1_700_000_000_000).as_timestamp(), Some(1_700_000_000_000));
        assert_eq!(Value::Null.as_str(), None);
        assert!(Value::default().is_null());
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_eq!(Value::Number(0.0), Value::Number(-0.0));
        assert_ne!(Value::Number(42.0), Value::Timestamp(42));
        assert_ne!(Value::Null, Value::Bool(false));
    }

    #[test]
    fn test_value_hash_matches_equality() {
        let mut set = HashSet::new();
        set.insert(Value::Number(0.0));
        set.insert(Value::Number(-0.0));
        set.insert(Value::Number(f64::NAN));
        set.insert(Value::Number(f64::NAN));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Number(1.0) < Value::Number(2.0));
        assert!(Value::String("a".into()) < Value::String("b".into()));
        assert!(Value::Null < Value::Bool(false));
        assert!(Value::Bool(true) < Value::Number(-10.0));
        assert!(Value::Number(1e9) < Value::Number(f64::NAN));
    }

    #[test]
    fn test_compare_same_type() {
        let two = Value::from(2);
        assert_eq!(two.compare_same_type(&Value::from(3)), Some(Ordering::Less));
        assert_eq!(two.compare_same_type(&Value::from("3")), None);
    }

    #[test]
    fn test_lookup_nested_paths() {
        let doc: Value = json!({
            "owner": {"name": "ada"},
            "tags": ["a", "b"],
        })
        .into();
        let fields = doc.as_map().cloned().unwrap_or_default();

        assert_eq!(lookup(&fields, "owner.name"), Some(&Value::from("ada")));
        assert_eq!(lookup(&fields, "tags.1"), Some(&Value::from("b")));
        assert_eq!(lookup(&fields, "tags.9"), None);
        assert_eq!(lookup(&fields, "owner.name.first"), None);
        assert_eq!(lookup(&fields, "missing"), None);
    }

    #[test]
    fn test_json_conversion() {
        let value = Value::from(json!({"text": "X", "n": 2, "ok": true, "nothing": null}));
        assert_eq!(value.get("text"), Some(&Value::from("X")));
        assert_eq!(value.get("n"), Some(&Value::Number(2.0)));
        assert_eq!(value.to_json(), json!({"text": "X", "n": 2.0, "ok": true, "nothing": null}));
        assert_eq!(Value::Timestamp(5).to_json(), json!(5));
    }

    #[test]
    fn test_tagged_serialization() {
        let encoded = serde_json::to_string(&Value::from("hi")).unwrap();
        assert_eq!(encoded, r#"{"type":"string","value":"hi"}"#);
        let decoded: Value = serde_json::from_str(r#"{"type":"null"}"#).unwrap();
        assert!(decoded.is_null());
    }

    #[test]
    fn test_value_from_impls() {
        let v: Value = 42i32.into();
        assert_eq!(v.as_f64(), Some(42.0));

        let v: Value = Some("x").into();
        assert_eq!(v.as_str(), Some("x"));

        let v: Value = None::<i64>.into();
        assert!(v.is_null());
    }
}
