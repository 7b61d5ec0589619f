//! Tagged payload value.
//!
//! The source system represents atom payloads and handler results as
//! unstructured maps. `spec.md` §9 ("Dynamic payload typing") asks for a
//! typed stand-in; this is that type. Handlers read it through the typed
//! accessors below, which return `None` on a missing key or a type
//! mismatch rather than panicking — the Execution Engine maps that `None`
//! to `VALIDATION` (see `engine.rs`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A dynamically typed value carried in an atom payload or handler result.
///
/// Tagged (not `#[serde(untagged)]`): the wire codec (de)serializes this
/// type through `bincode`, which is not self-describing and requires
/// `deserialize_any` for an untagged enum — a combination that always
/// fails. The JSON bridge (`From<serde_json::Value>` below) already
/// handles the untagged-on-the-wire-to-JSON case by hand, so nothing
/// downstream depends on this enum's own serde representation being
/// untagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A UTF-8 string.
    Str(String),
    /// Opaque binary data.
    Bytes(Vec<u8>),
    /// An ordered sequence of values.
    Seq(Vec<Value>),
    /// A string-keyed map, ordered for deterministic encoding.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build an empty map value.
    #[must_use]
    pub fn empty_map() -> Self {
        Value::Map(BTreeMap::new())
    }

    /// Look up a key when `self` is a `Map`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Borrow as a string, if this value is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Read as an `i64`, if this value is an `Int`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Read as an `f64`, accepting both `Int` and `Float`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Read as a `bool`, if this value is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as a sequence, if this value is a `Seq`.
    #[must_use]
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Borrow as a map, if this value is a `Map`.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Whether this value is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Approximate serialized size in bytes, used to enforce
    /// `max_payload_size` without a full encode pass.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 8,
            Value::Float(_) => 8,
            Value::Str(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Seq(items) => items.iter().map(Value::approx_size).sum(),
            Value::Map(map) => map
                .iter()
                .map(|(k, v)| k.len() + v.approx_size())
                .sum::<usize>(),
        }
    }

    /// Evaluate a single comparison operator (`$gt $gte $lt $lte $ne`) or
    /// plain equality against `other`, as used by the object-filter matcher
    /// in the Execution Context's utilities (`engine.rs::Utilities::matches`).
    #[must_use]
    pub fn compare(&self, op: &str, other: &Value) -> bool {
        match op {
            "$ne" => self != other,
            "$gt" | "$gte" | "$lt" | "$lte" => {
                let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) else {
                    return false;
                };
                match op {
                    "$gt" => a > b,
                    "$gte" => a >= b,
                    "$lt" => a < b,
                    "$lte" => a <= b,
                    _ => unreachable!(),
                }
            }
            _ => self == other,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Seq(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Bytes(b) => {
                serde_json::Value::Array(b.into_iter().map(|byte| byte.into()).collect())
            }
            Value::Seq(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_get_returns_none_for_missing_key() {
        let v = Value::empty_map();
        assert_eq!(v.get("missing"), None);
    }

    #[test]
    fn compare_operators() {
        let a = Value::Int(5);
        let b = Value::Int(3);
        assert!(a.compare("$gt", &b));
        assert!(!b.compare("$gt", &a));
        assert!(a.compare("$gte", &Value::Int(5)));
        assert!(b.compare("$lt", &a));
        assert!(a.compare("$ne", &b));
        assert!(!a.compare("$ne", &Value::Int(5)));
    }

    #[test]
    fn roundtrip_via_json() {
        let json = serde_json::json!({"a": 1, "b": [1, 2.5, "x", null, true]});
        let value: Value = json.clone().into();
        let back: serde_json::Value = value.into();
        assert_eq!(json, back);
    }

    #[test]
    fn approx_size_sums_nested() {
        let v = Value::Map(BTreeMap::from([
            ("k".to_string(), Value::Str("hello".to_string())),
        ]));
        assert_eq!(v.approx_size(), 1 + 5);
    }
}
