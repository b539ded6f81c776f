//! Dynamic column values.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// A single column value.
///
/// Comparisons follow SQL semantics: `Null` is never equal to anything,
/// and `Int`/`Float` compare numerically with each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Opaque unique identifier.
    Uuid(Uuid),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns a short name of the value's type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Returns the text content, if this is `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float content, if this is `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the identifier, if this is `Uuid`.
    #[must_use]
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Returns the epoch milliseconds, if this is `Timestamp`.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the byte content, if this is `Bytes`.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns true if the value can take part in `>=` / `<` comparisons.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Timestamp(_))
    }

    /// SQL equality: false whenever either side is null.
    #[must_use]
    pub fn sql_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Int(a), Value::Timestamp(b)) | (Value::Timestamp(b), Value::Int(a)) => a == b,
            (a, b) => a == b,
        }
    }

    /// Numeric ordering; `None` if either side is null or not numeric.
    #[must_use]
    pub fn numeric_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b))
            | (Value::Timestamp(a), Value::Timestamp(b))
            | (Value::Timestamp(a), Value::Int(b))
            | (Value::Int(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Uuid(u) => write!(f, "'{u}'"),
            Value::Timestamp(t) => write!(f, "ts:{t}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
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
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_never_equal() {
        assert!(!Value::Null.sql_eq(&Value::Null));
        assert!(!Value::Null.sql_eq(&Value::Int(1)));
        assert!(!Value::Int(1).sql_eq(&Value::Null));
    }

    #[test]
    fn numeric_equality_crosses_int_and_float() {
        assert!(Value::Int(3).sql_eq(&Value::Float(3.0)));
        assert!(Value::Float(3.0).sql_eq(&Value::Int(3)));
        assert!(!Value::Int(3).sql_eq(&Value::Float(3.5)));
    }

    #[test]
    fn uuid_does_not_equal_its_text_form() {
        let id = Uuid::new_v4();
        assert!(!Value::Uuid(id).sql_eq(&Value::Text(id.to_string())));
        assert!(Value::Uuid(id).sql_eq(&Value::Uuid(id)));
    }

    #[test]
    fn numeric_cmp_rejects_text() {
        assert_eq!(Value::Int(1).numeric_cmp(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(
            Value::Float(2.5).numeric_cmp(&Value::Int(2)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Text("1".into()).numeric_cmp(&Value::Int(1)), None);
        assert_eq!(Value::Null.numeric_cmp(&Value::Int(1)), None);
    }

    #[test]
    fn option_conversion() {
        let none: Option<i64> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn display_quotes_text() {
        assert_eq!(Value::from("it's").to_string(), "'it''s'");
        assert_eq!(Value::Int(7).to_string(), "7");
    }

    mod numeric_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn int_and_timestamp_order_like_i64(a in any::<i64>(), b in any::<i64>()) {
                prop_assert_eq!(Value::Int(a).numeric_cmp(&Value::Int(b)), Some(a.cmp(&b)));
                prop_assert_eq!(Value::Int(a).numeric_cmp(&Value::Timestamp(b)), Some(a.cmp(&b)));
                prop_assert_eq!(Value::Timestamp(a).numeric_cmp(&Value::Int(b)), Some(a.cmp(&b)));
            }

            #[test]
            fn ordering_is_antisymmetric(a in -1_000_000i64..1_000_000, b in -1.0e6f64..1.0e6) {
                let forward = Value::Int(a).numeric_cmp(&Value::Float(b));
                let backward = Value::Float(b).numeric_cmp(&Value::Int(a));
                prop_assert_eq!(forward.map(Ordering::reverse), backward);
            }

            #[test]
            fn null_never_compares(a in any::<i64>()) {
                prop_assert_eq!(Value::Null.numeric_cmp(&Value::Int(a)), None);
                prop_assert_eq!(Value::Int(a).numeric_cmp(&Value::Null), None);
            }
        }
    }
}
