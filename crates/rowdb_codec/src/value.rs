//! The self-describing row value model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A row's raw field storage: field name → value, ordered by name.
pub type FieldMap = BTreeMap<String, Value>;

/// A single field value.
///
/// The model is deliberately small: scalar types plus flat arrays.
/// Arrays hold indexable sets of scalars (multi-valued secondary keys,
/// multi-reference foreign keys); nesting is not part of the row model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent / cleared value. Null fields are never indexed.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating-point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// A set of indexable values.
    Array(Vec<Value>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text content, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the array elements, if this is an array value.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The string form of this value as used inside index keys.
    ///
    /// Mirrors the stringification the backing store sees: text is used
    /// verbatim, numbers and booleans in their canonical display form.
    /// Null has no index form; callers skip null values when emitting
    /// index entries. Arrays are indexed per element, so their index
    /// form is the caller's concern.
    #[must_use]
    pub fn index_key(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Array(_) => String::new(),
        }
    }

    /// The values this field contributes to an index: one entry per
    /// array element, one entry for a non-null scalar, none for null.
    #[must_use]
    pub fn index_values(&self) -> Vec<String> {
        match self {
            Self::Null => Vec::new(),
            Self::Array(items) => items
                .iter()
                .filter(|v| !v.is_null())
                .map(Value::index_key)
                .collect(),
            other => vec![other.index_key()],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_key_forms() {
        assert_eq!(Value::from("Ann").index_key(), "Ann");
        assert_eq!(Value::from(42i64).index_key(), "42");
        assert_eq!(Value::from(true).index_key(), "true");
        assert_eq!(Value::Null.index_key(), "");
    }

    #[test]
    fn index_values_skip_null() {
        assert!(Value::Null.index_values().is_empty());
        assert_eq!(Value::from(7i64).index_values(), vec!["7".to_string()]);
    }

    #[test]
    fn array_indexes_per_element() {
        let v = Value::Array(vec![Value::from("a"), Value::Null, Value::from("b")]);
        assert_eq!(v.index_values(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
    }
}
