//! Scalar values and result rows.
//!
//! `Value` is the driver-neutral cell type. Every driver converts its native
//! column types into it, and the query builder renders it back into SQL
//! literals through the active dialect.

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// A single database cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Trait for database values that can be extracted to Rust types.
///
/// Lets result processing stay agnostic of how a driver represented the
/// cell (postgres returns typed integers, sqlite may hand back text).
pub trait DatabaseValue: Clone + Debug {
    /// Extract as String if the value is string-like.
    fn as_string(&self) -> Option<String>;

    /// Extract as i64 if the value is numeric.
    ///
    /// Floats are truncated; numeric text is parsed.
    fn as_i64(&self) -> Option<i64>;

    /// Extract as f64 if the value is numeric.
    fn as_f64(&self) -> Option<f64>;

    /// Extract as bool if the value is boolean.
    fn as_bool(&self) -> Option<bool>;

    /// Get type name for debugging/error messages.
    fn type_name(&self) -> &'static str;

    fn as_i64_or(&self, default: i64) -> i64 {
        self.as_i64().unwrap_or(default)
    }

    fn as_string_or(&self, default: &str) -> String {
        self.as_string().unwrap_or_else(|| default.to_string())
    }

    fn as_bool_or(&self, default: bool) -> bool {
        self.as_bool().unwrap_or(default)
    }
}

impl DatabaseValue for Value {
    fn as_string(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Bytes(_) => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Text(s) => match s.as_str() {
                "t" | "true" | "1" => Some(true),
                "f" | "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert into a JSON value for the object form of a result.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", hex::encode(b)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
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

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
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

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row: column names shared across the result, values owned.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Look up a cell by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Look up a cell by position.
    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Object form of the row, used by `ResultCursor::result_object`.
    pub fn to_json_object(&self) -> serde_json::Value {
        let map = self
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(cols: &[&str], values: Vec<Value>) -> Row {
        Row::new(
            Arc::new(cols.iter().map(|c| c.to_string()).collect()),
            values,
        )
    }

    #[rstest]
    #[case(Value::Int(42), Some(42))]
    #[case(Value::Float(42.7), Some(42))]
    #[case(Value::Text("17".into()), Some(17))]
    #[case(Value::Text("abc".into()), None)]
    #[case(Value::Null, None)]
    fn test_as_i64(#[case] value: Value, #[case] expected: Option<i64>) {
        assert_eq!(value.as_i64(), expected);
    }

    #[test]
    fn test_as_bool_from_postgres_text() {
        assert_eq!(Value::Text("t".into()).as_bool(), Some(true));
        assert_eq!(Value::Text("f".into()).as_bool(), Some(false));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Value::Null.as_string_or("none"), "none");
        assert_eq!(Value::Null.as_i64_or(7), 7);
        assert!(!Value::Bytes(vec![1]).as_bool_or(false));
    }

    #[test]
    fn test_option_into_value() {
        let v: Value = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: Value = Some("x").into();
        assert_eq!(v, Value::Text("x".into()));
    }

    #[test]
    fn test_row_lookup_by_name() {
        let r = row(&["uid", "username"], vec![Value::Int(1), "zhj".into()]);
        assert_eq!(r.get("username"), Some(&Value::Text("zhj".into())));
        assert_eq!(r.get("missing"), None);
        assert_eq!(r.get_index(0), Some(&Value::Int(1)));
    }

    #[test]
    fn test_row_serializes_as_map() {
        let r = row(&["uid", "username"], vec![Value::Int(1), "zhj".into()]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json, serde_json::json!({"uid": 1, "username": "zhj"}));
        assert_eq!(r.to_json_object(), json);
    }

    #[test]
    fn test_untagged_roundtrip_of_cells() {
        let cells: Vec<Value> = serde_json::from_str(r#"[null, true, 3, 1.5, "a"]"#).unwrap();
        assert_eq!(
            cells,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(3),
                Value::Float(1.5),
                Value::Text("a".into())
            ]
        );
    }
}
