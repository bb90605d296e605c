//! JSON-like values carried as awareness state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A JSON value.
///
/// Objects keep their keys sorted so that two equal values always serialize
/// to the same bytes on every peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// An empty object, `{}`
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    /// Parse a value from its JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Compact JSON text, with no insignificant whitespace
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
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
            Value::Number(Number::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(Number::Float(n)) => Some(*n),
            Value::Number(Number::Integer(n)) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get a value at a path (e.g., "cursor.anchor" or "selection[0]")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }

        let mut current = self;
        for segment in PathSegment::parse(path) {
            match segment {
                PathSegment::Key(key) => {
                    current = current.as_object()?.get(key)?;
                }
                PathSegment::Index(idx) => {
                    current = current.as_array()?.get(idx)?;
                }
            }
        }
        Some(current)
    }

    /// Set a value at a path, creating intermediate objects/arrays as needed
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<()> {
        if path.is_empty() {
            *self = value;
            return Ok(());
        }

        let segments: Vec<PathSegment> = PathSegment::parse(path).collect();
        if segments.is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }

        let last = segments.len() - 1;
        let mut current = self;

        for (i, segment) in segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) => {
                    if !matches!(current, Value::Object(_)) {
                        *current = Value::object();
                    }

                    if let Value::Object(map) = current {
                        if i == last {
                            map.insert(key.to_string(), value);
                            return Ok(());
                        }
                        current = map.entry(key.to_string()).or_insert(Value::Null);
                    }
                }
                PathSegment::Index(idx) => {
                    if !matches!(current, Value::Array(_)) {
                        *current = Value::Array(Vec::new());
                    }

                    if let Value::Array(arr) = current {
                        while arr.len() <= *idx {
                            arr.push(Value::Null);
                        }
                        if i == last {
                            arr[*idx] = value;
                            return Ok(());
                        }
                        current = &mut arr[*idx];
                    }
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(text) => f.write_str(&text),
            Err(_) => Err(std::fmt::Error),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(Number::Integer(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(Number::Float(v))
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

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Object(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Number(Number::Integer(i)),
                None => Value::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(Into::into).collect()),
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Number type supporting both integers and floats
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

// `1` and `1.0` are the same JSON number.
impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b,
            (Number::Integer(a), Number::Float(b)) | (Number::Float(b), Number::Integer(a)) => {
                (*a as f64) == *b
            }
        }
    }
}

/// Path segment for navigating a value
#[derive(Debug, Clone)]
pub enum PathSegment<'a> {
    Key(&'a str),
    Index(usize),
}

impl<'a> PathSegment<'a> {
    /// Parse a path string into segments
    /// Examples: "user.name", "cursors[0]", "cursors[0].anchor"
    pub fn parse(path: &'a str) -> impl Iterator<Item = PathSegment<'a>> {
        PathParser { path, pos: 0 }
    }
}

struct PathParser<'a> {
    path: &'a str,
    pos: usize,
}

impl<'a> Iterator for PathParser<'a> {
    type Item = PathSegment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.path.len() {
            return None;
        }

        let remaining = &self.path[self.pos..];

        // Skip leading dot
        let remaining = remaining.strip_prefix('.').unwrap_or(remaining);
        if remaining.is_empty() {
            return None;
        }
        self.pos = self.path.len() - remaining.len();

        if remaining.starts_with('[') {
            if let Some(end) = remaining.find(']') {
                let idx_str = &remaining[1..end];
                self.pos += end + 1;
                if let Ok(idx) = idx_str.parse::<usize>() {
                    return Some(PathSegment::Index(idx));
                }
                return self.next();
            }
        }

        let end = remaining
            .find(|c| c == '.' || c == '[')
            .unwrap_or(remaining.len());

        let key = &remaining[..end];
        self.pos += end;

        if key.is_empty() {
            self.next()
        } else {
            Some(PathSegment::Key(key))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_parsing() {
        let segments: Vec<_> = PathSegment::parse("user.cursors[0].anchor").collect();
        assert!(matches!(segments[0], PathSegment::Key("user")));
        assert!(matches!(segments[1], PathSegment::Key("cursors")));
        assert!(matches!(segments[2], PathSegment::Index(0)));
        assert!(matches!(segments[3], PathSegment::Key("anchor")));
    }

    #[test]
    fn test_value_set_path() {
        let mut value = Value::object();
        value.set_path("user.name", Value::String("Bob".to_string())).unwrap();

        assert_eq!(
            value.get_path("user.name"),
            Some(&Value::String("Bob".to_string()))
        );
    }

    #[test]
    fn test_set_path_replaces_scalars_with_containers() {
        let mut value = Value::from(3i64);
        value.set_path("cursors[1]", Value::from(7i64)).unwrap();

        assert_eq!(value.get_path("cursors[0]"), Some(&Value::Null));
        assert_eq!(value.get_path("cursors[1]").and_then(Value::as_i64), Some(7));
    }

    #[test]
    fn test_json_keys_are_sorted() {
        let value = Value::from_json(r##"{"name":"Alice","color":"#f00","cursor":null}"##).unwrap();
        assert_eq!(
            value.to_json().unwrap(),
            r##"{"color":"#f00","cursor":null,"name":"Alice"}"##
        );
    }

    #[test]
    fn test_null_json() {
        let value = Value::from_json("null").unwrap();
        assert!(value.is_null());
        assert_eq!(value.to_json().unwrap(), "null");
    }

    #[test]
    fn test_deep_equality() {
        let a = Value::from_json(r#"{"user":{"name":"Alice","tags":[1,2]}}"#).unwrap();
        let b = Value::from_json(r#"{"user":{"tags":[1,2],"name":"Alice"}}"#).unwrap();
        let c = Value::from_json(r#"{"user":{"tags":[2,1],"name":"Alice"}}"#).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Value::from(1i64), Value::from(1.0));
    }

    #[test]
    fn test_from_serde_json() {
        let value: Value = serde_json::json!({"a": 1, "b": [true, "x"]}).into();
        assert_eq!(value.get_path("a").and_then(Value::as_i64), Some(1));
        assert_eq!(value.get_path("b[0]").and_then(Value::as_bool), Some(true));
        assert_eq!(value.get_path("b[1]").and_then(Value::as_str), Some("x"));
    }
}
