//! The PackStream value universe (§3, §4.3).

use std::collections::HashMap;

/// A self-describing PackStream value.
///
/// Maps use `Vec<(String, Value)>` rather than a `HashMap` so that encode
/// order is preserved for round-trip tests and so callers that only ever
/// read a handful of keys don't pay hashing cost; [`Value::as_map`] still
/// rejects duplicate keys the way a `HashMap` construction would.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
    Struct { tag: u8, fields: Vec<Value> },
}

impl Value {
    pub fn map_from_pairs<I>(pairs: I) -> Value
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Value::Map(pairs.into_iter().collect())
    }

    /// Build a map, rejecting duplicate keys outright. This is the
    /// constructor callers should use when building request parameter maps
    /// by hand, since the wire encoder only catches duplicates that reach
    /// it undetected.
    pub fn checked_map<I>(pairs: I) -> Result<Value, String>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (k, v) in pairs {
            if !seen.insert(k.clone()) {
                return Err(k);
            }
            out.push((k, v));
        }
        Ok(Value::Map(out))
    }

    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_hashmap(self) -> Option<HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m.into_iter().collect()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::List(iter.into_iter().collect())
    }
}
