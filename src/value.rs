//! Dynamic value tree stored in record field slots.
//!
//! A `Value` is what a caller hands to a setter and what a getter returns.
//! Nested records are values too: cloning a `Value::Record` deep-copies the
//! instance, its slots and its history.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::fmt;

use crate::instance::Instance;

/// A dynamically typed field value.
#[derive(Debug, Clone)]
pub enum Value {
    /// The distinguished null/absent value
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
    /// Ordered sequence
    List(Vec<Value>),
    /// Fixed-shape sequence
    Tuple(Vec<Value>),
    /// Deduplicated, order-insensitive collection
    Set(Vec<Value>),
    /// Ordered key/value pairs (equality ignores order)
    Map(Vec<(Value, Value)>),
    /// A nested record instance
    Record(Box<Instance>),
}

impl Value {
    /// Builds a list value.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Builds a tuple value.
    pub fn tuple<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Builds a set value, dropping duplicates while keeping first occurrences.
    pub fn set<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            let item = item.into();
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Value::Set(out)
    }

    /// Builds a map value. Later duplicate keys replace earlier ones.
    pub fn map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let mut out: Vec<(Value, Value)> = Vec::new();
        for (k, v) in pairs {
            let (k, v) = (k.into(), v.into());
            match out.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => out.push((k, v)),
            }
        }
        Value::Map(out)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Elements of a list, tuple or set.
    pub fn as_elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) | Value::Tuple(v) | Value::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Instance> {
        match self {
            Value::Record(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Instance> {
        match self {
            Value::Record(v) => Some(v),
            _ => None,
        }
    }

    /// Looks up a map entry by string key.
    pub fn get_key(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Runtime type name used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "None".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "str".into(),
            Value::Bytes(_) => "bytes".into(),
            Value::DateTime(_) => "datetime".into(),
            Value::Date(_) => "date".into(),
            Value::List(_) => "list".into(),
            Value::Tuple(_) => "tuple".into(),
            Value::Set(_) => "set".into(),
            Value::Map(_) => "dict".into(),
            Value::Record(inst) => inst.template().name().to_string(),
        }
    }

    /// String form used when the value becomes a JSON object key.
    pub fn key_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::DateTime(dt) => dt.to_rfc3339(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            other => other.to_string(),
        }
    }
}

fn same_members(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().all(|item| b.contains(item))
}

fn same_pairs(a: &[(Value, Value)], b: &[(Value, Value)]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(k, v)| b.iter().any(|(bk, bv)| bk == k && bv == v))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => same_members(a, b),
            (Value::Map(a), Value::Map(b)) => same_pairs(a, b),
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(v) => write!(f, "{:?}", v),
            Value::Bytes(v) => write!(f, "b\"{}\"", v.escape_ascii()),
            Value::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Set(items) if items.is_empty() => write!(f, "set()"),
            Value::Set(items) => {
                write!(f, "{{")?;
                write_joined(f, items)?;
                write!(f, "}}")
            }
            Value::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Record(inst) => write!(f, "{}", inst),
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
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v.fixed_offset())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Value::Record(Box::new(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_deduplicates() {
        let set = Value::set([1, 2, 1, 3]);
        assert_eq!(set.as_elements().unwrap().len(), 3);
    }

    #[test]
    fn test_set_equality_ignores_order() {
        assert_eq!(Value::set([1, 2, 3]), Value::set([3, 1, 2]));
        assert_ne!(Value::set([1, 2]), Value::set([1, 2, 3]));
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let a = Value::map([("a", 1), ("b", 2)]);
        let b = Value::map([("b", 2), ("a", 1)]);
        assert_eq!(a, b);
        assert_eq!(a.get_key("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_map_later_key_wins() {
        let m = Value::map([("a", 1), ("a", 5)]);
        assert_eq!(m.as_map().unwrap().len(), 1);
        assert_eq!(m.get_key("a"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_bool_is_not_int() {
        assert_ne!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Value::Null.to_string(), "None");
        assert_eq!(Value::from("x").to_string(), "\"x\"");
        assert_eq!(Value::tuple([1]).to_string(), "(1,)");
        assert_eq!(Value::Set(vec![]).to_string(), "set()");
        assert_eq!(Value::list([1, 2]).to_string(), "[1, 2]");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(4)), Value::Int(4));
    }
}
