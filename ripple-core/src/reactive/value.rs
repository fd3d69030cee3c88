//! Value Payload
//!
//! Nodes in the graph carry a dynamically-kinded [`Value`]. A derived node's
//! function receives its arguments as a slice of values, which lets one graph
//! mix integers, floats, strings and tuples freely.
//!
//! # Kinds
//!
//! The variant of a value is its *kind*. A variable cell refuses to change
//! kind once it holds a value, so a source created with an integer stays an
//! integer for its whole life.
//!
//! # Hashing
//!
//! Change detection is purely `==`-based, so the graph only accepts values
//! that cannot change behind its back. Strings and tuples that share storage
//! are equal without looking at their contents. `List` exists so that callers can
//! compute lists inside derived nodes, but a source refuses to hold one.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A dynamically-kinded value flowing through the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// The "no value" marker.
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// Immutable, shared sequence.
    Tuple(Arc<[Value]>),
    /// Mutable container; never accepted by a source node.
    List(Vec<Value>),
}

impl Value {
    /// Build a tuple from any iterator of values.
    pub fn tuple<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Build a list from any iterator of values.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// The name of this value's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
        }
    }

    /// Whether the value is immutable all the way down.
    pub fn is_hashable(&self) -> bool {
        match self {
            Value::List(_) => false,
            Value::Tuple(items) => items.iter().all(Value::is_hashable),
            _ => true,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) => Some(items),
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            // shared storage is one value, even if it holds a NaN
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Tuple(a), Value::Tuple(b)) => Arc::ptr_eq(a, b) || a[..] == b[..],
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Nil => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            // +0.0 == -0.0, so they must hash alike
            Value::Float(f) => {
                let f = if *f == 0.0 { 0.0 } else { *f };
                f.to_bits().hash(state);
            }
            Value::Str(s) => s.hash(state),
            Value::Tuple(items) => items.hash(state),
            Value::List(items) => items.hash(state),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_seq(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
        }
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

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(Value::from(3).kind(), "int");
        assert_eq!(Value::from(3.0).kind(), "float");
        assert_eq!(Value::from("x").kind(), "str");
        assert_eq!(Value::tuple([1, 2]).kind(), "tuple");
        assert_eq!(Value::Nil.kind(), "nil");
    }

    #[test]
    fn lists_are_not_hashable() {
        assert!(Value::tuple([1, 2]).is_hashable());
        assert!(!Value::list([1, 2]).is_hashable());
        assert!(!Value::tuple([Value::list([1])]).is_hashable());
    }

    #[test]
    fn nan_is_never_equal_to_itself() {
        let nan = Value::Float(f64::NAN);
        assert_ne!(nan, nan.clone());
    }

    #[test]
    fn shared_tuples_are_equal_even_with_nan() {
        let tuple = Value::tuple([Value::Float(f64::NAN), Value::from("x")]);
        assert_eq!(tuple, tuple.clone());

        let rebuilt = Value::tuple([Value::Float(f64::NAN), Value::from("x")]);
        assert_ne!(tuple, rebuilt);
        assert_eq!(Value::tuple([1, 2]), Value::tuple([1, 2]));
    }

    #[test]
    fn kinds_never_compare_equal() {
        assert_ne!(Value::from(1), Value::from(1.0));
        assert_ne!(Value::Nil, Value::from(false));
    }

    #[test]
    fn signed_zeros_hash_alike() {
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(hash_of(&Value::Float(0.0)), hash_of(&Value::Float(-0.0)));
    }

    #[test]
    fn display_matches_literal_syntax() {
        assert_eq!(Value::from(5.0).to_string(), "5.0");
        assert_eq!(Value::from(-1).to_string(), "-1");
        assert_eq!(Value::from("a").to_string(), "\"a\"");
        assert_eq!(Value::tuple([1]).to_string(), "(1,)");
        assert_eq!(Value::tuple([1, 2]).to_string(), "(1, 2)");
        assert_eq!(Value::list([1, 2]).to_string(), "[1, 2]");
    }

    #[test]
    fn serializes_with_serde() {
        let value = Value::tuple([Value::from(1), Value::from("a")]);
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
