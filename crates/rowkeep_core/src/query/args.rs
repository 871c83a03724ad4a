//! Query arguments: scalar values, lists and placeholder bindings.

use rusqlite::types::Value;
use std::collections::HashMap;

/// One bound argument. Lists are only accepted by `In`/`NotIn` conditions
/// and by explicit placeholders, where they expand to `(?a, ?b, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    List(Vec<Value>),
}

impl Arg {
    pub fn null() -> Self {
        Self::Value(Value::Null)
    }

    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Self::List(values.into_iter().collect())
    }

    /// Values bound for this argument, in order.
    pub(crate) fn values(&self) -> &[Value] {
        match self {
            Self::Value(value) => std::slice::from_ref(value),
            Self::List(values) => values,
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Value(Value::Integer(value))
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::Value(Value::Integer(i64::from(value)))
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Self::Value(Value::Integer(i64::from(value)))
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Value(Value::Integer(i64::from(value)))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Value(Value::Real(value))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Value(Value::Text(value))
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Value(Value::Text(value.to_string()))
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Self::Value(Value::Text(value.clone()))
    }
}

impl From<Option<i64>> for Arg {
    fn from(value: Option<i64>) -> Self {
        value.map_or_else(Self::null, Self::from)
    }
}

impl From<Option<String>> for Arg {
    fn from(value: Option<String>) -> Self {
        value.map_or_else(Self::null, Self::from)
    }
}

impl From<Vec<i64>> for Arg {
    fn from(values: Vec<i64>) -> Self {
        Self::list(values.into_iter().map(Value::Integer))
    }
}

impl From<Vec<String>> for Arg {
    fn from(values: Vec<String>) -> Self {
        Self::list(values.into_iter().map(Value::Text))
    }
}

impl From<Vec<&str>> for Arg {
    fn from(values: Vec<&str>) -> Self {
        Self::list(values.into_iter().map(|value| Value::Text(value.to_string())))
    }
}

impl From<&[&str]> for Arg {
    fn from(values: &[&str]) -> Self {
        Self::list(values.iter().map(|value| Value::Text((*value).to_string())))
    }
}

/// Arguments for an explicit query: named (`:name`) or positional (`?N`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    named: HashMap<String, Arg>,
    positional: Vec<Arg>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `:name`. Rebinding a name replaces the earlier value.
    pub fn set(mut self, name: impl Into<String>, arg: impl Into<Arg>) -> Self {
        self.named.insert(name.into(), arg.into());
        self
    }

    /// Binds the next positional placeholder (`?1`, then `?2`, ...).
    pub fn push(mut self, arg: impl Into<Arg>) -> Self {
        self.positional.push(arg.into());
        self
    }

    pub fn named(&self, name: &str) -> Option<&Arg> {
        self.named.get(name)
    }

    /// One-based lookup, matching `?N` numbering.
    pub fn positional(&self, index: usize) -> Option<&Arg> {
        index.checked_sub(1).and_then(|slot| self.positional.get(slot))
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }
}
