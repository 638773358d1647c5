//! Dynamically-typed values crossing the host/runtime boundary
//!
//! `Value` is a closed union over exactly the five cases the scripting
//! runtime's data model has: nil, boolean, number, string and table.
//! Tables are value types: they are compared and copied by content, and
//! they can be arbitrarily nested. A total order over heterogeneous
//! values makes a `Value` usable as a table key in turn.

mod json;

pub use json::{from_json, to_json};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValueError;

/// An ordered mapping from `Value` to `Value`, the content of a table.
pub type TableMap = BTreeMap<Value, Value>;

/// An ordered sequence of values, used for multi-value arguments and
/// returns. The first return value is at index 0, the second at index 1
/// and so on.
pub type ValueList = Vec<Value>;

/// The kind of a `Value`. The declaration order is the type rank used
/// by the total order: `nil < boolean < number < string < table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueKind {
    Nil,
    Boolean,
    Number,
    String,
    Table,
}

impl ValueKind {
    /// The runtime's canonical name for this kind
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Table => "table",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single datum in the runtime's data model
#[derive(Debug, Clone)]
pub enum Value {
    /// The absent value
    Nil,

    /// Boolean value
    Boolean(bool),

    /// Double-precision floating-point number
    Number(f64),

    /// String (compared byte-wise)
    String(String),

    /// Table: an ordered map with unique, heterogeneous keys
    Table(TableMap),
}

impl Value {
    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Create an empty table value
    pub fn table() -> Self {
        Value::Table(TableMap::new())
    }

    /// Which of the five cases is active
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Table(_) => ValueKind::Table,
        }
    }

    /// The runtime's canonical name for the active case
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Value::Table(_))
    }

    /// The boolean content, or `TypeMismatch` if another case is active
    pub fn as_boolean(&self) -> Result<bool, ValueError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(mismatch("boolean", other)),
        }
    }

    /// The numeric content, or `TypeMismatch` if another case is active
    pub fn as_number(&self) -> Result<f64, ValueError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(mismatch("number", other)),
        }
    }

    /// The string content, or `TypeMismatch` if another case is active
    pub fn as_string(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", other)),
        }
    }

    /// The table content, or `TypeMismatch` if another case is active
    pub fn as_table(&self) -> Result<&TableMap, ValueError> {
        match self {
            Value::Table(t) => Ok(t),
            other => Err(mismatch("table", other)),
        }
    }

    /// Mutable table content, or `TypeMismatch` if another case is active
    pub fn as_table_mut(&mut self) -> Result<&mut TableMap, ValueError> {
        match self {
            Value::Table(t) => Ok(t),
            other => Err(mismatch("table", other)),
        }
    }

    /// Read-mode indexing. Fails with `TypeMismatch` if the receiver is
    /// not a table and with `NoSuchKey` if the key is absent.
    pub fn get(&self, key: &Value) -> Result<&Value, ValueError> {
        let table = self.as_table()?;
        table.get(key).ok_or_else(|| ValueError::NoSuchKey {
            key: Box::new(key.clone()),
        })
    }

    /// Write-mode indexing. Fails with `TypeMismatch` if the receiver
    /// is not a table; an absent key is inserted with a `Nil` value, so
    /// this never fails on a table.
    pub fn entry(&mut self, key: Value) -> Result<&mut Value, ValueError> {
        let table = self.as_table_mut()?;
        Ok(table.entry(key).or_insert(Value::Nil))
    }

    /// Store `value` under `key`, via the write path
    pub fn set(
        &mut self,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<(), ValueError> {
        *self.entry(key.into())? = value.into();
        Ok(())
    }
}

fn mismatch(expected: &'static str, found: &Value) -> ValueError {
    ValueError::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

// The total order: first by type rank, then within the same type by
// boolean ordinal, numeric value, byte-wise string order, or for tables
// by element count and then the (key, value) pairs in lock-step.
// `total_cmp` keeps the order strict-weak when NaN shows up.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Table(a), Value::Table(b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.iter().cmp(b.iter())),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality follows from the same rule set: a == b iff neither a < b
// nor a > b.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<TableMap> for Value {
    fn from(t: TableMap) -> Self {
        Value::Table(t)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Table(t) => {
                f.write_str("{")?;
                for (i, (k, v)) in t.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "[{k}] = {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}
