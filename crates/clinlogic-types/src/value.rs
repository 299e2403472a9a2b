//! Typed payload carried by a single finding

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Datatype of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    /// True/false finding
    Boolean,
    /// Coded (concept) answer
    Coded,
    /// Date or date-time answer
    Datetime,
    /// Numeric answer
    Numeric,
    /// Free text answer
    Text,
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::Boolean => write!(f, "boolean"),
            Datatype::Coded => write!(f, "coded"),
            Datatype::Datetime => write!(f, "datetime"),
            Datatype::Numeric => write!(f, "numeric"),
            Datatype::Text => write!(f, "text"),
        }
    }
}

/// A coded concept from the concept dictionary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Concept {
    /// Dictionary identifier
    pub id: i64,
    /// Preferred name
    pub name: String,
}

impl Concept {
    /// Create a new concept
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The value held by one result node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Boolean(bool),
    Coded(Concept),
    Datetime(NaiveDateTime),
    Numeric(Decimal),
    Text(String),
}

impl Value {
    /// Get the datatype of this value
    pub fn datatype(&self) -> Datatype {
        match self {
            Value::Boolean(_) => Datatype::Boolean,
            Value::Coded(_) => Datatype::Coded,
            Value::Datetime(_) => Datatype::Datetime,
            Value::Numeric(_) => Datatype::Numeric,
            Value::Text(_) => Datatype::Text,
        }
    }

    /// Whether the value counts as a present finding.
    ///
    /// `false`, zero and empty text are recorded but not present.
    pub fn is_present(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Coded(_) | Value::Datetime(_) => true,
            Value::Numeric(n) => !n.is_zero(),
            Value::Text(s) => !s.is_empty(),
        }
    }

    /// Try to get as a number
    pub fn as_numeric(&self) -> Option<Decimal> {
        match self {
            Value::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get as a concept
    pub fn as_concept(&self) -> Option<&Concept> {
        match self {
            Value::Coded(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Coded(c) => write!(f, "{c}"),
            Value::Datetime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            Value::Numeric(n) => write!(f, "{}", n.normalize()),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Decimal> for Value {
    fn from(n: Decimal) -> Self {
        Value::Numeric(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Numeric(Decimal::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Numeric(Decimal::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Concept> for Value {
    fn from(c: Concept) -> Self {
        Value::Coded(c)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::Datetime(dt)
    }
}
