// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Field values and declared field types.
//!
//! Comparisons are type-aware: two values compare numerically when both
//! coerce to numbers (integers, floats, numeric strings), otherwise
//! lexically by their text form. Blobs only compare with blobs.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// A typed value stored in a record field or bound as a query argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// A signed 64-bit integer.
    Integer(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// A boolean flag.
    Boolean(bool),
    /// Opaque bytes.
    Blob(Vec<u8>),
    /// A list of values. Only meaningful as an `IN` argument; no field type
    /// accepts it.
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// The declared type this value satisfies exactly, if any.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            FieldValue::Integer(_) => Some(FieldType::Integer),
            FieldValue::Float(_) => Some(FieldType::Float),
            FieldValue::String(_) => Some(FieldType::String),
            FieldValue::Boolean(_) => Some(FieldType::Boolean),
            FieldValue::Blob(_) => Some(FieldType::Blob),
            FieldValue::List(_) => None,
        }
    }

    /// Numeric view of the value, if it coerces to a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::String(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
            _ => None,
        }
    }

    /// Text view of the value used for lexical comparison.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::String(s) => Some(Cow::Borrowed(s)),
            FieldValue::Integer(i) => Some(Cow::Owned(i.to_string())),
            FieldValue::Float(f) => Some(Cow::Owned(f.to_string())),
            FieldValue::Boolean(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            FieldValue::Blob(_) | FieldValue::List(_) => None,
        }
    }

    /// Type-aware comparison used by predicates.
    ///
    /// Returns `None` when the two values have no meaningful ordering (for
    /// example a blob against a string, or anything against a list).
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Blob(a), FieldValue::Blob(b)) => Some(a.cmp(b)),
            (FieldValue::List(_), _) | (_, FieldValue::List(_)) => None,
            _ => {
                if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
                    return a.partial_cmp(&b);
                }
                match (self.as_text(), other.as_text()) {
                    (Some(a), Some(b)) => Some(a.as_ref().cmp(b.as_ref())),
                    _ => None,
                }
            }
        }
    }

    /// A total order for sorting result sets.
    ///
    /// Numeric values come first (ordered numerically, ties broken by text),
    /// then other text, then blobs, then lists.
    pub fn sort_cmp(&self, other: &FieldValue) -> Ordering {
        fn rank(value: &FieldValue) -> u8 {
            match value {
                FieldValue::List(_) => 3,
                FieldValue::Blob(_) => 2,
                v if v.as_number().is_some() => 0,
                _ => 1,
            }
        }

        rank(self).cmp(&rank(other)).then_with(|| match (self, other) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::Blob(a), FieldValue::Blob(b)) => a.cmp(b),
            (FieldValue::List(a), FieldValue::List(b)) => a.len().cmp(&b.len()),
            _ => {
                let numeric = match (self.as_number(), other.as_number()) {
                    (Some(a), Some(b)) => a.total_cmp(&b),
                    _ => Ordering::Equal,
                };
                numeric.then_with(|| self.as_text().cmp(&other.as_text()))
            }
        })
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "\"{}\"", s),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Blob(b) => write!(f, "blob[{}]", b.len()),
            FieldValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Blob(v)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(v: Vec<FieldValue>) -> Self {
        FieldValue::List(v)
    }
}

/// The declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Boolean,
    Blob,
}

impl FieldType {
    /// Whether a value may be written into a field of this type.
    ///
    /// Integers are accepted by float fields; nothing else is widened.
    pub fn accepts(self, value: &FieldValue) -> bool {
        match (self, value) {
            (FieldType::Float, FieldValue::Integer(_)) => true,
            _ => value.field_type() == Some(self),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::String => "STRING",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Blob => "BLOB",
        };
        f.write_str(name)
    }
}

impl FromStr for FieldType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "LONG" => Ok(FieldType::Integer),
            "FLOAT" | "DOUBLE" | "DECIMAL" => Ok(FieldType::Float),
            "STRING" | "TEXT" | "VARCHAR" => Ok(FieldType::String),
            "BOOLEAN" | "BOOL" => Ok(FieldType::Boolean),
            "BLOB" | "BINARY" => Ok(FieldType::Blob),
            other => Err(QueryError::UnknownType(other.to_string())),
        }
    }
}
