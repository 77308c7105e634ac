//! Raw values as returned by the management provider

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A property value in the provider's native representation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    /// Empty or null property
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point number
    Float(f64),
    /// String (WMI also reports 64-bit integers and DMTF dates as strings)
    String(String),
    /// Date/time
    DateTime(DateTime<Utc>),
    /// Array property
    Array(Vec<RawValue>),
}

impl RawValue {
    /// Textual representation of a scalar value
    ///
    /// Returns `None` for values without a meaningful textual scalar form
    /// (null, booleans and arrays).
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Int(v) => Some(v.to_string()),
            RawValue::UInt(v) => Some(v.to_string()),
            RawValue::Float(v) => Some(v.to_string()),
            RawValue::String(s) => Some(s.clone()),
            RawValue::DateTime(dt) => Some(dt.to_rfc3339()),
            RawValue::Null | RawValue::Bool(_) | RawValue::Array(_) => None,
        }
    }

    /// Short name of the value's type, for log output
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "bool",
            RawValue::Int(_) => "int",
            RawValue::UInt(_) => "uint",
            RawValue::Float(_) => "float",
            RawValue::String(_) => "string",
            RawValue::DateTime(_) => "datetime",
            RawValue::Array(_) => "array",
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => write!(f, "null"),
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            other => write!(f, "{}", other.as_text().unwrap_or_default()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::String(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::String(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<u64> for RawValue {
    fn from(value: u64) -> Self {
        RawValue::UInt(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}
