//! Dynamic property values exchanged with devices and the panel
//!
//! Device-native and panel values are loosely typed. `PropertyValue` carries
//! them through transformers without losing non-finite floats, which JSON
//! cannot represent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single device or panel property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Composite values (arrays, objects) such as RGB tuples
    Json(serde_json::Value),
}

impl PropertyValue {
    /// Numeric view of the value, if it is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, PropertyValue::Int(_) | PropertyValue::Float(_))
    }

    /// Build a numeric value, collapsing integral finite floats to `Int`
    pub fn from_number(n: f64) -> Self {
        if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
            PropertyValue::Int(n as i64)
        } else {
            PropertyValue::Float(n)
        }
    }

    /// Key used for lookup tables
    ///
    /// Strings are used verbatim, scalars by their display form and
    /// composites as compact JSON. Numerically equal Int and Float values
    /// share a key.
    pub fn lookup_key(&self) -> String {
        match self {
            PropertyValue::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                format!("{}", *f as i64)
            }
            other => other.to_string(),
        }
    }

    /// Loose truthiness used by boolean conversions
    pub fn truthy(&self) -> bool {
        match self {
            PropertyValue::Null => false,
            PropertyValue::Bool(b) => *b,
            PropertyValue::Int(i) => *i != 0,
            PropertyValue::Float(f) => *f != 0.0 && !f.is_nan(),
            PropertyValue::String(s) => matches!(
                s.to_lowercase().as_str(),
                "true" | "1" | "on" | "yes"
            ),
            PropertyValue::Json(v) => !v.is_null(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Float(n) => write!(f, "{}", n),
            PropertyValue::String(s) => write!(f, "{}", s),
            PropertyValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<&serde_json::Value> for PropertyValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PropertyValue::Null,
            serde_json::Value::Bool(b) => PropertyValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Int(i),
                None => PropertyValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => PropertyValue::String(s.clone()),
            other => PropertyValue::Json(other.clone()),
        }
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        PropertyValue::from(&value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

/// Parse a command-line style literal into a value
///
/// `true`/`false`/`null` and numbers are recognised, JSON arrays and objects
/// are parsed as composites, anything else is a string.
pub fn parse_literal(raw: &str) -> PropertyValue {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return PropertyValue::Bool(true),
        "false" => return PropertyValue::Bool(false),
        "null" => return PropertyValue::Null,
        "NaN" | "nan" => return PropertyValue::Float(f64::NAN),
        "inf" | "Infinity" => return PropertyValue::Float(f64::INFINITY),
        "-inf" | "-Infinity" => return PropertyValue::Float(f64::NEG_INFINITY),
        _ => {}
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return PropertyValue::Int(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return PropertyValue::Float(f);
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return PropertyValue::from(json);
        }
    }
    PropertyValue::String(raw.to_string())
}
