//! Published value types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type a topic publishes, resolved once at startup from its category and channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Long,
    Double,
    String,
    Integer,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Long => "LONG",
            ValueType::Double => "DOUBLE",
            ValueType::String => "STRING",
            ValueType::Integer => "INTEGER",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single measured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Long(i64),
    Double(f64),
    String(String),
    Integer(i32),
}

impl MetricValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            MetricValue::Long(_) => ValueType::Long,
            MetricValue::Double(_) => ValueType::Double,
            MetricValue::String(_) => ValueType::String,
            MetricValue::Integer(_) => ValueType::Integer,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Long(v) => Some(*v as f64),
            MetricValue::Double(v) => Some(*v),
            MetricValue::Integer(v) => Some(f64::from(*v)),
            MetricValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Long(v) => write!(f, "{}", v),
            MetricValue::Double(v) => write!(f, "{}", v),
            MetricValue::String(v) => f.write_str(v),
            MetricValue::Integer(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Long(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Double(value)
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> Self {
        MetricValue::Integer(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::String(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::String(value.to_string())
    }
}
