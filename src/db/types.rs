//! Row value types for dman.
//!
//! Database values are dynamically typed; [`Value`] is the closed set of
//! shapes a column value can take once it leaves the driver.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Serialize, Serializer};

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// Represents a single value from a database query.
///
/// Serializes to the matching native JSON value: numbers, strings, booleans,
/// `null`, RFC 3339 timestamps, base64 for binary data and nested JSON as-is.
/// Non-finite floats use PostgreSQL's spelling (`"NaN"`, `"Infinity"`,
/// `"-Infinity"`) so they stay distinct from `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    Float(f64),

    /// Text, and the text rendering of types without a dedicated variant
    /// (numeric, arrays, composites, ranges, ...).
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// `timestamp` without time zone.
    Timestamp(NaiveDateTime),

    /// `timestamptz`, normalized to UTC.
    TimestampTz(DateTime<Utc>),

    Date(NaiveDate),

    Time(NaiveTime),

    /// `json` and `jsonb`.
    Json(serde_json::Value),
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_nan() => serializer.serialize_str("NaN"),
            Value::Float(f) if *f == f64::INFINITY => serializer.serialize_str("Infinity"),
            Value::Float(f) if *f == f64::NEG_INFINITY => serializer.serialize_str("-Infinity"),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&BASE64_STANDARD.encode(b)),
            Value::Timestamp(ts) => ts.serialize(serializer),
            Value::TimestampTz(ts) => ts.serialize(serializer),
            Value::Date(d) => d.serialize(serializer),
            Value::Time(t) => t.serialize(serializer),
            Value::Json(v) => v.serialize(serializer),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::TimestampTz(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
