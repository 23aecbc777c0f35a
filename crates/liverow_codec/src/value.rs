//! Dynamic primitive value type.

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

/// The type tag for a column or cache value.
///
/// Every column descriptor declares a `Kind`; decoding a text-encoded value
/// requires it, since the text form alone is ambiguous (`"1"` could be an
/// integer, a float, or text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Boolean.
    Bool,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Bytes,
    /// UUID.
    Uuid,
    /// UTC timestamp with microsecond precision.
    Timestamp,
}

/// A dynamic primitive value.
///
/// This is the single value type that flows between the field accessors, the
/// SQL builder, the stores, and the cache tier. `Null` is a distinct variant
/// rather than an `Option` wrapper so that a column's value is always exactly
/// one `Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL / absent cache key.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 16-bit signed integer.
    Int16(i16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit IEEE float.
    Float32(f32),
    /// 64-bit IEEE float.
    Float64(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UUID.
    Uuid(Uuid),
    /// UTC timestamp, truncated to microsecond precision.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Creates a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Creates a timestamp value truncated to microsecond precision.
    ///
    /// The store and the canonical text encoding both carry microseconds, so
    /// sub-microsecond precision would not survive a round trip.
    pub fn timestamp(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts.trunc_subsecs(6))
    }

    /// Returns the kind of this value, or `None` for `Null`.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(Kind::Bool),
            Value::Int16(_) => Some(Kind::Int16),
            Value::Int32(_) => Some(Kind::Int32),
            Value::Int64(_) => Some(Kind::Int64),
            Value::Float32(_) => Some(Kind::Float32),
            Value::Float64(_) => Some(Kind::Float64),
            Value::Text(_) => Some(Kind::Text),
            Value::Bytes(_) => Some(Kind::Bytes),
            Value::Uuid(_) => Some(Kind::Uuid),
            Value::Timestamp(_) => Some(Kind::Timestamp),
        }
    }

    /// Returns true if this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value widened to `i64`, if this is any integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text value, if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the UUID value, if this is a `Uuid`.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Returns the timestamp value, if this is a `Timestamp`.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::timestamp(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn kind_of_values() {
        assert_eq!(Value::Null.kind(), None);
        assert_eq!(Value::Bool(true).kind(), Some(Kind::Bool));
        assert_eq!(Value::Int64(7).kind(), Some(Kind::Int64));
        assert_eq!(Value::text("x").kind(), Some(Kind::Text));
    }

    #[test]
    fn timestamp_truncated_to_micros() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1_234_567);
        let value = Value::timestamp(ts);
        let got = value.as_timestamp().unwrap();
        assert_eq!(got.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn option_conversion() {
        let none: Option<i32> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some(5i32)), Value::Int32(5));
    }

    #[test]
    fn integer_widening() {
        assert_eq!(Value::Int16(3).as_i64(), Some(3));
        assert_eq!(Value::Int32(-4).as_i64(), Some(-4));
        assert_eq!(Value::Int64(i64::MAX).as_i64(), Some(i64::MAX));
        assert_eq!(Value::text("3").as_i64(), None);
    }
}
