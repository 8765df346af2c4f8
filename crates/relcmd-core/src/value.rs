//! Dynamically typed values exchanged with drivers.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::DbType;

/// A single database value: a parameter input, a scalar result, or a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    /// Unsigned 64-bit integer.
    UBigInt(u64),
    Float(f32),
    Double(f64),
    /// Arbitrary-precision decimal kept in its textual form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Timestamp with an explicit UTC offset.
    TimestampTz(DateTime<FixedOffset>),
    Uuid(Uuid),
    Json(serde_json::Value),
    /// Ordered list, also used as the payload of composite parameters.
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widen any integer variant to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::UBigInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The `DbType` a driver would infer for this value, `None` for NULL.
    pub fn db_type(&self) -> Option<DbType> {
        let ty = match self {
            Value::Null => return None,
            Value::Bool(_) => DbType::Boolean,
            Value::TinyInt(_) => DbType::SByte,
            Value::SmallInt(_) => DbType::Int16,
            Value::Int(_) => DbType::Int32,
            Value::BigInt(_) => DbType::Int64,
            Value::UBigInt(_) => DbType::UInt64,
            Value::Float(_) => DbType::Single,
            Value::Double(_) => DbType::Double,
            Value::Decimal(_) => DbType::Decimal,
            Value::Text(_) => DbType::String,
            Value::Bytes(_) => DbType::Binary,
            Value::Date(_) => DbType::Date,
            Value::Timestamp(_) => DbType::DateTime,
            Value::TimestampTz(_) => DbType::DateTimeOffset,
            Value::Uuid(_) => DbType::Guid,
            Value::Json(_) => DbType::Json,
            Value::Array(_) => DbType::Object,
        };
        Some(ty)
    }

    /// Render the value for log output.
    pub fn to_log_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Text(s) | Value::Decimal(s) => format!("'{s}'"),
            Value::Bytes(b) => format!("0x{}", b.iter().map(|x| format!("{x:02X}")).collect::<String>()),
            Value::Array(items) => {
                let inner: Vec<String> = items.iter().map(Value::to_log_string).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Bool(v) => v.to_string(),
            Value::TinyInt(v) => v.to_string(),
            Value::SmallInt(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::BigInt(v) => v.to_string(),
            Value::UBigInt(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Date(v) => format!("'{v}'"),
            Value::Timestamp(v) => format!("'{v}'"),
            Value::TimestampTz(v) => format!("'{}'", v.to_rfc3339()),
            Value::Uuid(v) => format!("'{v}'"),
            Value::Json(v) => format!("'{v}'"),
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
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UBigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
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

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_i64_widens() {
        assert_eq!(Value::TinyInt(-3).as_i64(), Some(-3));
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::UBigInt(u64::MAX).as_i64(), None);
        assert_eq!(Value::Text("7".into()).as_i64(), None);
    }

    #[test]
    fn test_db_type_inference() {
        assert_eq!(Value::Null.db_type(), None);
        assert_eq!(Value::Int(1).db_type(), Some(DbType::Int32));
        assert_eq!(Value::UBigInt(1).db_type(), Some(DbType::UInt64));
        assert_eq!(Value::from("x").db_type(), Some(DbType::String));
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i32> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some(5)), Value::Int(5));
    }

    #[test]
    fn test_log_string() {
        assert_eq!(Value::from("a").to_log_string(), "'a'");
        assert_eq!(Value::Bytes(vec![0xAB, 0x01]).to_log_string(), "0xAB01");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Null]).to_log_string(),
            "[1, NULL]"
        );
    }
}
