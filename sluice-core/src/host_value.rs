use crate::Value;
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;
use time::{OffsetDateTime, PrimitiveDateTime};

/// A value in the shape the host runtime understands.
///
/// `Integer` and `Number` are both the host "number" kind: integers survive
/// without going through a float. Every temporal value is carried as epoch
/// milliseconds in `Date`.
#[derive(Default, Debug, Clone, PartialEq)]
pub enum HostValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Date(f64),
    Buffer(Vec<u8>),
    Array(Vec<HostValue>),
    Object(BTreeMap<String, HostValue>),
}

impl HostValue {
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, HostValue::Integer(..) | HostValue::Number(..))
    }

    /// Short name of the host shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Boolean(..) => "boolean",
            HostValue::Integer(..) | HostValue::Number(..) => "number",
            HostValue::String(..) => "string",
            HostValue::Date(..) => "date",
            HostValue::Buffer(..) => "buffer",
            HostValue::Array(..) => "array",
            HostValue::Object(..) => "object",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Integer(v) => Some(*v as f64),
            HostValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&HostValue> {
        match self {
            HostValue::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Build an object from key/value pairs.
    pub fn object<K: Into<String>, I: IntoIterator<Item = (K, HostValue)>>(entries: I) -> Self {
        HostValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn from_offset_date_time(value: OffsetDateTime) -> Self {
        HostValue::Date((value.unix_timestamp_nanos() / 1_000_000) as f64)
    }

    /// The UTC instant of an epoch-millisecond value, `None` when out of range or not finite.
    pub fn epoch_millis_to_date_time(millis: f64) -> Option<OffsetDateTime> {
        if !millis.is_finite() {
            return None;
        }
        let nanos = (millis.round() as i128).checked_mul(1_000_000)?;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
    }
}

fn primitive_to_millis(value: PrimitiveDateTime) -> f64 {
    (value.assume_utc().unix_timestamp_nanos() / 1_000_000) as f64
}

impl From<Value> for HostValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Boolean(Some(v)) => HostValue::Boolean(v),
            Value::Int8(Some(v)) => HostValue::Integer(v as i64),
            Value::Int16(Some(v)) => HostValue::Integer(v as i64),
            Value::Int32(Some(v)) => HostValue::Integer(v as i64),
            Value::Int64(Some(v)) => HostValue::Integer(v),
            Value::UInt32(Some(v)) => HostValue::Integer(v as i64),
            Value::Float64(Some(v)) => HostValue::Number(v),
            Value::Decimal(Some(v), ..) => match v.to_f64() {
                Some(v) => HostValue::Number(v),
                None => HostValue::String(v.to_string()),
            },
            Value::Varchar(Some(v)) => HostValue::String(v),
            Value::Blob(Some(v)) => HostValue::Buffer(v.into()),
            Value::Date(Some(v)) => HostValue::Date(primitive_to_millis(v.midnight())),
            Value::Time(Some(v)) => {
                let (h, m, sec, milli) = v.as_hms_milli();
                HostValue::Date(
                    ((h as u64 * 60 + m as u64) * 60 + sec as u64) as f64 * 1000.0 + milli as f64,
                )
            }
            Value::Timestamp(Some(v)) => HostValue::Date(primitive_to_millis(v)),
            Value::TimestampWithTimezone(Some(v)) => HostValue::from_offset_date_time(v),
            Value::Uuid(Some(v)) => HostValue::String(v.hyphenated().to_string().to_uppercase()),
            _ => HostValue::Null,
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Boolean(value)
    }
}

macro_rules! impl_host_integer {
    ($($source:ty),+) => {
        $(impl From<$source> for HostValue {
            fn from(value: $source) -> Self {
                HostValue::Integer(value as i64)
            }
        })+
    };
}
impl_host_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.into())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(value: Vec<u8>) -> Self {
        HostValue::Buffer(value)
    }
}

impl From<OffsetDateTime> for HostValue {
    fn from(value: OffsetDateTime) -> Self {
        HostValue::from_offset_date_time(value)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(value: Vec<HostValue>) -> Self {
        HostValue::Array(value)
    }
}
