use sluice_core::{
    SqlType,
    native::{
        CDataType, Len, SqlDate, SqlGuid, SqlNumeric, SqlTime2, SqlTimestamp, SqlTimestampOffset,
    },
};
use std::{ffi::c_void, mem};

/// Backing buffer of a bound parameter.
///
/// Exactly one typed vector is active. Fixed width variants hold one element per row,
/// the text and binary variants hold `rows * width` elements where `width` includes the
/// room for the terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum DatumStorage {
    Bit(Vec<u8>),
    Integer(Vec<i32>),
    UInteger(Vec<u32>),
    BigInt(Vec<i64>),
    Double(Vec<f64>),
    Numeric(Vec<SqlNumeric>),
    Char { data: Vec<u8>, width: usize },
    WChar { data: Vec<u16>, width: usize },
    Binary { data: Vec<u8>, width: usize },
    Date(Vec<SqlDate>),
    Time(Vec<SqlTime2>),
    Timestamp(Vec<SqlTimestamp>),
    TimestampOffset(Vec<SqlTimestampOffset>),
    Guid(Vec<SqlGuid>),
    /// Type name of a table-valued parameter.
    TableName(Vec<u16>),
}

impl DatumStorage {
    pub fn c_type(&self) -> i16 {
        match self {
            DatumStorage::Bit(..) => CDataType::BIT,
            DatumStorage::Integer(..) => CDataType::SLONG,
            DatumStorage::UInteger(..) => CDataType::ULONG,
            DatumStorage::BigInt(..) => CDataType::SBIGINT,
            DatumStorage::Double(..) => CDataType::DOUBLE,
            DatumStorage::Numeric(..) => CDataType::NUMERIC,
            DatumStorage::Char { .. } => CDataType::CHAR,
            DatumStorage::WChar { .. } => CDataType::WCHAR,
            DatumStorage::Binary { .. } => CDataType::BINARY,
            DatumStorage::Date(..) => CDataType::TYPE_DATE,
            DatumStorage::Time(..) => CDataType::SS_TIME2,
            DatumStorage::Timestamp(..) => CDataType::TYPE_TIMESTAMP,
            DatumStorage::TimestampOffset(..) => CDataType::SS_TIMESTAMPOFFSET,
            DatumStorage::Guid(..) => CDataType::GUID,
            DatumStorage::TableName(..) => CDataType::DEFAULT,
        }
    }

    /// Number of rows held.
    pub fn rows(&self) -> usize {
        match self {
            DatumStorage::Bit(v) => v.len(),
            DatumStorage::Integer(v) => v.len(),
            DatumStorage::UInteger(v) => v.len(),
            DatumStorage::BigInt(v) => v.len(),
            DatumStorage::Double(v) => v.len(),
            DatumStorage::Numeric(v) => v.len(),
            DatumStorage::Char { data, width } | DatumStorage::Binary { data, width } => {
                data.len() / (*width).max(1)
            }
            DatumStorage::WChar { data, width } => data.len() / (*width).max(1),
            DatumStorage::Date(v) => v.len(),
            DatumStorage::Time(v) => v.len(),
            DatumStorage::Timestamp(v) => v.len(),
            DatumStorage::TimestampOffset(v) => v.len(),
            DatumStorage::Guid(v) => v.len(),
            DatumStorage::TableName(..) => 1,
        }
    }

    /// Size in bytes of one row element, the buffer length passed to the bind call.
    pub fn element_size(&self) -> usize {
        match self {
            DatumStorage::Bit(..) => mem::size_of::<u8>(),
            DatumStorage::Integer(..) => mem::size_of::<i32>(),
            DatumStorage::UInteger(..) => mem::size_of::<u32>(),
            DatumStorage::BigInt(..) => mem::size_of::<i64>(),
            DatumStorage::Double(..) => mem::size_of::<f64>(),
            DatumStorage::Numeric(..) => mem::size_of::<SqlNumeric>(),
            DatumStorage::Char { width, .. } | DatumStorage::Binary { width, .. } => *width,
            DatumStorage::WChar { width, .. } => *width * mem::size_of::<u16>(),
            DatumStorage::Date(..) => mem::size_of::<SqlDate>(),
            DatumStorage::Time(..) => mem::size_of::<SqlTime2>(),
            DatumStorage::Timestamp(..) => mem::size_of::<SqlTimestamp>(),
            DatumStorage::TimestampOffset(..) => mem::size_of::<SqlTimestampOffset>(),
            DatumStorage::Guid(..) => mem::size_of::<SqlGuid>(),
            DatumStorage::TableName(v) => v.len() * mem::size_of::<u16>(),
        }
    }

    pub fn buffer_length(&self) -> Len {
        self.element_size() as Len
    }

    /// Pointer to the first element, stable as long as the storage is not resized.
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            DatumStorage::Bit(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::Integer(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::UInteger(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::BigInt(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::Double(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::Numeric(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::Char { data, .. } | DatumStorage::Binary { data, .. } => {
                data.as_mut_ptr() as *mut c_void
            }
            DatumStorage::WChar { data, .. } => data.as_mut_ptr() as *mut c_void,
            DatumStorage::Date(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::Time(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::Timestamp(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::TimestampOffset(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::Guid(v) => v.as_mut_ptr() as *mut c_void,
            DatumStorage::TableName(v) => v.as_mut_ptr() as *mut c_void,
        }
    }

    /// Whether the active buffer can carry a value of the declared SQL type.
    pub fn accepts(&self, sql_type: SqlType) -> bool {
        let numeric = sql_type.is_integral() || sql_type.is_floating() || sql_type.is_exact_numeric();
        match self {
            DatumStorage::Bit(..) => sql_type == SqlType::Bit,
            DatumStorage::Integer(..)
            | DatumStorage::UInteger(..)
            | DatumStorage::BigInt(..)
            | DatumStorage::Double(..) => numeric,
            DatumStorage::Numeric(..) => sql_type.is_exact_numeric() || sql_type.is_floating(),
            DatumStorage::Char { .. } | DatumStorage::WChar { .. } => {
                sql_type.is_string() || sql_type.is_ambiguous() || sql_type == SqlType::Guid
            }
            DatumStorage::Binary { .. } => sql_type.is_binary() || sql_type.is_ambiguous(),
            DatumStorage::Date(..) => sql_type == SqlType::Date,
            DatumStorage::Time(..) => sql_type == SqlType::Time,
            DatumStorage::Timestamp(..) => {
                matches!(sql_type, SqlType::DateTime | SqlType::Timestamp)
            }
            DatumStorage::TimestampOffset(..) => matches!(
                sql_type,
                SqlType::DateTimeOffset | SqlType::DateTime | SqlType::Timestamp
            ),
            DatumStorage::Guid(..) => sql_type == SqlType::Guid,
            DatumStorage::TableName(..) => sql_type == SqlType::Table,
        }
    }

    /// Repeat the single row `rows` times.
    pub fn broadcast(&mut self, rows: usize) {
        fn repeat<T: Clone>(v: &mut Vec<T>, rows: usize) {
            if let Some(first) = v.first().cloned() {
                v.resize(rows, first);
            }
        }
        fn repeat_chunk<T: Copy>(v: &mut Vec<T>, width: usize, rows: usize) {
            let first = v[..width.min(v.len())].to_vec();
            *v = first.repeat(rows);
        }
        match self {
            DatumStorage::Bit(v) => repeat(v, rows),
            DatumStorage::Integer(v) => repeat(v, rows),
            DatumStorage::UInteger(v) => repeat(v, rows),
            DatumStorage::BigInt(v) => repeat(v, rows),
            DatumStorage::Double(v) => repeat(v, rows),
            DatumStorage::Numeric(v) => repeat(v, rows),
            DatumStorage::Char { data, width } | DatumStorage::Binary { data, width } => {
                repeat_chunk(data, *width, rows)
            }
            DatumStorage::WChar { data, width } => repeat_chunk(data, *width, rows),
            DatumStorage::Date(v) => repeat(v, rows),
            DatumStorage::Time(v) => repeat(v, rows),
            DatumStorage::Timestamp(v) => repeat(v, rows),
            DatumStorage::TimestampOffset(v) => repeat(v, rows),
            DatumStorage::Guid(v) => repeat(v, rows),
            DatumStorage::TableName(..) => {}
        }
    }

    /// Fixed width text buffer with `rows` elements of `width` units each.
    pub fn wide(rows: usize, width: usize) -> Self {
        DatumStorage::WChar {
            data: vec![0; rows * width],
            width,
        }
    }

    pub fn narrow(rows: usize, width: usize) -> Self {
        DatumStorage::Char {
            data: vec![0; rows * width],
            width,
        }
    }

    pub fn binary(rows: usize, width: usize) -> Self {
        DatumStorage::Binary {
            data: vec![0; rows * width],
            width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_shapes() {
        let storage = DatumStorage::wide(3, 5);
        assert_eq!(storage.rows(), 3);
        assert_eq!(storage.element_size(), 10);
        assert_eq!(storage.c_type(), CDataType::WCHAR);
        let storage = DatumStorage::Integer(vec![1, 2]);
        assert_eq!(storage.rows(), 2);
        assert_eq!(storage.buffer_length(), 4);
        assert_eq!(DatumStorage::TableName(vec![65, 66]).element_size(), 4);
    }

    #[test]
    fn storage_accepts() {
        assert!(DatumStorage::Integer(vec![]).accepts(SqlType::BigInt));
        assert!(DatumStorage::Double(vec![]).accepts(SqlType::Decimal));
        assert!(!DatumStorage::Integer(vec![]).accepts(SqlType::WVarChar));
        assert!(DatumStorage::wide(1, 1).accepts(SqlType::VarChar));
        assert!(!DatumStorage::wide(1, 1).accepts(SqlType::Date));
        assert!(DatumStorage::TimestampOffset(vec![]).accepts(SqlType::DateTimeOffset));
        assert!(!DatumStorage::Date(vec![]).accepts(SqlType::Timestamp));
        assert!(!DatumStorage::binary(1, 1).accepts(SqlType::Integer));
        assert!(DatumStorage::TableName(vec![]).accepts(SqlType::Table));
    }

    #[test]
    fn storage_broadcast() {
        let mut storage = DatumStorage::BigInt(vec![7]);
        storage.broadcast(3);
        assert_eq!(storage, DatumStorage::BigInt(vec![7, 7, 7]));
        let mut storage = DatumStorage::Char {
            data: vec![b'a', b'b', 0],
            width: 3,
        };
        storage.broadcast(2);
        assert_eq!(storage.rows(), 2);
        assert_eq!(
            storage,
            DatumStorage::Char {
                data: b"ab\0ab\0".to_vec(),
                width: 3
            }
        );
    }
}
