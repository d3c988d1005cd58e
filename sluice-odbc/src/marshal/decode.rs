use crate::{
    check,
    marshal::{decode_utf8, decode_utf16, parse_decimal, temporal},
};
use sluice_core::{
    ColumnDefinition, Error, Failure, Result, Row, SqlType, Value,
    native::{
        CDataType, Handle, HandleKind, Len, NO_TOTAL, NULL_DATA, NativeApi, SqlDate, SqlGuid,
        SqlReturn, SqlTime2, SqlTimestamp, SqlTimestampOffset,
    },
};
use std::{ffi::c_void, mem};
use uuid::Uuid;

/// Reads the columns of the current row of a statement.
pub struct ColumnReader<'a> {
    pub api: &'a dyn NativeApi,
    pub stmt: Handle,
    /// Bytes requested per call when reading long values.
    pub chunk_size: usize,
}

impl<'a> ColumnReader<'a> {
    pub fn new(api: &'a dyn NativeApi, stmt: Handle, chunk_size: usize) -> Self {
        Self {
            api,
            stmt,
            chunk_size: chunk_size.max(16),
        }
    }

    /// Decode every column of the current row.
    pub fn read_row(&self, columns: &[ColumnDefinition]) -> Result<Row> {
        columns
            .iter()
            .enumerate()
            .map(|(i, column)| self.read_column(i + 1, column))
            .collect()
    }

    /// Decode the (1 based) `column` according to its declared type.
    pub fn read_column(&self, column: usize, definition: &ColumnDefinition) -> Result<Value> {
        let number = u16::try_from(column)
            .map_err(|_| Failure::decode(column, "column number out of range"))?;
        let sql_type = definition.sql_type;
        Ok(match sql_type {
            SqlType::Bit => {
                Value::Boolean(self.fixed::<u8>(number, CDataType::BIT)?.map(|v| v != 0))
            }
            SqlType::TinyInt | SqlType::SmallInt => {
                Value::Int16(self.fixed::<i16>(number, CDataType::SSHORT)?)
            }
            SqlType::Integer => Value::Int32(self.fixed::<i32>(number, CDataType::SLONG)?),
            SqlType::BigInt => Value::Int64(self.fixed::<i64>(number, CDataType::SBIGINT)?),
            SqlType::Real | SqlType::Float | SqlType::Double => {
                Value::Float64(self.fixed::<f64>(number, CDataType::DOUBLE)?)
            }
            SqlType::Numeric | SqlType::Decimal => {
                let precision = definition.size.min(38) as u8;
                let scale = definition.decimal_digits.max(0) as u8;
                match self.narrow(number)? {
                    None => Value::Decimal(None, precision, scale),
                    Some(text) => Value::Decimal(
                        Some(parse_decimal(&text).ok_or_else(|| {
                            Failure::decode(column, format!("`{text}` is not a decimal"))
                        })?),
                        precision,
                        scale,
                    ),
                }
            }
            v if v.is_narrow_string() => Value::Varchar(self.narrow(number)?),
            v if v.is_wide_string() => Value::Varchar(self.wide(number)?),
            v if v.is_binary() => Value::Blob(self.binary(number)?.map(Into::into)),
            SqlType::Date => Value::Date(
                self.fixed::<SqlDate>(number, CDataType::TYPE_DATE)?
                    .map(|v| temporal::date_from_native(&v))
                    .transpose()
                    .map_err(|e| Failure::decode(column, format!("{e:#}")))?,
            ),
            SqlType::Time => Value::Time(
                self.fixed::<SqlTime2>(number, CDataType::SS_TIME2)?
                    .map(|v| temporal::time2_from_native(&v))
                    .transpose()
                    .map_err(|e| Failure::decode(column, format!("{e:#}")))?,
            ),
            SqlType::DateTime | SqlType::Timestamp => Value::Timestamp(
                self.fixed::<SqlTimestamp>(number, CDataType::TYPE_TIMESTAMP)?
                    .map(|v| temporal::timestamp_from_native(&v))
                    .transpose()
                    .map_err(|e| Failure::decode(column, format!("{e:#}")))?,
            ),
            SqlType::DateTimeOffset => Value::TimestampWithTimezone(
                self.fixed::<SqlTimestampOffset>(number, CDataType::SS_TIMESTAMPOFFSET)?
                    .map(|v| temporal::timestamp_offset_from_native(&v))
                    .transpose()
                    .map_err(|e| Failure::decode(column, format!("{e:#}")))?,
            ),
            SqlType::Guid => Value::Uuid(
                self.fixed::<SqlGuid>(number, CDataType::GUID)?
                    .map(|v| Uuid::from_fields(v.d1, v.d2, v.d3, &v.d4)),
            ),
            SqlType::Table => {
                return Err(Failure::decode(column, "a table column cannot be fetched").into());
            }
            _ => self.variant(number)?,
        })
    }

    /// Columns without a fixed decoding: int32, int64, narrow text and wide text are tried
    /// in this order, the first conversion the driver accepts wins.
    fn variant(&self, column: u16) -> Result<Value> {
        if let Ok(v) = self.fixed::<i32>(column, CDataType::SLONG) {
            return Ok(Value::Int32(v));
        }
        if let Ok(v) = self.fixed::<i64>(column, CDataType::SBIGINT) {
            return Ok(Value::Int64(v));
        }
        if let Ok(v) = self.narrow(column) {
            return Ok(Value::Varchar(v));
        }
        match self.wide(column) {
            Ok(v) => Ok(Value::Varchar(v)),
            Err(e) => Err(Failure::decode(
                column as usize,
                format!("no conversion of the variant value succeeded: {e:#}"),
            )
            .into()),
        }
    }

    fn get_data(
        &self,
        column: u16,
        c_type: i16,
        target: *mut c_void,
        length: usize,
        indicator: &mut Len,
    ) -> Result<SqlReturn> {
        // SAFETY: `target` points to a live buffer of `length` bytes owned by the caller
        let ret = unsafe {
            self.api
                .get_data(self.stmt, column, c_type, target, length as Len, indicator)
        };
        check(self.api, ret, HandleKind::Statement, self.stmt, "SQLGetData")
    }

    /// Fixed width value, `None` when NULL.
    fn fixed<T: Default + Copy>(&self, column: u16, c_type: i16) -> Result<Option<T>> {
        let mut value = T::default();
        let mut indicator: Len = 0;
        let ret = self.get_data(
            column,
            c_type,
            &mut value as *mut T as *mut c_void,
            mem::size_of::<T>(),
            &mut indicator,
        )?;
        if ret == SqlReturn::NO_DATA || indicator == NULL_DATA {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Read a variable length value in chunks of `unit` sized elements.
    ///
    /// `terminator` is the count of elements the driver reserves for the terminator in
    /// every chunk. A truncated chunk reports the total remaining length (or no total) in
    /// the indicator, the value is complete once the indicator fits the chunk.
    fn chunks<T: Default + Copy>(
        &self,
        column: u16,
        c_type: i16,
        terminator: usize,
    ) -> Result<Option<Vec<T>>> {
        let unit = mem::size_of::<T>();
        let mut buffer = vec![T::default(); (self.chunk_size / unit).max(terminator + 1)];
        let capacity = buffer.len() - terminator;
        let mut result = Vec::new();
        let mut first = true;
        loop {
            let mut indicator: Len = 0;
            let ret = self.get_data(
                column,
                c_type,
                buffer.as_mut_ptr() as *mut c_void,
                buffer.len() * unit,
                &mut indicator,
            )?;
            if ret == SqlReturn::NO_DATA {
                break;
            }
            if indicator == NULL_DATA {
                return Ok(if first { None } else { Some(result) });
            }
            first = false;
            let available = if indicator == NO_TOTAL {
                None
            } else {
                Some(indicator.max(0) as usize / unit)
            };
            match available {
                Some(len) if len <= capacity => {
                    result.extend_from_slice(&buffer[..len]);
                    break;
                }
                _ => result.extend_from_slice(&buffer[..capacity]),
            }
        }
        Ok(if first { Some(Vec::new()) } else { Some(result) })
    }

    fn narrow(&self, column: u16) -> Result<Option<String>> {
        self.chunks::<u8>(column, CDataType::CHAR, 1)?
            .map(|v| {
                decode_utf8(&v).map_err(|e| {
                    Error::from(Failure::decode(
                        column as usize,
                        format!("invalid UTF-8 text: {e}"),
                    ))
                })
            })
            .transpose()
    }

    fn wide(&self, column: u16) -> Result<Option<String>> {
        self.chunks::<u16>(column, CDataType::WCHAR, 1)?
            .map(|v| {
                decode_utf16(&v).map_err(|e| {
                    Error::from(Failure::decode(
                        column as usize,
                        format!("invalid UTF-16 text: {e}"),
                    ))
                })
            })
            .transpose()
    }

    fn binary(&self, column: u16) -> Result<Option<Vec<u8>>> {
        self.chunks::<u8>(column, CDataType::BINARY, 0)
    }
}
