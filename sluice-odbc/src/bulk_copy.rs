use crate::{
    marshal::{decimal_to_native, integral, temporal, temporal_value},
    read_diagnostics,
};
use rust_decimal::Decimal;
use sluice_core::{
    Diagnostic, Error, Failure, HostValue, Parse, Result, SqlType, truncate_long,
    native::{
        Bcp, BcpApi, Handle, HandleKind, NULL_DATA, NativeApi, SqlDate, SqlNumeric, SqlTime2,
        SqlTimestamp, SqlTimestampOffset, to_wide,
    },
};
use std::{mem, str::FromStr};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

const INDICATOR_LEN: usize = mem::size_of::<i64>();

/// One column of the rows to insert, values in row order.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkColumn {
    pub name: String,
    pub sql_type: SqlType,
    pub values: Vec<HostValue>,
}

impl BulkColumn {
    pub fn new(name: impl Into<String>, sql_type: SqlType, values: Vec<HostValue>) -> Self {
        Self {
            name: name.into(),
            sql_type,
            values,
        }
    }
}

/// Tuning of a bulk copy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Rows per committed batch, 0 commits everything at the end.
    pub batch_size: u32,
    /// Insert NULL instead of the column default for null values.
    pub keep_nulls: bool,
    /// Insert the given values into identity columns.
    pub keep_identity: bool,
}

/// Staging buffer of one bound column.
///
/// The buffer is laid out as `[indicator: i64][data]`, allocated once and bound to the
/// server column. Each [`StorageAdapter::advance`] copies the next row into it, the pointer
/// handed to the driver stays valid until the adapter is dropped.
#[derive(Debug)]
pub enum StorageAdapter {
    /// Values with a constant size.
    Fixed {
        column: i32,
        data_type: i32,
        size: usize,
        buffer: Box<[u8]>,
        cells: Vec<Option<Vec<u8>>>,
        row: usize,
    },
    /// Text and binary values up to `max_len` bytes.
    Variable {
        column: i32,
        data_type: i32,
        max_len: usize,
        buffer: Box<[u8]>,
        cells: Vec<Option<Vec<u8>>>,
        row: usize,
    },
}

impl StorageAdapter {
    /// Encode every value of `source` and allocate the staging buffer for the (1 based)
    /// server `column`.
    pub fn new(column: usize, source: &BulkColumn) -> Result<Self> {
        let position =
            i32::try_from(column).map_err(|_| Failure::bind(column, "too many columns"))?;
        let (data_type, size) = bcp_type(source.sql_type).ok_or_else(|| {
            Failure::bind(
                column,
                format!("cannot bulk copy a {} column", source.sql_type),
            )
        })?;
        let cells = source
            .values
            .iter()
            .enumerate()
            .map(|(row, value)| {
                encode(source.sql_type, value).map_err(|reason| {
                    Error::from(Failure::bind(
                        column,
                        format!("row {row} of `{}`: {reason}", source.name),
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(match size {
            Some(size) => StorageAdapter::Fixed {
                column: position,
                data_type,
                size,
                buffer: vec![0; INDICATOR_LEN + size].into_boxed_slice(),
                cells,
                row: 0,
            },
            None => {
                let max_len = cells.iter().flatten().map(Vec::len).max().unwrap_or(0).max(1);
                StorageAdapter::Variable {
                    column: position,
                    data_type,
                    max_len,
                    buffer: vec![0; INDICATOR_LEN + max_len].into_boxed_slice(),
                    cells,
                    row: 0,
                }
            }
        })
    }

    pub fn column(&self) -> i32 {
        match self {
            StorageAdapter::Fixed { column, .. } | StorageAdapter::Variable { column, .. } => {
                *column
            }
        }
    }

    pub fn data_type(&self) -> i32 {
        match self {
            StorageAdapter::Fixed { data_type, .. }
            | StorageAdapter::Variable { data_type, .. } => *data_type,
        }
    }

    /// The length argument of the bind call.
    pub fn data_len(&self) -> i32 {
        match self {
            StorageAdapter::Fixed { size, .. } => *size as i32,
            StorageAdapter::Variable { .. } => Bcp::VARLEN_DATA,
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            StorageAdapter::Fixed { cells, .. } | StorageAdapter::Variable { cells, .. } => {
                cells.len()
            }
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        match self {
            StorageAdapter::Fixed { buffer, .. } | StorageAdapter::Variable { buffer, .. } => {
                buffer.as_ptr()
            }
        }
    }

    /// Indicator currently staged.
    pub fn indicator(&self) -> i64 {
        let buffer = match self {
            StorageAdapter::Fixed { buffer, .. } | StorageAdapter::Variable { buffer, .. } => {
                buffer
            }
        };
        let mut bytes = [0u8; INDICATOR_LEN];
        bytes.copy_from_slice(&buffer[..INDICATOR_LEN]);
        i64::from_ne_bytes(bytes)
    }

    /// Stage the next row, false once every row was staged.
    pub fn advance(&mut self) -> bool {
        let (buffer, cells, row) = match self {
            StorageAdapter::Fixed {
                buffer, cells, row, ..
            }
            | StorageAdapter::Variable {
                buffer, cells, row, ..
            } => (buffer, cells, row),
        };
        let Some(cell) = cells.get(*row) else {
            return false;
        };
        let indicator = match cell {
            Some(data) => {
                buffer[INDICATOR_LEN..INDICATOR_LEN + data.len()].copy_from_slice(data);
                data.len() as i64
            }
            None => NULL_DATA as i64,
        };
        buffer[..INDICATOR_LEN].copy_from_slice(&indicator.to_ne_bytes());
        *row += 1;
        true
    }
}

/// Bulk copy type code and fixed size of the values of `sql_type`, `None` when not supported.
fn bcp_type(sql_type: SqlType) -> Option<(i32, Option<usize>)> {
    Some(match sql_type {
        SqlType::Bit => (Bcp::SQLBIT, Some(1)),
        SqlType::TinyInt => (Bcp::SQLINT1, Some(1)),
        SqlType::SmallInt => (Bcp::SQLINT2, Some(2)),
        SqlType::Integer => (Bcp::SQLINT4, Some(4)),
        SqlType::BigInt => (Bcp::SQLINT8, Some(8)),
        SqlType::Real | SqlType::Float | SqlType::Double => (Bcp::SQLFLT8, Some(8)),
        SqlType::Numeric => (Bcp::SQLNUMERICN, Some(mem::size_of::<SqlNumeric>())),
        SqlType::Decimal => (Bcp::SQLDECIMALN, Some(mem::size_of::<SqlNumeric>())),
        SqlType::Date => (Bcp::SQLDATEN, Some(mem::size_of::<SqlDate>())),
        SqlType::Time => (Bcp::SQLTIMEN, Some(mem::size_of::<SqlTime2>())),
        SqlType::DateTime | SqlType::Timestamp => {
            (Bcp::SQLDATETIME2N, Some(mem::size_of::<SqlTimestamp>()))
        }
        SqlType::DateTimeOffset => (
            Bcp::SQLDATETIMEOFFSETN,
            Some(mem::size_of::<SqlTimestampOffset>()),
        ),
        v if v.is_narrow_string() => (Bcp::SQLVARCHAR, None),
        v if v.is_wide_string() => (Bcp::SQLNVARCHAR, None),
        SqlType::Guid | SqlType::Xml => (Bcp::SQLNVARCHAR, None),
        v if v.is_binary() => (Bcp::SQLBIGVARBINARY, None),
        _ => return None,
    })
}

/// Native bytes of `value` for a column of `sql_type`, `None` for null.
fn encode(
    sql_type: SqlType,
    value: &HostValue,
) -> std::result::Result<Option<Vec<u8>>, String> {
    if value.is_null() {
        return Ok(None);
    }
    let reject = || format!("a {} cannot be stored in a {sql_type} column", value.kind());
    let bytes = match sql_type {
        SqlType::Bit => {
            let v = match value {
                HostValue::Boolean(v) => *v,
                v => v.as_f64().ok_or_else(reject)? != 0.0,
            };
            vec![v as u8]
        }
        SqlType::TinyInt => {
            let v = integral(value)
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(reject)?;
            vec![v]
        }
        SqlType::SmallInt => integral(value)
            .and_then(|v| i16::try_from(v).ok())
            .ok_or_else(reject)?
            .to_ne_bytes()
            .to_vec(),
        SqlType::Integer => integral(value)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(reject)?
            .to_ne_bytes()
            .to_vec(),
        SqlType::BigInt => integral(value).ok_or_else(reject)?.to_ne_bytes().to_vec(),
        SqlType::Real | SqlType::Float | SqlType::Double => {
            let v = match value {
                HostValue::Boolean(v) => *v as u8 as f64,
                v => v.as_f64().filter(|v| v.is_finite()).ok_or_else(reject)?,
            };
            v.to_ne_bytes().to_vec()
        }
        SqlType::Numeric | SqlType::Decimal => {
            let decimal = match value {
                HostValue::Integer(v) => Decimal::from(*v),
                HostValue::Number(v) => Decimal::try_from(*v).map_err(|_| reject())?,
                HostValue::String(v) => Decimal::from_str(v.trim()).map_err(|_| reject())?,
                _ => return Err(reject()),
            };
            pack_numeric(&decimal_to_native(&decimal, 38))
        }
        SqlType::Date => pack_date(temporal::date_to_native(
            temporal_value(value, |v| Some(v.date()), |s| <Date as Parse>::parse(s).ok())
                .ok_or_else(reject)?,
        )),
        SqlType::Time => pack_time(temporal::time_to_native(
            temporal_value(value, |v| Some(v.time()), |s| <Time as Parse>::parse(s).ok())
                .ok_or_else(reject)?,
        )),
        SqlType::DateTime | SqlType::Timestamp => pack_timestamp(temporal::timestamp_to_native(
            temporal_value(
                value,
                |v| Some(PrimitiveDateTime::new(v.date(), v.time())),
                |s| <PrimitiveDateTime as Parse>::parse(s).ok(),
            )
            .ok_or_else(reject)?,
        )),
        SqlType::DateTimeOffset => {
            let v = temporal_value(value, Some, |s| <OffsetDateTime as Parse>::parse(s).ok())
                .ok_or_else(reject)?;
            pack_timestamp_offset(temporal::timestamp_offset_to_native(v))
        }
        SqlType::Guid => {
            let v = match value {
                HostValue::String(v) => Uuid::parse_str(v.trim()).map_err(|_| reject())?,
                _ => return Err(reject()),
            };
            wide_bytes(&v.hyphenated().to_string().to_uppercase())
        }
        v if v.is_narrow_string() => text(value).ok_or_else(reject)?.into_bytes(),
        v if v.is_wide_string() || v == SqlType::Xml => {
            wide_bytes(&text(value).ok_or_else(reject)?)
        }
        v if v.is_binary() => match value {
            HostValue::Buffer(v) => v.clone(),
            HostValue::String(v) => <Box<[u8]> as Parse>::parse(v)
                .map_err(|e| format!("{e:#}"))?
                .into_vec(),
            _ => return Err(reject()),
        },
        _ => return Err(reject()),
    };
    Ok(Some(bytes))
}

fn text(value: &HostValue) -> Option<String> {
    match value {
        HostValue::String(v) => Some(v.clone()),
        HostValue::Boolean(v) => Some(v.to_string()),
        HostValue::Integer(v) => Some(v.to_string()),
        HostValue::Number(v) if v.is_finite() => Some(v.to_string()),
        _ => None,
    }
}

fn wide_bytes(value: &str) -> Vec<u8> {
    to_wide(value)
        .into_iter()
        .flat_map(u16::to_ne_bytes)
        .collect()
}

fn pack_numeric(value: &SqlNumeric) -> Vec<u8> {
    let mut bytes = vec![value.precision, value.scale as u8, value.sign];
    bytes.extend_from_slice(&value.val);
    bytes
}

fn pack_date(value: SqlDate) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(mem::size_of::<SqlDate>());
    bytes.extend_from_slice(&value.year.to_ne_bytes());
    bytes.extend_from_slice(&value.month.to_ne_bytes());
    bytes.extend_from_slice(&value.day.to_ne_bytes());
    bytes
}

fn pack_time(value: SqlTime2) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(mem::size_of::<SqlTime2>());
    bytes.extend_from_slice(&value.hour.to_ne_bytes());
    bytes.extend_from_slice(&value.minute.to_ne_bytes());
    bytes.extend_from_slice(&value.second.to_ne_bytes());
    // padding before the fraction
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&value.fraction.to_ne_bytes());
    bytes
}

fn pack_timestamp(value: SqlTimestamp) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(mem::size_of::<SqlTimestamp>());
    bytes.extend_from_slice(&value.year.to_ne_bytes());
    for v in [value.month, value.day, value.hour, value.minute, value.second] {
        bytes.extend_from_slice(&v.to_ne_bytes());
    }
    bytes.extend_from_slice(&value.fraction.to_ne_bytes());
    bytes
}

fn pack_timestamp_offset(value: SqlTimestampOffset) -> Vec<u8> {
    let mut bytes = pack_timestamp(SqlTimestamp {
        year: value.year,
        month: value.month,
        day: value.day,
        hour: value.hour,
        minute: value.minute,
        second: value.second,
        fraction: value.fraction,
    });
    bytes.extend_from_slice(&value.timezone_hour.to_ne_bytes());
    bytes.extend_from_slice(&value.timezone_minute.to_ne_bytes());
    bytes
}

/// Drives the bulk copy protocol on one connection.
pub struct BulkCopy<'a> {
    bcp: &'a dyn BcpApi,
    api: &'a dyn NativeApi,
    conn: Handle,
    options: BulkOptions,
}

impl<'a> BulkCopy<'a> {
    pub fn new(bcp: &'a dyn BcpApi, api: &'a dyn NativeApi, conn: Handle) -> Self {
        Self {
            bcp,
            api,
            conn,
            options: Default::default(),
        }
    }

    pub fn with_options(mut self, options: BulkOptions) -> Self {
        self.options = options;
        self
    }

    /// Insert the rows of `columns` into `table`, returns the rows sent.
    ///
    /// Columns bind to the server columns in order. Every value is encoded before the
    /// protocol starts, a failing row aborts the copy.
    pub fn insert(&self, table: &str, columns: &[BulkColumn]) -> Result<u64> {
        self.run(table, columns).map_err(|error| {
            let error = error.context(format!(
                "While bulk copying into `{}`",
                truncate_long!(table)
            ));
            log::error!("{:#}", error);
            error
        })
    }

    fn run(&self, table: &str, columns: &[BulkColumn]) -> Result<u64> {
        if columns.is_empty() {
            return Err(Failure::bind(1, "a bulk copy needs at least one column").into());
        }
        let rows = columns[0].values.len();
        if let Some((i, column)) = columns
            .iter()
            .enumerate()
            .find(|(_, v)| v.values.len() != rows)
        {
            return Err(Failure::bind(
                i + 1,
                format!(
                    "`{}` has {} values but the first column has {rows}",
                    column.name,
                    column.values.len()
                ),
            )
            .into());
        }
        let mut adapters = columns
            .iter()
            .enumerate()
            .map(|(i, column)| StorageAdapter::new(i + 1, column))
            .collect::<Result<Vec<_>>>()?;

        self.require("bcp_initW")?;
        if self.bcp.init(self.conn, &to_wide(table), Bcp::DB_IN) != Bcp::SUCCEED {
            return Err(self.failure("bcp_initW"));
        }
        self.configure()?;
        for adapter in &adapters {
            self.require("bcp_bind")?;
            // SAFETY: the staging buffer is owned by the adapter and outlives the copy
            let ret = unsafe {
                self.bcp.bind(
                    self.conn,
                    adapter.as_ptr(),
                    INDICATOR_LEN as i32,
                    adapter.data_len(),
                    adapter.data_type(),
                    adapter.column(),
                )
            };
            if ret != Bcp::SUCCEED {
                return Err(self.abort("bcp_bind"));
            }
        }
        let mut sent: u64 = 0;
        for _ in 0..rows {
            for adapter in adapters.iter_mut() {
                adapter.advance();
            }
            self.require("bcp_sendrow")?;
            if self.bcp.send_row(self.conn) != Bcp::SUCCEED {
                return Err(self.abort("bcp_sendrow"));
            }
            sent += 1;
            let batch = self.options.batch_size as u64;
            if batch > 0 && sent % batch == 0 {
                self.require("bcp_batch")?;
                if self.bcp.batch(self.conn) < 0 {
                    return Err(self.abort("bcp_batch"));
                }
                log::trace!("Committed {sent} rows into `{table}`");
            }
        }
        self.require("bcp_done")?;
        if self.bcp.done(self.conn) < 0 {
            return Err(self.failure("bcp_done"));
        }
        log::debug!("Bulk copied {sent} rows into `{table}`");
        Ok(sent)
    }

    fn configure(&self) -> Result<()> {
        let mut controls = Vec::new();
        if self.options.batch_size > 0 {
            controls.push((Bcp::BATCH, self.options.batch_size as isize));
        }
        if self.options.keep_nulls {
            controls.push((Bcp::KEEPNULLS, 1));
        }
        if self.options.keep_identity {
            controls.push((Bcp::KEEPIDENTITY, 1));
        }
        for (option, value) in controls {
            self.require("bcp_control")?;
            if self.bcp.control(self.conn, option, value) != Bcp::SUCCEED {
                return Err(self.abort("bcp_control"));
            }
        }
        Ok(())
    }

    fn require(&self, function: &'static str) -> Result<()> {
        if self.bcp.missing().contains(&function) {
            return Err(Failure::PluginLoad {
                reason: format!("the library does not export `{function}`"),
            }
            .into());
        }
        Ok(())
    }

    /// Failure carrying the connection diagnostics of `operation`.
    fn failure(&self, operation: &'static str) -> Error {
        let mut diagnostics = read_diagnostics(self.api, HandleKind::Connection, self.conn);
        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic::new(
                "HY000",
                0,
                format!("{operation} failed without diagnostics"),
            ));
        }
        Failure::NativeCall {
            operation,
            diagnostics,
        }
        .into()
    }

    /// Read the diagnostics of `operation`, then end the copy so the connection is usable.
    fn abort(&self, operation: &'static str) -> Error {
        let error = self.failure(operation);
        if !self.bcp.missing().contains(&"bcp_done") && self.bcp.done(self.conn) < 0 {
            log::warn!("Could not end the bulk copy after {operation} failed");
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, time};

    #[test]
    fn struct_layouts() {
        let date = temporal::date_to_native(date!(2024 - 02 - 29));
        assert_eq!(pack_date(date).len(), mem::size_of::<SqlDate>());
        let time = temporal::time_to_native(time!(10:20:30.5));
        assert_eq!(pack_time(time).len(), mem::size_of::<SqlTime2>());
        assert_eq!(
            pack_timestamp(SqlTimestamp::default()).len(),
            mem::size_of::<SqlTimestamp>()
        );
        assert_eq!(
            pack_timestamp_offset(SqlTimestampOffset::default()).len(),
            mem::size_of::<SqlTimestampOffset>()
        );
        assert_eq!(
            pack_numeric(&SqlNumeric::default()).len(),
            mem::size_of::<SqlNumeric>()
        );
    }

    #[test]
    fn fixed_adapter() {
        let column = BulkColumn::new(
            "id",
            SqlType::Integer,
            vec![1.into(), HostValue::Null, 3.into()],
        );
        let mut adapter = StorageAdapter::new(1, &column).unwrap();
        assert!(matches!(adapter, StorageAdapter::Fixed { size: 4, .. }));
        assert_eq!(adapter.data_len(), 4);
        assert_eq!(adapter.data_type(), Bcp::SQLINT4);
        let pointer = adapter.as_ptr();
        assert!(adapter.advance());
        assert_eq!(adapter.indicator(), 4);
        assert!(adapter.advance());
        assert_eq!(adapter.indicator(), NULL_DATA as i64);
        assert!(adapter.advance());
        assert!(!adapter.advance());
        assert_eq!(adapter.as_ptr(), pointer);
    }

    #[test]
    fn variable_adapter() {
        let column = BulkColumn::new(
            "name",
            SqlType::WVarChar,
            vec!["a".into(), "abc".into(), HostValue::Null],
        );
        let mut adapter = StorageAdapter::new(2, &column).unwrap();
        assert!(matches!(adapter, StorageAdapter::Variable { max_len: 6, .. }));
        assert_eq!(adapter.data_len(), Bcp::VARLEN_DATA);
        assert_eq!(adapter.column(), 2);
        adapter.advance();
        assert_eq!(adapter.indicator(), 2);
        adapter.advance();
        assert_eq!(adapter.indicator(), 6);
        adapter.advance();
        assert_eq!(adapter.indicator(), NULL_DATA as i64);
    }

    #[test]
    fn rejected_values() {
        let column = BulkColumn::new("n", SqlType::TinyInt, vec![300.into()]);
        assert!(StorageAdapter::new(1, &column).is_err());
        let column = BulkColumn::new("x", SqlType::Double, vec![f64::NAN.into()]);
        assert!(StorageAdapter::new(1, &column).is_err());
        let column = BulkColumn::new("v", SqlType::Variant, vec![1.into()]);
        assert!(StorageAdapter::new(1, &column).is_err());
        let column = BulkColumn::new("d", SqlType::Date, vec![HostValue::Date(1e33)]);
        assert!(StorageAdapter::new(1, &column).is_err());
    }
}
