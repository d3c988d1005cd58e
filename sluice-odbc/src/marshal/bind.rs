use crate::marshal::{
    DatumStorage, HostKind, bind_table, classify_number, decimal_from_native, decimal_to_native,
    decode_utf16, decode_utf8, encode_utf16, infer_scalar, precision_of, temporal,
};
use rust_decimal::Decimal;
use sluice_core::{
    Failure, HostValue, ParamDirection, ParamSpec, Parse, Result, SqlType, Value,
    native::{Len, NULL_DATA, ParamIo, ParameterBinding, SqlGuid},
};
use std::{fmt::Display, str::FromStr};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use uuid::Uuid;

/// Wide characters above which a string binds as the long variant.
pub const MAX_WIDE_CHARS: usize = 4000;
/// Narrow bytes (and binary bytes) above which a value binds as the long variant.
pub const MAX_NARROW_BYTES: usize = 8000;

/// A parameter marshaled into native buffers.
#[derive(Debug, Clone)]
pub struct BoundParameter {
    /// 1 based position.
    pub index: u16,
    pub direction: ParamDirection,
    pub c_type: i16,
    pub sql_type: SqlType,
    pub column_size: usize,
    pub decimal_digits: i16,
    pub storage: DatumStorage,
    /// One length or NULL marker per row.
    pub indicators: Vec<Len>,
    pub rows: usize,
    pub table: Option<BoundTable>,
}

/// Columns of a table-valued parameter, bound under the parameter focus.
#[derive(Debug, Clone)]
pub struct BoundTable {
    pub type_name: Vec<u16>,
    pub schema: Vec<u16>,
    pub rows: usize,
    pub columns: Vec<BoundParameter>,
}

impl BoundParameter {
    pub fn io(&self) -> ParamIo {
        match self.direction {
            ParamDirection::Input => ParamIo::Input,
            ParamDirection::Output => ParamIo::Output,
            ParamDirection::InputOutput => ParamIo::InputOutput,
        }
    }

    /// Arguments of the native bind call, pointing into this parameter's buffers.
    pub fn binding(&mut self) -> ParameterBinding {
        ParameterBinding {
            index: self.index,
            io: self.io(),
            c_type: self.c_type,
            sql_type: self.sql_type.code(),
            column_size: self.column_size,
            decimal_digits: self.decimal_digits,
            value: self.storage.as_mut_ptr(),
            buffer_length: self.storage.buffer_length(),
            indicator: self.indicators.as_mut_ptr(),
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.indicators.get(row).is_some_and(|v| *v == NULL_DATA)
    }

    /// Repeat a single row parameter so that it matches the parameter set size.
    pub fn broadcast(&mut self, rows: usize) {
        if self.rows == 1 && rows > 1 {
            self.storage.broadcast(rows);
            self.indicators = vec![self.indicators[0]; rows];
            self.rows = rows;
        }
    }

    /// Decode the buffer of `row` back into a value, used for output parameters.
    pub fn decode_row(&self, row: usize) -> Result<Value> {
        let index = self.index as usize;
        if row >= self.rows {
            return Err(Failure::bind(index, format!("row {row} is out of range")).into());
        }
        if self.is_null(row) {
            return Ok(Value::null_of(self.sql_type));
        }
        let indicator = self.indicators[row].max(0) as usize;
        Ok(match &self.storage {
            DatumStorage::Bit(v) => Value::Boolean(Some(v[row] != 0)),
            DatumStorage::Integer(v) => match self.sql_type {
                SqlType::TinyInt | SqlType::SmallInt => Value::Int16(Some(v[row] as i16)),
                _ => Value::Int32(Some(v[row])),
            },
            DatumStorage::UInteger(v) => Value::UInt32(Some(v[row])),
            DatumStorage::BigInt(v) => Value::Int64(Some(v[row])),
            DatumStorage::Double(v) => Value::Float64(Some(v[row])),
            DatumStorage::Numeric(v) => Value::Decimal(
                Some(decimal_from_native(&v[row]).ok_or_else(|| {
                    Failure::bind(index, "the numeric value does not fit a decimal")
                })?),
                self.column_size.min(38) as u8,
                self.decimal_digits.max(0) as u8,
            ),
            DatumStorage::Char { data, width } => {
                let len = indicator.min(width.saturating_sub(1));
                let start = row * width;
                Value::Varchar(Some(
                    decode_utf8(&data[start..start + len])
                        .map_err(|e| Failure::bind(index, format!("invalid text: {e}")))?,
                ))
            }
            DatumStorage::WChar { data, width } => {
                let len = (indicator / 2).min(width.saturating_sub(1));
                let start = row * width;
                Value::Varchar(Some(
                    decode_utf16(&data[start..start + len])
                        .map_err(|e| Failure::bind(index, format!("invalid text: {e}")))?,
                ))
            }
            DatumStorage::Binary { data, width } => {
                let len = indicator.min(*width);
                let start = row * width;
                Value::Blob(Some(data[start..start + len].into()))
            }
            DatumStorage::Date(v) => Value::Date(Some(temporal::date_from_native(&v[row])?)),
            DatumStorage::Time(v) => Value::Time(Some(temporal::time2_from_native(&v[row])?)),
            DatumStorage::Timestamp(v) => {
                Value::Timestamp(Some(temporal::timestamp_from_native(&v[row])?))
            }
            DatumStorage::TimestampOffset(v) => Value::TimestampWithTimezone(Some(
                temporal::timestamp_offset_from_native(&v[row])?,
            )),
            DatumStorage::Guid(v) => {
                let g = &v[row];
                Value::Uuid(Some(Uuid::from_fields(g.d1, g.d2, g.d3, &g.d4)))
            }
            DatumStorage::TableName(..) => Value::Null,
        })
    }

    /// Every row decoded.
    pub fn values(&self) -> Result<Vec<Value>> {
        (0..self.rows).map(|row| self.decode_row(row)).collect()
    }
}

/// Marshal the parameter at (1 based) `index`.
pub fn bind_parameter(index: usize, spec: &ParamSpec) -> Result<BoundParameter> {
    if spec.table.is_some() || spec.sql_type == Some(SqlType::Table) {
        return bind_table(index, spec);
    }
    let position =
        u16::try_from(index).map_err(|_| Failure::bind(index, "too many parameters"))?;
    let explicit = spec.sql_type.filter(|v| !v.is_ambiguous());
    let kind = match explicit {
        Some(..) => None,
        None => Some(infer_scalar(index, &spec.value)?),
    };
    if kind == Some(HostKind::Table) {
        return Err(Failure::bind(index, "an object parameter must be a descriptor").into());
    }
    let placeholder = spec.direction == ParamDirection::Output && spec.value.is_null();
    let sql_type = match (explicit, kind) {
        (Some(v), _) => v,
        _ if placeholder => {
            return Err(Failure::bind(index, "an output parameter requires a type").into());
        }
        (None, Some(kind)) => kind.default_sql_type(),
        (None, None) => SqlType::VarChar,
    };
    let single = [spec.value.clone()];
    let values: &[HostValue] = match &spec.value {
        HostValue::Array(items) if !placeholder => items,
        _ => &single,
    };
    let mut encoder = Encoder {
        index,
        spec,
        placeholder,
        unsigned: kind == Some(HostKind::UInt32),
        indicators: Vec::with_capacity(values.len()),
    };
    let (storage, sql_type, column_size, decimal_digits) = encoder.encode(sql_type, values)?;
    if !storage.accepts(sql_type) {
        return Err(Failure::bind(
            index,
            format!("C type {} cannot carry a {sql_type} value", storage.c_type()),
        )
        .into());
    }
    let rows = values.len();
    Ok(BoundParameter {
        index: position,
        direction: spec.direction,
        c_type: storage.c_type(),
        sql_type,
        column_size,
        decimal_digits,
        storage,
        indicators: encoder.indicators,
        rows,
        table: None,
    })
}

/// Marshal all the parameters, arrays fix the parameter set size and scalars are repeated to
/// match it.
pub fn bind_parameters(specs: &[ParamSpec]) -> Result<(Vec<BoundParameter>, usize)> {
    let mut result = specs
        .iter()
        .enumerate()
        .map(|(i, spec)| bind_parameter(i + 1, spec))
        .collect::<Result<Vec<_>>>()?;
    let mut rows = None;
    for (i, spec) in specs.iter().enumerate() {
        if let HostValue::Array(items) = &spec.value {
            if spec.table.is_some() {
                continue;
            }
            match rows {
                None => rows = Some(items.len()),
                Some(n) if n != items.len() => {
                    return Err(Failure::bind(
                        i + 1,
                        format!(
                            "the array has {} elements but the previous arrays have {n}",
                            items.len()
                        ),
                    )
                    .into());
                }
                _ => {}
            }
        }
    }
    let rows = rows.unwrap_or(1);
    if rows == 0 {
        return Err(Failure::bind(1, "array parameters must not be empty").into());
    }
    for parameter in result.iter_mut() {
        if parameter.table.is_none() {
            parameter.broadcast(rows);
        }
    }
    Ok((result, rows))
}

type Encoded = (DatumStorage, SqlType, usize, i16);

struct Encoder<'a> {
    index: usize,
    spec: &'a ParamSpec,
    placeholder: bool,
    unsigned: bool,
    indicators: Vec<Len>,
}

impl Encoder<'_> {
    fn encode(&mut self, sql_type: SqlType, values: &[HostValue]) -> Result<Encoded> {
        match sql_type {
            SqlType::Bit => {
                let data = self.fixed(sql_type, values, 1, |v| match v {
                    HostValue::Boolean(v) => Some(*v as u8),
                    v => v.as_f64().map(|v| (v != 0.0) as u8),
                })?;
                Ok((DatumStorage::Bit(data), sql_type, 1, 0))
            }
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer => {
                let (min, max, size) = match sql_type {
                    SqlType::TinyInt => (0, u8::MAX as i64, 3),
                    SqlType::SmallInt => (i16::MIN as i64, i16::MAX as i64, 5),
                    _ => (i32::MIN as i64, i32::MAX as i64, 10),
                };
                let data = self.fixed(sql_type, values, 4, |v| {
                    integral(v).filter(|v| (min..=max).contains(v)).map(|v| v as i32)
                })?;
                Ok((DatumStorage::Integer(data), sql_type, size, 0))
            }
            SqlType::BigInt if self.unsigned => {
                let data = self.fixed(sql_type, values, 4, |v| {
                    integral(v).and_then(|v| u32::try_from(v).ok())
                })?;
                Ok((DatumStorage::UInteger(data), sql_type, 19, 0))
            }
            SqlType::BigInt => {
                let data = self.fixed(sql_type, values, 8, integral)?;
                Ok((DatumStorage::BigInt(data), sql_type, 19, 0))
            }
            SqlType::Real | SqlType::Float | SqlType::Double => {
                let data = self.fixed(sql_type, values, 8, |v| match v {
                    HostValue::Boolean(v) => Some(*v as u8 as f64),
                    v => v.as_f64().filter(|v| v.is_finite()),
                })?;
                Ok((DatumStorage::Double(data), sql_type, 15, 0))
            }
            SqlType::Numeric | SqlType::Decimal => self.numeric(sql_type, values),
            v if v.is_narrow_string() => self.narrow(v, values),
            v if v.is_wide_string() => self.wide(v, values),
            v if v.is_binary() => self.binary(v, values),
            SqlType::Date => {
                let data = self.fixed(sql_type, values, 6, |v| {
                    temporal_value(v, |v| Some(v.date()), |s| <Date as Parse>::parse(s).ok())
                        .map(temporal::date_to_native)
                })?;
                Ok((DatumStorage::Date(data), sql_type, 10, 0))
            }
            SqlType::Time => {
                let data = self.fixed(sql_type, values, 12, |v| {
                    temporal_value(v, |v| Some(v.time()), |s| <Time as Parse>::parse(s).ok())
                        .map(temporal::time_to_native)
                })?;
                Ok((DatumStorage::Time(data), sql_type, 16, 7))
            }
            SqlType::DateTime | SqlType::Timestamp => {
                let data = self.fixed(sql_type, values, 16, |v| {
                    temporal_value(
                        v,
                        |v| Some(PrimitiveDateTime::new(v.date(), v.time())),
                        |s| <PrimitiveDateTime as Parse>::parse(s).ok(),
                    )
                    .map(temporal::timestamp_to_native)
                })?;
                let (size, digits) = if sql_type == SqlType::DateTime {
                    (23, 3)
                } else {
                    (27, 7)
                };
                Ok((DatumStorage::Timestamp(data), sql_type, size, digits))
            }
            SqlType::DateTimeOffset => {
                let data = self.fixed(sql_type, values, 20, |v| {
                    temporal_value(v, Some, |s| <OffsetDateTime as Parse>::parse(s).ok())
                        .map(temporal::timestamp_offset_to_native)
                })?;
                Ok((DatumStorage::TimestampOffset(data), sql_type, 34, 7))
            }
            SqlType::Guid => {
                let data = self.fixed(sql_type, values, 16, |v| {
                    let uuid = match v {
                        HostValue::String(v) => <Uuid as Parse>::parse(v).ok()?,
                        HostValue::Buffer(v) => Uuid::from_slice(v).ok()?,
                        _ => return None,
                    };
                    let (d1, d2, d3, d4) = uuid.as_fields();
                    Some(SqlGuid {
                        d1,
                        d2,
                        d3,
                        d4: *d4,
                    })
                })?;
                Ok((DatumStorage::Guid(data), sql_type, 36, 0))
            }
            v => Err(Failure::bind(self.index, format!("cannot bind a {v} value")).into()),
        }
    }

    fn reject(&self, row: usize, value: &HostValue, sql_type: impl Display) -> Failure {
        let position = if matches!(self.spec.value, HostValue::Array(..)) {
            format!("element {row}: ")
        } else {
            String::new()
        };
        Failure::bind(
            self.index,
            format!("{position}a {} value cannot be bound as {sql_type}", value.kind()),
        )
    }

    /// Fixed width elements, `size` is the indicator length of a non null element.
    fn fixed<T: Default, F: Fn(&HostValue) -> Option<T>>(
        &mut self,
        sql_type: SqlType,
        values: &[HostValue],
        size: Len,
        convert: F,
    ) -> Result<Vec<T>> {
        let mut data = Vec::with_capacity(values.len());
        for (row, value) in values.iter().enumerate() {
            if self.placeholder {
                data.push(T::default());
                self.indicators.push(0);
            } else if value.is_null() {
                data.push(T::default());
                self.indicators.push(NULL_DATA);
            } else {
                let Some(converted) = convert(value) else {
                    return Err(self.reject(row, value, sql_type).into());
                };
                data.push(converted);
                self.indicators.push(size);
            }
        }
        Ok(data)
    }

    fn numeric(&mut self, sql_type: SqlType, values: &[HostValue]) -> Result<Encoded> {
        let mut decimals = Vec::with_capacity(values.len());
        for (row, value) in values.iter().enumerate() {
            decimals.push(match value {
                _ if self.placeholder => Some(Decimal::ZERO),
                HostValue::Null => None,
                HostValue::Integer(v) => Some(Decimal::from(*v)),
                HostValue::Number(v) if v.is_finite() => {
                    Some(Decimal::try_from(*v).map_err(|_| self.reject(row, value, "numeric"))?)
                }
                HostValue::String(v) => Some(
                    Decimal::from_str(v.trim()).map_err(|_| self.reject(row, value, "numeric"))?,
                ),
                v => return Err(self.reject(row, v, "numeric").into()),
            });
        }
        let scale = match self.spec.scale {
            Some(v) => v.clamp(0, 38) as u32,
            None => decimals.iter().flatten().map(Decimal::scale).max().unwrap_or(0),
        };
        let precision = self
            .spec
            .precision
            .map(|v| v.clamp(1, 38) as u8)
            .unwrap_or(38);
        let mut data = Vec::with_capacity(decimals.len());
        for decimal in decimals {
            match decimal {
                Some(mut v) => {
                    v.rescale(scale);
                    if precision_of(&v) > precision {
                        return Err(Failure::bind(
                            self.index,
                            format!("{v} exceeds the precision {precision}"),
                        )
                        .into());
                    }
                    data.push(decimal_to_native(&v, precision));
                    self.indicators
                        .push(if self.placeholder { 0 } else { size_of_numeric() });
                }
                None => {
                    data.push(Default::default());
                    self.indicators.push(NULL_DATA);
                }
            }
        }
        Ok((
            DatumStorage::Numeric(data),
            sql_type,
            precision as usize,
            scale as i16,
        ))
    }

    fn text_values(&self, values: &[HostValue], sql_type: &str) -> Result<Vec<Option<String>>> {
        values
            .iter()
            .enumerate()
            .map(|(row, value)| {
                Ok(match value {
                    _ if self.placeholder => Some(String::new()),
                    HostValue::Null => None,
                    HostValue::String(v) => Some(v.clone()),
                    HostValue::Boolean(v) => Some(if *v { "1" } else { "0" }.into()),
                    HostValue::Integer(v) => Some(v.to_string()),
                    HostValue::Number(v) if v.is_finite() => Some(v.to_string()),
                    v => return Err(self.reject(row, v, sql_type).into()),
                })
            })
            .collect()
    }

    /// Size reserved for output strings and buffers.
    fn reserved(&self, default: usize) -> usize {
        if self.spec.direction.is_output() {
            self.spec.precision.unwrap_or(default)
        } else {
            0
        }
    }

    fn narrow(&mut self, sql_type: SqlType, values: &[HostValue]) -> Result<Encoded> {
        let texts = self.text_values(values, "varchar")?;
        let longest = texts.iter().flatten().map(String::len).max().unwrap_or(0);
        let chars = longest.max(self.reserved(MAX_NARROW_BYTES)).max(1);
        let width = chars + 1;
        let mut data = vec![0u8; width * texts.len()];
        for (row, text) in texts.iter().enumerate() {
            match text {
                Some(text) => {
                    data[row * width..row * width + text.len()].copy_from_slice(text.as_bytes());
                    self.indicators.push(text.len() as Len);
                }
                None => self.indicators.push(NULL_DATA),
            }
        }
        let sql_type = if sql_type == SqlType::VarChar && chars > MAX_NARROW_BYTES {
            SqlType::LongVarChar
        } else {
            sql_type
        };
        let column_size = self.spec.precision.unwrap_or(chars).max(1);
        Ok((DatumStorage::Char { data, width }, sql_type, column_size, 0))
    }

    fn wide(&mut self, sql_type: SqlType, values: &[HostValue]) -> Result<Encoded> {
        let texts = self
            .text_values(values, "nvarchar")?
            .into_iter()
            .map(|v| v.map(|v| encode_utf16(&v)))
            .collect::<Vec<_>>();
        let longest = texts.iter().flatten().map(Vec::len).max().unwrap_or(0);
        let chars = longest.max(self.reserved(MAX_WIDE_CHARS)).max(1);
        let width = chars + 1;
        let mut data = vec![0u16; width * texts.len()];
        for (row, text) in texts.iter().enumerate() {
            match text {
                Some(text) => {
                    data[row * width..row * width + text.len()].copy_from_slice(text);
                    self.indicators.push((text.len() * 2) as Len);
                }
                None => self.indicators.push(NULL_DATA),
            }
        }
        let sql_type = if sql_type == SqlType::WVarChar && chars > MAX_WIDE_CHARS {
            SqlType::WLongVarChar
        } else {
            sql_type
        };
        let column_size = self.spec.precision.unwrap_or(chars).max(1);
        Ok((DatumStorage::WChar { data, width }, sql_type, column_size, 0))
    }

    fn binary(&mut self, sql_type: SqlType, values: &[HostValue]) -> Result<Encoded> {
        let buffers = values
            .iter()
            .enumerate()
            .map(|(row, value)| {
                Ok(match value {
                    _ if self.placeholder => Some(Vec::new()),
                    HostValue::Null => None,
                    HostValue::Buffer(v) => Some(v.clone()),
                    HostValue::String(v) => Some(
                        <Box<[u8]> as Parse>::parse(v)
                            .map_err(|_| self.reject(row, value, "varbinary"))?
                            .into_vec(),
                    ),
                    v => return Err(self.reject(row, v, "varbinary").into()),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let longest = buffers.iter().flatten().map(Vec::len).max().unwrap_or(0);
        let width = longest.max(self.reserved(MAX_NARROW_BYTES)).max(1);
        let mut data = vec![0u8; width * buffers.len()];
        for (row, buffer) in buffers.iter().enumerate() {
            match buffer {
                Some(buffer) => {
                    data[row * width..row * width + buffer.len()].copy_from_slice(buffer);
                    self.indicators.push(buffer.len() as Len);
                }
                None => self.indicators.push(NULL_DATA),
            }
        }
        let sql_type = if sql_type == SqlType::VarBinary && width > MAX_NARROW_BYTES {
            SqlType::LongVarBinary
        } else {
            sql_type
        };
        let column_size = self.spec.precision.unwrap_or(width).max(1);
        Ok((DatumStorage::Binary { data, width }, sql_type, column_size, 0))
    }
}

fn size_of_numeric() -> Len {
    std::mem::size_of::<sluice_core::native::SqlNumeric>() as Len
}

/// Integral value of a host number or boolean.
pub(crate) fn integral(value: &HostValue) -> Option<i64> {
    match value {
        HostValue::Boolean(v) => Some(*v as i64),
        HostValue::Integer(v) => Some(*v),
        HostValue::Number(..) => {
            classify_number(value)?;
            let v = value.as_f64()?;
            (v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64).then_some(v as i64)
        }
        _ => None,
    }
}

/// Temporal value from a host date (epoch milliseconds, UTC) or its textual form.
pub(crate) fn temporal_value<T>(
    value: &HostValue,
    from_instant: impl Fn(OffsetDateTime) -> Option<T>,
    from_text: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    match value {
        HostValue::Date(v) => {
            from_instant(HostValue::epoch_millis_to_date_time(*v)?.to_offset(UtcOffset::UTC))
        }
        HostValue::String(v) => from_text(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{FailureKind, failure_kind, native::CDataType};
    use time::macros::{date, datetime};

    fn bind(value: impl Into<HostValue>) -> BoundParameter {
        bind_parameter(1, &ParamSpec::new(value)).unwrap()
    }

    #[test]
    fn scalar_defaults() {
        let p = bind(42);
        assert_eq!(p.c_type, CDataType::SLONG);
        assert_eq!(p.sql_type, SqlType::Integer);
        assert_eq!((p.column_size, p.decimal_digits), (10, 0));
        assert_eq!(p.values().unwrap(), vec![Value::Int32(Some(42))]);

        let p = bind(HostValue::Integer(u32::MAX as i64));
        assert_eq!(p.c_type, CDataType::ULONG);
        assert_eq!(p.sql_type, SqlType::BigInt);
        assert_eq!(p.values().unwrap(), vec![Value::UInt32(Some(u32::MAX))]);

        let p = bind(HostValue::Integer(i64::MIN));
        assert_eq!(p.c_type, CDataType::SBIGINT);
        assert_eq!(p.column_size, 19);
        assert_eq!(p.values().unwrap(), vec![Value::Int64(Some(i64::MIN))]);

        let p = bind(1.25);
        assert_eq!((p.sql_type, p.column_size), (SqlType::Double, 15));
        assert_eq!(p.values().unwrap(), vec![Value::Float64(Some(1.25))]);

        let p = bind(true);
        assert_eq!((p.sql_type, p.column_size), (SqlType::Bit, 1));
        assert_eq!(p.values().unwrap(), vec![Value::Boolean(Some(true))]);
    }

    #[test]
    fn strings_bind_wide() {
        let p = bind("héllo");
        assert_eq!(p.c_type, CDataType::WCHAR);
        assert_eq!(p.sql_type, SqlType::WVarChar);
        assert_eq!(p.column_size, 5);
        assert_eq!(p.indicators, vec![10]);
        assert_eq!(p.values().unwrap(), vec![Value::Varchar(Some("héllo".into()))]);

        let p = bind("");
        assert_eq!(p.column_size, 1);
        assert_eq!(p.indicators, vec![0]);
        assert_eq!(p.values().unwrap(), vec![Value::Varchar(Some("".into()))]);

        let long = "x".repeat(MAX_WIDE_CHARS + 1);
        assert_eq!(bind(long.as_str()).sql_type, SqlType::WLongVarChar);
        assert_eq!(bind("x".repeat(MAX_WIDE_CHARS).as_str()).sql_type, SqlType::WVarChar);
    }

    #[test]
    fn explicit_narrow_string() {
        let p = bind_parameter(1, &ParamSpec::typed("àb", SqlType::VarChar)).unwrap();
        assert_eq!(p.c_type, CDataType::CHAR);
        assert_eq!(p.indicators, vec![3]);
        assert_eq!(p.values().unwrap(), vec![Value::Varchar(Some("àb".into()))]);
        let long = "y".repeat(MAX_NARROW_BYTES + 1);
        let p = bind_parameter(1, &ParamSpec::typed(long.as_str(), SqlType::VarChar)).unwrap();
        assert_eq!(p.sql_type, SqlType::LongVarChar);
    }

    #[test]
    fn null_to_varchar() {
        let p = bind_parameter(1, &ParamSpec::typed(HostValue::Null, SqlType::VarChar)).unwrap();
        assert_eq!(p.indicators, vec![NULL_DATA]);
        match &p.storage {
            DatumStorage::Char { data, .. } => assert!(data.iter().all(|v| *v == 0)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(p.values().unwrap(), vec![Value::Varchar(None)]);
        let p = bind(HostValue::Null);
        assert_eq!(p.sql_type, SqlType::VarChar);
        assert!(p.is_null(0));
    }

    #[test]
    fn buffers() {
        let p = bind(vec![1u8, 2, 3]);
        assert_eq!(p.sql_type, SqlType::VarBinary);
        assert_eq!(p.indicators, vec![3]);
        assert_eq!(p.values().unwrap(), vec![Value::Blob(Some([1, 2, 3].into()))]);
        let p = bind(Vec::<u8>::new());
        assert_eq!(p.indicators, vec![0]);
        assert_eq!(p.values().unwrap(), vec![Value::Blob(Some([].into()))]);
        let p = bind(vec![0u8; MAX_NARROW_BYTES + 1]);
        assert_eq!(p.sql_type, SqlType::LongVarBinary);
    }

    #[test]
    fn dates_bind_as_offset_utc() {
        let p = bind(HostValue::Date(1_000_000_000_000.0));
        assert_eq!(p.c_type, CDataType::SS_TIMESTAMPOFFSET);
        assert_eq!((p.column_size, p.decimal_digits), (34, 7));
        assert_eq!(
            p.values().unwrap(),
            vec![Value::TimestampWithTimezone(Some(datetime!(2001-09-09 01:46:40 UTC)))]
        );
        let p = bind_parameter(1, &ParamSpec::typed("2020-02-29", SqlType::Date)).unwrap();
        assert_eq!((p.column_size, p.decimal_digits), (10, 0));
        assert_eq!(p.values().unwrap(), vec![Value::Date(Some(date!(2020 - 02 - 29)))]);
        let p = bind_parameter(1, &ParamSpec::typed("12:00:01", SqlType::Time)).unwrap();
        assert_eq!((p.column_size, p.decimal_digits), (16, 7));
        let p =
            bind_parameter(1, &ParamSpec::typed("2020-02-29 10:00", SqlType::Timestamp)).unwrap();
        assert_eq!((p.column_size, p.decimal_digits), (27, 7));
    }

    #[test]
    fn huge_dates_are_rejected() {
        for millis in [1e33, -1e33, 8.64e16] {
            let error = bind_parameter(1, &ParamSpec::new(HostValue::Date(millis))).unwrap_err();
            assert_eq!(failure_kind(&error), FailureKind::Marshal);
        }
        let error = bind_parameter(1, &ParamSpec::typed(HostValue::Date(1e300), SqlType::Date))
            .unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);
    }

    #[test]
    fn numeric_and_guid() {
        let p = bind_parameter(1, &ParamSpec::typed("123.450", SqlType::Decimal)).unwrap();
        assert_eq!((p.column_size, p.decimal_digits), (38, 3));
        assert_eq!(
            p.values().unwrap(),
            vec![Value::Decimal(Some(Decimal::from_str("123.450").unwrap()), 38, 3)]
        );
        let p = bind_parameter(
            1,
            &ParamSpec::typed(12.5, SqlType::Numeric).with_precision(10, 2),
        )
        .unwrap();
        assert_eq!((p.column_size, p.decimal_digits), (10, 2));
        assert_eq!(
            p.values().unwrap(),
            vec![Value::Decimal(Some(Decimal::from_str("12.50").unwrap()), 10, 2)]
        );
        let error = bind_parameter(
            1,
            &ParamSpec::typed(123456, SqlType::Numeric).with_precision(4, 0),
        )
        .unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);

        let text = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";
        let p = bind_parameter(1, &ParamSpec::typed(text, SqlType::Guid)).unwrap();
        assert_eq!(p.column_size, 36);
        assert_eq!(
            p.values().unwrap(),
            vec![Value::Uuid(Some(Uuid::parse_str(text).unwrap()))]
        );
    }

    #[test]
    fn arrays() {
        let p = bind(HostValue::Array(vec![1.into(), 2.into(), 3.into()]));
        assert_eq!(p.rows, 3);
        assert_eq!(p.indicators, vec![4, 4, 4]);
        assert_eq!(p.storage, DatumStorage::Integer(vec![1, 2, 3]));

        let p = bind(HostValue::Array(vec!["a".into(), HostValue::Null, "abc".into()]));
        assert_eq!(p.rows, 3);
        assert_eq!(p.indicators, vec![2, NULL_DATA, 6]);
        assert_eq!(p.column_size, 3);
        assert_eq!(
            p.values().unwrap(),
            vec![
                Value::Varchar(Some("a".into())),
                Value::Varchar(None),
                Value::Varchar(Some("abc".into()))
            ]
        );
        let p = bind(HostValue::Array(vec![HostValue::Null, 7.into()]));
        assert_eq!(p.indicators[0], NULL_DATA);
        assert!(p.is_null(0));
        assert!(!p.is_null(1));
    }

    #[test]
    fn parameter_sets() {
        let (params, rows) = bind_parameters(&[
            ParamSpec::new(HostValue::Array(vec![1.into(), 2.into()])),
            ParamSpec::new("same"),
        ])
        .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(params[1].rows, 2);
        assert_eq!(params[1].indicators, vec![8, 8]);
        assert_eq!(
            params[1].values().unwrap(),
            vec![Value::Varchar(Some("same".into())), Value::Varchar(Some("same".into()))]
        );
        let error = bind_parameters(&[
            ParamSpec::new(HostValue::Array(vec![1.into(), 2.into()])),
            ParamSpec::new(HostValue::Array(vec![1.into()])),
        ])
        .unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);
    }

    #[test]
    fn output_placeholders() {
        let p = bind_parameter(1, &ParamSpec::output(SqlType::Integer)).unwrap();
        assert_eq!(p.io(), ParamIo::Output);
        assert_eq!(p.storage, DatumStorage::Integer(vec![0]));
        assert_eq!(p.values().unwrap(), vec![Value::Int32(Some(0))]);

        let p = bind_parameter(1, &ParamSpec::output(SqlType::WVarChar)).unwrap();
        assert_eq!(p.storage.element_size(), (MAX_WIDE_CHARS + 1) * 2);
        assert_eq!(p.column_size, MAX_WIDE_CHARS);

        let p = bind_parameter(1, &ParamSpec::output(SqlType::VarBinary)).unwrap();
        assert_eq!(p.storage.element_size(), MAX_NARROW_BYTES);

        let p = bind_parameter(
            1,
            &ParamSpec::typed("ab", SqlType::WVarChar)
                .with_direction(ParamDirection::InputOutput)
                .with_precision(20, 0),
        )
        .unwrap();
        assert_eq!(p.storage.element_size(), 21 * 2);
        assert_eq!(p.values().unwrap(), vec![Value::Varchar(Some("ab".into()))]);

        let error = bind_parameter(
            1,
            &ParamSpec::new(HostValue::Null).with_direction(ParamDirection::Output),
        )
        .unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);
    }

    #[test]
    fn rejected_values() {
        for value in [HostValue::Number(f64::NAN), HostValue::Number(f64::INFINITY)] {
            let error = bind_parameter(2, &ParamSpec::new(value)).unwrap_err();
            assert_eq!(failure_kind(&error), FailureKind::Marshal);
        }
        let error = bind_parameter(1, &ParamSpec::typed("abc", SqlType::Integer)).unwrap_err();
        assert!(format!("{error:#}").contains("parameter 1"));
        let error =
            bind_parameter(1, &ParamSpec::typed(HostValue::Integer(1 << 40), SqlType::Integer))
                .unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);
        let error = bind_parameter(
            1,
            &ParamSpec::typed(HostValue::Array(vec![1.into(), "x".into()]), SqlType::Integer),
        )
        .unwrap_err();
        assert!(format!("{error:#}").contains("element 1"), "{error:#}");
    }
}
