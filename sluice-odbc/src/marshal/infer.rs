use sluice_core::{Failure, HostValue, Result, SqlType};

/// Shape of a parameter decided from the host value alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Null,
    Boolean,
    Int32,
    UInt32,
    Int64,
    Double,
    String,
    Date,
    Buffer,
    Table,
}

impl HostKind {
    /// The SQL type a value of this kind binds to when no type is given.
    pub fn default_sql_type(&self) -> SqlType {
        match self {
            HostKind::Null => SqlType::VarChar,
            HostKind::Boolean => SqlType::Bit,
            HostKind::Int32 => SqlType::Integer,
            HostKind::UInt32 | HostKind::Int64 => SqlType::BigInt,
            HostKind::Double => SqlType::Double,
            HostKind::String => SqlType::WVarChar,
            HostKind::Date => SqlType::DateTimeOffset,
            HostKind::Buffer => SqlType::VarBinary,
            HostKind::Table => SqlType::Table,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self,
            HostKind::Int32 | HostKind::UInt32 | HostKind::Int64 | HostKind::Double
        )
    }
}

/// 2^63, the first float not representable as `i64`.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Narrowest numeric kind holding the value, `None` for NaN and infinities.
pub fn classify_number(value: &HostValue) -> Option<HostKind> {
    match *value {
        HostValue::Integer(v) => Some(if i32::try_from(v).is_ok() {
            HostKind::Int32
        } else if u32::try_from(v).is_ok() {
            HostKind::UInt32
        } else {
            HostKind::Int64
        }),
        HostValue::Number(v) if !v.is_finite() => None,
        HostValue::Number(v) if v.fract() != 0.0 => Some(HostKind::Double),
        HostValue::Number(v) => Some(if v >= i32::MIN as f64 && v <= i32::MAX as f64 {
            HostKind::Int32
        } else if v >= 0.0 && v <= u32::MAX as f64 {
            HostKind::UInt32
        } else if v >= -I64_LIMIT && v < I64_LIMIT {
            HostKind::Int64
        } else {
            HostKind::Double
        }),
        _ => None,
    }
}

/// Kind of a single value.
///
/// Precedence: null, array, named object, string, boolean, number, date, buffer.
pub fn infer_scalar(index: usize, value: &HostValue) -> Result<HostKind> {
    Ok(match value {
        HostValue::Null => HostKind::Null,
        HostValue::Array(items) => return infer_array(index, items),
        HostValue::Object(..) => HostKind::Table,
        HostValue::String(..) => HostKind::String,
        HostValue::Boolean(..) => HostKind::Boolean,
        HostValue::Integer(..) | HostValue::Number(..) => classify_number(value).ok_or_else(
            || Failure::bind(index, format!("{} is not a finite number", host_number(value))),
        )?,
        HostValue::Date(..) => HostKind::Date,
        HostValue::Buffer(..) => HostKind::Buffer,
    })
}

/// Element kind of an array parameter, decided by one scan.
///
/// Booleans win over strings, strings over dates, dates over buffers and buffers over
/// numbers. Numbers widen to the narrowest kind holding every element: 64-bit integers
/// when some element exceeds int32, double as soon as one element is fractional. Every
/// element must then agree with the chosen kind or be null.
pub fn infer_array(index: usize, items: &[HostValue]) -> Result<HostKind> {
    let mut boolean = false;
    let mut string = false;
    let mut date = false;
    let mut buffer = false;
    let mut number: Option<HostKind> = None;
    for (i, item) in items.iter().enumerate() {
        match item {
            HostValue::Null => {}
            HostValue::Boolean(..) => boolean = true,
            HostValue::String(..) => string = true,
            HostValue::Date(..) => date = true,
            HostValue::Buffer(..) => buffer = true,
            HostValue::Integer(..) | HostValue::Number(..) => {
                let Some(kind) = classify_number(item) else {
                    return Err(Failure::bind(
                        index,
                        format!("element {i} ({}) is not a finite number", host_number(item)),
                    )
                    .into());
                };
                number = Some(widen(number, kind));
            }
            HostValue::Array(..) | HostValue::Object(..) => {
                return Err(Failure::bind(
                    index,
                    format!("element {i} is a nested {}", item.kind()),
                )
                .into());
            }
        }
    }
    let kind = if boolean {
        HostKind::Boolean
    } else if string {
        HostKind::String
    } else if date {
        HostKind::Date
    } else if buffer {
        HostKind::Buffer
    } else if let Some(number) = number {
        number
    } else {
        HostKind::Null
    };
    if let Some((i, item)) = items
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_null() && !agrees(kind, v))
    {
        return Err(Failure::bind(
            index,
            format!(
                "element {i} is a {} but the array holds {} values",
                item.kind(),
                kind_name(kind)
            ),
        )
        .into());
    }
    Ok(kind)
}

fn widen(current: Option<HostKind>, next: HostKind) -> HostKind {
    let next = match next {
        HostKind::UInt32 => HostKind::Int64,
        v => v,
    };
    let Some(current) = current else {
        return next;
    };
    match (current, next) {
        (HostKind::Double, _) | (_, HostKind::Double) => HostKind::Double,
        (HostKind::Int32, HostKind::Int32) => HostKind::Int32,
        _ => HostKind::Int64,
    }
}

fn agrees(kind: HostKind, value: &HostValue) -> bool {
    match value {
        HostValue::Boolean(..) => kind == HostKind::Boolean,
        HostValue::String(..) => kind == HostKind::String,
        HostValue::Date(..) => kind == HostKind::Date,
        HostValue::Buffer(..) => kind == HostKind::Buffer,
        HostValue::Integer(..) | HostValue::Number(..) => kind.is_numeric(),
        _ => false,
    }
}

fn kind_name(kind: HostKind) -> &'static str {
    match kind {
        HostKind::Null => "null",
        HostKind::Boolean => "boolean",
        HostKind::String => "string",
        HostKind::Date => "date",
        HostKind::Buffer => "buffer",
        HostKind::Table => "object",
        _ => "number",
    }
}

fn host_number(value: &HostValue) -> String {
    match value {
        HostValue::Integer(v) => v.to_string(),
        HostValue::Number(v) => v.to_string(),
        _ => value.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{FailureKind, failure_kind, find_failure};

    #[test]
    fn numbers_widen() {
        assert_eq!(classify_number(&HostValue::Integer(5)), Some(HostKind::Int32));
        assert_eq!(
            classify_number(&HostValue::Integer(i32::MIN as i64)),
            Some(HostKind::Int32)
        );
        assert_eq!(
            classify_number(&HostValue::Integer(i32::MAX as i64 + 1)),
            Some(HostKind::UInt32)
        );
        assert_eq!(
            classify_number(&HostValue::Integer(u32::MAX as i64)),
            Some(HostKind::UInt32)
        );
        assert_eq!(
            classify_number(&HostValue::Integer(u32::MAX as i64 + 1)),
            Some(HostKind::Int64)
        );
        assert_eq!(
            classify_number(&HostValue::Integer(i32::MIN as i64 - 1)),
            Some(HostKind::Int64)
        );
        assert_eq!(classify_number(&HostValue::Number(2.0)), Some(HostKind::Int32));
        assert_eq!(classify_number(&HostValue::Number(2.5)), Some(HostKind::Double));
        assert_eq!(classify_number(&HostValue::Number(1e300)), Some(HostKind::Double));
        assert_eq!(classify_number(&HostValue::Number(f64::NAN)), None);
        assert_eq!(classify_number(&HostValue::Number(f64::NEG_INFINITY)), None);
    }

    #[test]
    fn scalar_precedence() {
        assert_eq!(infer_scalar(1, &HostValue::Null).unwrap(), HostKind::Null);
        assert_eq!(infer_scalar(1, &HostValue::from("a")).unwrap(), HostKind::String);
        assert_eq!(infer_scalar(1, &HostValue::Boolean(true)).unwrap(), HostKind::Boolean);
        assert_eq!(infer_scalar(1, &HostValue::Date(0.0)).unwrap(), HostKind::Date);
        assert_eq!(infer_scalar(1, &HostValue::Buffer(vec![1])).unwrap(), HostKind::Buffer);
        let error = infer_scalar(4, &HostValue::Number(f64::INFINITY)).unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);
    }

    #[test]
    fn array_scan() {
        let ints = vec![1.into(), HostValue::Null, 3.into()];
        assert_eq!(infer_array(1, &ints).unwrap(), HostKind::Int32);
        let wide = vec![1.into(), HostValue::Integer(1 << 40)];
        assert_eq!(infer_array(1, &wide).unwrap(), HostKind::Int64);
        let unsigned = vec![HostValue::Integer(u32::MAX as i64)];
        assert_eq!(infer_array(1, &unsigned).unwrap(), HostKind::Int64);
        let mixed = vec![1.into(), HostValue::Number(0.5)];
        assert_eq!(infer_array(1, &mixed).unwrap(), HostKind::Double);
        let nulls = vec![HostValue::Null, HostValue::Null];
        assert_eq!(infer_array(1, &nulls).unwrap(), HostKind::Null);
        assert_eq!(infer_array(1, &[]).unwrap(), HostKind::Null);
        let strings = vec!["a".into(), HostValue::Null];
        assert_eq!(infer_array(1, &strings).unwrap(), HostKind::String);
    }

    #[test]
    fn array_mismatch_names_the_element() {
        let values = vec!["a".into(), "b".into(), 3.into()];
        let error = infer_array(2, &values).unwrap_err();
        match find_failure(&error) {
            Some(Failure::ParameterBind { index, reason }) => {
                assert_eq!(*index, 2);
                assert!(reason.contains("element 2"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
        let nested = vec![1.into(), HostValue::Array(vec![])];
        let error = infer_array(1, &nested).unwrap_err();
        assert!(format!("{error:#}").contains("element 1 is a nested array"));
        let nan = vec![HostValue::Number(f64::NAN)];
        assert!(infer_array(1, &nan).is_err());
    }
}
