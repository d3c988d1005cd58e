#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use sluice_core::{AsValue, HostValue, SqlType, Value};
    use std::str::FromStr;
    use time::macros::{date, datetime, time};
    use uuid::Uuid;

    #[test]
    fn value_null() {
        assert_eq!(Value::Null, Value::Null);
        assert!(Value::Null.is_null());
        assert!(Value::Int32(None).is_null());
        assert!(!Value::Int32(Some(0)).is_null());
        assert_ne!(Value::Int32(None), Value::Int64(None));
        assert!(Value::Int32(None).same_type(&Value::Int32(Some(5))));
        assert!(!Value::Decimal(None, 10, 2).same_type(&Value::Decimal(None, 10, 3)));
    }

    #[test]
    fn value_bool() {
        let val: Value = true.into();
        assert_eq!(val, Value::Boolean(Some(true)));
        assert_ne!(val, Value::Boolean(None));
        assert_eq!(bool::try_from_value(val).unwrap(), true);
        assert_eq!(bool::try_from_value(Value::Int32(Some(0))).unwrap(), false);
        assert_eq!(bool::try_from_value(Value::Int16(Some(7))).unwrap(), true);
        assert!(bool::try_from_value(Value::Varchar(Some("true".into()))).is_err());
    }

    #[test]
    fn value_integers() {
        assert_eq!(Value::from(i32::MAX), Value::Int32(Some(i32::MAX)));
        assert_eq!(Value::from(i32::MIN), Value::Int32(Some(i32::MIN)));
        assert_eq!(Value::from(u32::MAX), Value::UInt32(Some(u32::MAX)));
        assert_eq!(Value::from(i64::MIN), Value::Int64(Some(i64::MIN)));
        assert_eq!(i64::try_from_value(Value::Int16(Some(-3))).unwrap(), -3);
        assert_eq!(i32::try_from_value(Value::Int64(Some(77))).unwrap(), 77);
        assert!(i32::try_from_value(Value::Int64(Some(i32::MAX as i64 + 1))).is_err());
        assert!(u32::try_from_value(Value::Int32(Some(-1))).is_err());
        assert_eq!(
            i64::try_from_value(Value::Decimal(Some(Decimal::from(42)), 38, 0)).unwrap(),
            42
        );
        assert!(i64::try_from_value(Value::Float64(Some(0.5))).is_err());
    }

    #[test]
    fn value_float_and_decimal() {
        assert_eq!(f64::try_from_value(Value::Int32(Some(3))).unwrap(), 3.0);
        assert_eq!(f64::try_from_value(Value::Float64(Some(-0.25))).unwrap(), -0.25);
        let decimal = Decimal::from_str("12345.678").unwrap();
        let val = decimal.as_value();
        assert_eq!(val, Value::Decimal(Some(decimal), 38, 3));
        assert_eq!(Decimal::try_from_value(val).unwrap(), decimal);
        assert_eq!(
            Decimal::try_from_value(Value::Int64(Some(-9))).unwrap(),
            Decimal::from(-9)
        );
    }

    #[test]
    fn value_text_and_blob() {
        let val: Value = "hello".into();
        assert_eq!(val, Value::Varchar(Some("hello".into())));
        assert_eq!(val.as_str(), Some("hello"));
        assert_eq!(String::try_from_value(val).unwrap(), "hello");
        let val = Value::from(vec![0xDEu8, 0xAD]);
        assert_eq!(val, Value::Blob(Some([0xDE, 0xAD].into())));
        assert_eq!(val.to_string(), "0xDEAD");
        assert_eq!(Vec::<u8>::try_from_value(val).unwrap(), vec![0xDE, 0xAD]);
        assert_eq!(Value::from("it's").to_string(), "'it''s'");
        assert_eq!(Value::Varchar(None).to_string(), "NULL");
    }

    #[test]
    fn value_option() {
        assert_eq!(Option::<i32>::None.as_value(), Value::Int32(None));
        assert_eq!(Some(5i32).as_value(), Value::Int32(Some(5)));
        assert_eq!(Option::<String>::try_from_value(Value::Varchar(None)).unwrap(), None);
        assert_eq!(Option::<i64>::try_from_value(Value::Null).unwrap(), None);
    }

    #[test]
    fn value_sql_type() {
        assert_eq!(Value::Int32(None).sql_type(), SqlType::Integer);
        assert_eq!(Value::UInt32(Some(1)).sql_type(), SqlType::BigInt);
        assert_eq!(Value::Varchar(None).sql_type(), SqlType::WVarChar);
        assert_eq!(Value::null_of(SqlType::VarChar), Value::Varchar(None));
        assert_eq!(Value::null_of(SqlType::SmallInt), Value::Int16(None));
        assert_eq!(Value::null_of(SqlType::Xml), Value::Varchar(None));
        assert_eq!(Value::null_of(SqlType::Variant), Value::Null);
    }

    #[test]
    fn host_from_value() {
        assert_eq!(HostValue::from(Value::Int32(Some(7))), HostValue::Integer(7));
        assert_eq!(HostValue::from(Value::Int64(None)), HostValue::Null);
        assert_eq!(HostValue::from(Value::Float64(Some(1.5))), HostValue::Number(1.5));
        assert_eq!(
            HostValue::from(Value::Decimal(Some(Decimal::from_str("2.5").unwrap()), 10, 1)),
            HostValue::Number(2.5)
        );
        assert_eq!(
            HostValue::from(Value::Blob(Some([].into()))),
            HostValue::Buffer(vec![])
        );
        assert_eq!(
            HostValue::from(Value::Date(Some(date!(1970 - 01 - 02)))),
            HostValue::Date(86_400_000.0)
        );
        assert_eq!(
            HostValue::from(Value::Time(Some(time!(01:00:00.5)))),
            HostValue::Date(3_600_500.0)
        );
        assert_eq!(
            HostValue::from(Value::Timestamp(Some(datetime!(2001-09-09 01:46:40)))),
            HostValue::Date(1_000_000_000_000.0)
        );
        assert_eq!(
            HostValue::from(Value::TimestampWithTimezone(Some(
                datetime!(2001-09-09 03:46:40 +02:00)
            ))),
            HostValue::Date(1_000_000_000_000.0)
        );
        let uuid = Uuid::from_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();
        assert_eq!(
            HostValue::from(Value::Uuid(Some(uuid))),
            HostValue::String("6BA7B810-9DAD-11D1-80B4-00C04FD430C8".into())
        );
    }

    #[test]
    fn host_epoch_millis() {
        let instant = HostValue::epoch_millis_to_date_time(1_000_000_000_123.0).unwrap();
        assert_eq!(instant, datetime!(2001-09-09 01:46:40.123 UTC));
        assert!(HostValue::epoch_millis_to_date_time(f64::NAN).is_none());
        assert!(HostValue::epoch_millis_to_date_time(f64::INFINITY).is_none());
        assert!(HostValue::epoch_millis_to_date_time(1e33).is_none());
        assert!(HostValue::epoch_millis_to_date_time(f64::MIN).is_none());
    }
}
