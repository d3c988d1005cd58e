use sluice_core::{
    Error, Result,
    native::{SqlDate, SqlTime2, SqlTimestamp, SqlTimestampOffset},
};
use std::fmt::Display;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

fn nanos(fraction: u32) -> u32 {
    // Only microsecond precision survives
    fraction / 1_000 * 1_000
}

/// Native field narrowed to the width `time` expects.
fn field<T, S>(name: &str, value: S) -> Result<T>
where
    T: TryFrom<S>,
    S: Copy + Display,
{
    T::try_from(value).map_err(|_| Error::msg(format!("The {name} {value} is out of range")))
}

pub fn date_from_native(value: &SqlDate) -> Result<Date> {
    let month = Month::try_from(field::<u8, _>("month", value.month)?)?;
    Ok(Date::from_calendar_date(
        value.year as i32,
        month,
        field("day", value.day)?,
    )?)
}

pub fn time_from_native(hour: u16, minute: u16, second: u16, fraction: u32) -> Result<Time> {
    Ok(Time::from_hms_nano(
        field("hour", hour)?,
        field("minute", minute)?,
        field("second", second)?,
        nanos(fraction),
    )?)
}

pub fn time2_from_native(value: &SqlTime2) -> Result<Time> {
    time_from_native(value.hour, value.minute, value.second, value.fraction)
}

pub fn timestamp_from_native(value: &SqlTimestamp) -> Result<PrimitiveDateTime> {
    let date = date_from_native(&SqlDate {
        year: value.year,
        month: value.month,
        day: value.day,
    })?;
    let time = time_from_native(value.hour, value.minute, value.second, value.fraction)?;
    Ok(PrimitiveDateTime::new(date, time))
}

pub fn timestamp_offset_from_native(value: &SqlTimestampOffset) -> Result<OffsetDateTime> {
    let local = timestamp_from_native(&SqlTimestamp {
        year: value.year,
        month: value.month,
        day: value.day,
        hour: value.hour,
        minute: value.minute,
        second: value.second,
        fraction: value.fraction,
    })?;
    let offset = UtcOffset::from_hms(
        field("timezone hour", value.timezone_hour)?,
        field("timezone minute", value.timezone_minute)?,
        0,
    )?;
    Ok(local.assume_offset(offset))
}

pub fn date_to_native(value: Date) -> SqlDate {
    SqlDate {
        year: value.year() as i16,
        month: value.month() as u16,
        day: value.day() as u16,
    }
}

pub fn time_to_native(value: Time) -> SqlTime2 {
    SqlTime2 {
        hour: value.hour() as u16,
        minute: value.minute() as u16,
        second: value.second() as u16,
        fraction: nanos(value.nanosecond()),
    }
}

pub fn timestamp_to_native(value: PrimitiveDateTime) -> SqlTimestamp {
    SqlTimestamp {
        year: value.year() as i16,
        month: value.month() as u16,
        day: value.day() as u16,
        hour: value.hour() as u16,
        minute: value.minute() as u16,
        second: value.second() as u16,
        fraction: nanos(value.nanosecond()),
    }
}

pub fn timestamp_offset_to_native(value: OffsetDateTime) -> SqlTimestampOffset {
    let (timezone_hour, timezone_minute, _) = value.offset().as_hms();
    SqlTimestampOffset {
        year: value.year() as i16,
        month: value.month() as u16,
        day: value.day() as u16,
        hour: value.hour() as u16,
        minute: value.minute() as u16,
        second: value.second() as u16,
        fraction: nanos(value.nanosecond()),
        timezone_hour: timezone_hour as i16,
        timezone_minute: timezone_minute as i16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn temporal_round_trip() {
        let d = date!(2024 - 02 - 29);
        assert_eq!(date_from_native(&date_to_native(d)).unwrap(), d);
        let t = time!(23:59:59.123456);
        assert_eq!(time2_from_native(&time_to_native(t)).unwrap(), t);
        let ts = datetime!(1999-12-31 12:30:00.5);
        assert_eq!(timestamp_from_native(&timestamp_to_native(ts)).unwrap(), ts);
        let tz = datetime!(2020-06-01 08:00:00 -05:30);
        let native = timestamp_offset_to_native(tz);
        assert_eq!(native.timezone_hour, -5);
        assert_eq!(native.timezone_minute, -30);
        assert_eq!(timestamp_offset_from_native(&native).unwrap(), tz);
    }

    #[test]
    fn sub_microsecond_fraction_is_discarded() {
        let native = SqlTime2 {
            hour: 1,
            minute: 2,
            second: 3,
            fraction: 123_456_789,
        };
        assert_eq!(time2_from_native(&native).unwrap(), time!(01:02:03.123456));
    }

    #[test]
    fn invalid_fields() {
        assert!(date_from_native(&SqlDate { year: 2023, month: 13, day: 1 }).is_err());
        assert!(date_from_native(&SqlDate { year: 2023, month: 2, day: 29 }).is_err());
        assert!(time_from_native(24, 0, 0, 0).is_err());
    }

    #[test]
    fn wide_fields_do_not_wrap() {
        // 257 and 256 would wrap to valid values once truncated to a byte
        assert!(date_from_native(&SqlDate { year: 2023, month: 257, day: 1 }).is_err());
        assert!(date_from_native(&SqlDate { year: 2023, month: 1, day: 257 }).is_err());
        assert!(time_from_native(256, 0, 0, 0).is_err());
        assert!(time_from_native(0, 0, 256, 0).is_err());
        let native = SqlTimestampOffset {
            year: 2020,
            month: 6,
            day: 1,
            hour: 8,
            minute: 0,
            second: 0,
            fraction: 0,
            timezone_hour: 256,
            timezone_minute: 0,
        };
        assert!(timestamp_offset_from_native(&native).is_err());
    }
}
