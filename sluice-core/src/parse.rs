use crate::{Error, Result, truncate_long};
use anyhow::Context;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, macros::format_description,
};
use uuid::Uuid;

/// Parsing of the textual forms accepted for typed parameters.
pub trait Parse {
    fn parse(value: impl AsRef<str>) -> Result<Self>
    where
        Self: Sized;
}

impl Parse for Box<[u8]> {
    /// Hex digits, optionally prefixed by `0x`.
    fn parse(value: impl AsRef<str>) -> Result<Self> {
        let value = value.as_ref().trim();
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);
        hex::decode(digits)
            .map(Into::into)
            .map_err(|_| Error::msg(format!("Could not decode blob pattern: `{}`", truncate_long!(value))))
    }
}

impl Parse for Date {
    fn parse(value: impl AsRef<str>) -> Result<Self> {
        let value = value.as_ref().trim();
        Date::parse(value, format_description!("[year]-[month]-[day]"))
            .with_context(|| format!("Cannot parse '{}' as time::Date", value))
    }
}

impl Parse for Time {
    fn parse(value: impl AsRef<str>) -> Result<Self> {
        let value = value.as_ref().trim();
        Time::parse(
            value,
            format_description!("[hour]:[minute]:[second].[subsecond]"),
        )
        .or(Time::parse(
            value,
            format_description!("[hour]:[minute]:[second]"),
        ))
        .or(Time::parse(value, format_description!("[hour]:[minute]")))
        .with_context(|| format!("Cannot parse '{}' as time::Time", value))
    }
}

impl Parse for PrimitiveDateTime {
    /// Date and time separated by `T` or a space.
    fn parse(value: impl AsRef<str>) -> Result<Self> {
        let value = value.as_ref().trim();
        let normalized = value.replacen('T', " ", 1);
        let text = normalized.as_str();
        PrimitiveDateTime::parse(
            text,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        )
        .or(PrimitiveDateTime::parse(
            text,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        ))
        .or(PrimitiveDateTime::parse(
            text,
            format_description!("[year]-[month]-[day] [hour]:[minute]"),
        ))
        .or(Date::parse(text, format_description!("[year]-[month]-[day]")).map(Date::midnight))
        .with_context(|| format!("Cannot parse '{}' as time::PrimitiveDateTime", value))
    }
}

impl Parse for OffsetDateTime {
    /// A date time followed by `Z` or a `+hh:mm` offset, UTC when the offset is missing.
    fn parse(value: impl AsRef<str>) -> Result<Self> {
        let value = value.as_ref().trim();
        let normalized = value.replacen('T', " ", 1);
        let text = normalized.as_str();
        if let Some(local) = text.strip_suffix('Z') {
            return <PrimitiveDateTime as Parse>::parse(local).map(PrimitiveDateTime::assume_utc);
        }
        let parsed = OffsetDateTime::parse(
            text,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]"),
        )
        .or(OffsetDateTime::parse(
            text,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"),
        ))
        .or(OffsetDateTime::parse(
            text,
            format_description!("[year]-[month]-[day] [hour]:[minute][offset_hour sign:mandatory]:[offset_minute]"),
        ));
        if let Ok(parsed) = parsed {
            return Ok(parsed);
        }
        <PrimitiveDateTime as Parse>::parse(text)
            .map(|v| v.assume_offset(UtcOffset::UTC))
            .with_context(|| format!("Cannot parse '{}' as time::OffsetDateTime", value))
    }
}

impl Parse for Uuid {
    fn parse(value: impl AsRef<str>) -> Result<Self> {
        let value = value.as_ref().trim();
        let value = value
            .strip_prefix('{')
            .and_then(|v| v.strip_suffix('}'))
            .unwrap_or(value);
        Uuid::parse_str(value).with_context(|| format!("Cannot parse '{}' as uuid::Uuid", value))
    }
}
