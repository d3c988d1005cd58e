use rust_decimal::Decimal;
use sluice_core::native::{MAX_NUMERIC_LEN, SqlNumeric};
use std::str::FromStr;

/// Maximum precision of a numeric parameter.
pub const MAX_PRECISION: u8 = 38;

pub fn decimal_to_native(value: &Decimal, precision: u8) -> SqlNumeric {
    let magnitude = value.mantissa().unsigned_abs();
    let mut val = [0u8; MAX_NUMERIC_LEN];
    val.copy_from_slice(&magnitude.to_le_bytes());
    SqlNumeric {
        precision,
        scale: value.scale() as i8,
        sign: if value.is_sign_negative() { 0 } else { 1 },
        val,
    }
}

pub fn decimal_from_native(value: &SqlNumeric) -> Option<Decimal> {
    let magnitude = u128::from_le_bytes(value.val);
    let mantissa = i128::try_from(magnitude).ok()?;
    let mantissa = if value.sign == 0 { -mantissa } else { mantissa };
    let scale = u32::try_from(value.scale).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale).ok()
}

/// Parse the textual form drivers return for numeric columns.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    let text = match (text.strip_prefix('-'), text.starts_with('.')) {
        (Some(rest), _) if rest.starts_with('.') => format!("-0{rest}"),
        (_, true) => format!("0{text}"),
        _ => text.to_string(),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Count of significant digits, at least the scale plus one.
pub fn precision_of(value: &Decimal) -> u8 {
    let digits = value.mantissa().unsigned_abs().checked_ilog10().map_or(1, |v| v + 1);
    digits.max(value.scale() + 1).min(MAX_PRECISION as u32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_round_trip() {
        for text in ["0", "1", "-1", "123.456", "-0.0001", "79228162514264337593543950335"] {
            let value = Decimal::from_str(text).unwrap();
            let native = decimal_to_native(&value, 38);
            assert_eq!(decimal_from_native(&native).unwrap(), value);
        }
    }

    #[test]
    fn numeric_native_layout() {
        let native = decimal_to_native(&Decimal::from_str("-2.56").unwrap(), 10);
        assert_eq!(native.sign, 0);
        assert_eq!(native.scale, 2);
        assert_eq!(native.precision, 10);
        assert_eq!(&native.val[..3], &[0x00, 0x01, 0x00]);
    }

    #[test]
    fn numeric_text() {
        assert_eq!(parse_decimal(" 12.50 "), Some(Decimal::from_str("12.50").unwrap()));
        assert_eq!(parse_decimal("-.5"), Some(Decimal::from_str("-0.5").unwrap()));
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(precision_of(&Decimal::from_str("123.45").unwrap()), 5);
        assert_eq!(precision_of(&Decimal::from_str("0.001").unwrap()), 4);
        assert_eq!(precision_of(&Decimal::ZERO), 1);
    }
}
