//! Text conversions between the driver encodings and Rust strings.
//!
//! Narrow columns arrive as UTF-8 bytes and wide columns as UTF-16 code units. Both are
//! decoded by hand so that an invalid sequence reports the exact offset instead of being
//! replaced.

use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextError {
    /// Unexpected byte or code unit at the offset.
    Invalid(usize),
    /// The input ends in the middle of a sequence starting at the offset.
    Incomplete(usize),
}

impl Display for TextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextError::Invalid(at) => write!(f, "invalid sequence at offset {at}"),
            TextError::Incomplete(at) => write!(f, "incomplete sequence at offset {at}"),
        }
    }
}

impl std::error::Error for TextError {}

pub fn encode_utf16(value: &str) -> Vec<u16> {
    value.encode_utf16().collect()
}

/// Decode UTF-16 code units, pairing surrogates.
pub fn decode_utf16(input: &[u16]) -> Result<String, TextError> {
    let mut result = String::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let unit = input[i];
        let c = match unit {
            0xD800..=0xDBFF => {
                let Some(&low) = input.get(i + 1) else {
                    return Err(TextError::Incomplete(i));
                };
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(TextError::Invalid(i + 1));
                }
                let code = 0x10000 + (((unit as u32) - 0xD800) << 10) + ((low as u32) - 0xDC00);
                i += 1;
                code
            }
            0xDC00..=0xDFFF => return Err(TextError::Invalid(i)),
            v => v as u32,
        };
        result.push(char::from_u32(c).ok_or(TextError::Invalid(i))?);
        i += 1;
    }
    Ok(result)
}

/// Decode UTF-8 bytes, validating lead and continuation bytes.
pub fn decode_utf8(input: &[u8]) -> Result<String, TextError> {
    let mut result = String::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let lead = input[i];
        let (len, init) = match lead {
            0x00..=0x7F => (1, lead as u32),
            0xC2..=0xDF => (2, (lead & 0x1F) as u32),
            0xE0..=0xEF => (3, (lead & 0x0F) as u32),
            0xF0..=0xF4 => (4, (lead & 0x07) as u32),
            _ => return Err(TextError::Invalid(i)),
        };
        if i + len > input.len() {
            return Err(TextError::Incomplete(i));
        }
        let mut code = init;
        for offset in 1..len {
            let byte = input[i + offset];
            if byte & 0xC0 != 0x80 {
                return Err(TextError::Invalid(i + offset));
            }
            code = (code << 6) | (byte & 0x3F) as u32;
        }
        let overlong = match len {
            3 => code < 0x800,
            4 => code < 0x10000,
            _ => false,
        };
        if overlong {
            return Err(TextError::Invalid(i));
        }
        result.push(char::from_u32(code).ok_or(TextError::Invalid(i))?);
        i += len;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_round_trip() {
        for text in ["", "plain", "àèìòù", "日本語", "emoji 🦀 crab", "\u{10FFFF}"] {
            assert_eq!(decode_utf16(&encode_utf16(text)).unwrap(), text);
        }
    }

    #[test]
    fn utf16_surrogates() {
        assert_eq!(decode_utf16(&[0xD83E, 0xDD80]).unwrap(), "🦀");
        assert_eq!(decode_utf16(&[0x41, 0xD83E]), Err(TextError::Incomplete(1)));
        assert_eq!(decode_utf16(&[0xD83E, 0x41]), Err(TextError::Invalid(1)));
        assert_eq!(decode_utf16(&[0xDD80]), Err(TextError::Invalid(0)));
    }

    #[test]
    fn utf8_validation() {
        for text in ["", "ascii", "ß", "€uro", "🦀"] {
            assert_eq!(decode_utf8(text.as_bytes()).unwrap(), text);
        }
        assert_eq!(decode_utf8(&[0x61, 0xE2, 0x82]), Err(TextError::Incomplete(1)));
        assert_eq!(decode_utf8(&[0xE2, 0x41, 0xAC]), Err(TextError::Invalid(1)));
        assert_eq!(decode_utf8(&[0x80]), Err(TextError::Invalid(0)));
        assert_eq!(decode_utf8(&[0xC0, 0x80]), Err(TextError::Invalid(0)));
        assert_eq!(decode_utf8(&[0xE0, 0x80, 0x80]), Err(TextError::Invalid(0)));
        assert_eq!(decode_utf8(&[0xED, 0xA0, 0x80]), Err(TextError::Invalid(0)));
    }
}
