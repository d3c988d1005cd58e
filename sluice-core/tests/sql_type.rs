#[cfg(test)]
mod tests {
    use sluice_core::SqlType;

    #[test]
    fn sql_type_codes() {
        assert_eq!(SqlType::from_code(4), SqlType::Integer);
        assert_eq!(SqlType::from_code(-9), SqlType::WVarChar);
        assert_eq!(SqlType::from_code(-155), SqlType::DateTimeOffset);
        assert_eq!(SqlType::from_code(92), SqlType::Time);
        assert_eq!(SqlType::from_code(-154), SqlType::Time);
        assert_eq!(SqlType::from_code(11), SqlType::Timestamp);
        assert_eq!(SqlType::from_code(1234), SqlType::Unknown(1234));
        assert_eq!(SqlType::Time.code(), -154);
        assert_eq!(SqlType::Unknown(1234).code(), 1234);
        for code in [-11, -10, -9, -8, -7, -6, -5, -4, -3, -2, -1, 1, 2, 3, 4, 5, 6, 7, 8, 12, 91] {
            assert_eq!(SqlType::from_code(code).code(), code);
        }
    }

    #[test]
    fn sql_type_names() {
        assert_eq!(SqlType::from_name("NVARCHAR"), Some(SqlType::WVarChar));
        assert_eq!(SqlType::from_name(" int "), Some(SqlType::Integer));
        assert_eq!(SqlType::from_name("datetime2"), Some(SqlType::Timestamp));
        assert_eq!(SqlType::from_name("uniqueidentifier"), Some(SqlType::Guid));
        assert_eq!(SqlType::from_name("tvp"), Some(SqlType::Table));
        assert_eq!(SqlType::from_name("geography"), None);
        assert_eq!(SqlType::WVarChar.to_string(), "nvarchar");
        assert_eq!(SqlType::Unknown(-370).to_string(), "unknown(-370)");
    }

    #[test]
    fn sql_type_classes() {
        assert!(SqlType::TinyInt.is_integral());
        assert!(!SqlType::Decimal.is_integral());
        assert!(SqlType::Decimal.is_exact_numeric());
        assert!(SqlType::Real.is_floating());
        assert!(SqlType::LongVarChar.is_narrow_string());
        assert!(SqlType::Xml.is_wide_string());
        assert!(SqlType::WChar.is_string());
        assert!(SqlType::Udt.is_binary());
        assert!(SqlType::DateTimeOffset.is_temporal());
        assert!(SqlType::Variant.is_ambiguous());
        assert!(SqlType::Unknown(77).is_ambiguous());
        assert!(!SqlType::Guid.is_ambiguous());
    }
}
