use std::fmt::{self, Display};

/// SQL data types understood by the engine.
///
/// Each variant maps to an ODBC (or SQL Server driver specific) type code.
/// [`SqlType::from_code`] is total: codes the engine does not know map to
/// [`SqlType::Unknown`] and are decoded with the variant fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Numeric,
    Decimal,
    Char,
    VarChar,
    LongVarChar,
    WChar,
    WVarChar,
    WLongVarChar,
    Binary,
    VarBinary,
    LongVarBinary,
    Date,
    Time,
    DateTime,
    Timestamp,
    DateTimeOffset,
    Guid,
    Xml,
    Variant,
    Udt,
    Table,
    Unknown(i16),
}

impl SqlType {
    pub const fn from_code(code: i16) -> SqlType {
        match code {
            -7 => SqlType::Bit,
            -6 => SqlType::TinyInt,
            5 => SqlType::SmallInt,
            4 => SqlType::Integer,
            -5 => SqlType::BigInt,
            7 => SqlType::Real,
            6 => SqlType::Float,
            8 => SqlType::Double,
            2 => SqlType::Numeric,
            3 => SqlType::Decimal,
            1 => SqlType::Char,
            12 => SqlType::VarChar,
            -1 => SqlType::LongVarChar,
            -8 => SqlType::WChar,
            -9 => SqlType::WVarChar,
            -10 => SqlType::WLongVarChar,
            -2 => SqlType::Binary,
            -3 => SqlType::VarBinary,
            -4 => SqlType::LongVarBinary,
            91 => SqlType::Date,
            92 | -154 => SqlType::Time,
            9 => SqlType::DateTime,
            93 | 11 => SqlType::Timestamp,
            -155 => SqlType::DateTimeOffset,
            -11 => SqlType::Guid,
            -152 => SqlType::Xml,
            -150 => SqlType::Variant,
            -151 => SqlType::Udt,
            -153 => SqlType::Table,
            v => SqlType::Unknown(v),
        }
    }

    /// The code passed to the driver when binding a parameter of this type.
    pub const fn code(&self) -> i16 {
        match self {
            SqlType::Bit => -7,
            SqlType::TinyInt => -6,
            SqlType::SmallInt => 5,
            SqlType::Integer => 4,
            SqlType::BigInt => -5,
            SqlType::Real => 7,
            SqlType::Float => 6,
            SqlType::Double => 8,
            SqlType::Numeric => 2,
            SqlType::Decimal => 3,
            SqlType::Char => 1,
            SqlType::VarChar => 12,
            SqlType::LongVarChar => -1,
            SqlType::WChar => -8,
            SqlType::WVarChar => -9,
            SqlType::WLongVarChar => -10,
            SqlType::Binary => -2,
            SqlType::VarBinary => -3,
            SqlType::LongVarBinary => -4,
            SqlType::Date => 91,
            SqlType::Time => -154,
            SqlType::DateTime => 93,
            SqlType::Timestamp => 93,
            SqlType::DateTimeOffset => -155,
            SqlType::Guid => -11,
            SqlType::Xml => -152,
            SqlType::Variant => -150,
            SqlType::Udt => -151,
            SqlType::Table => -153,
            SqlType::Unknown(v) => *v,
        }
    }

    /// Parse the type names accepted in parameter descriptors (case insensitive).
    pub fn from_name(name: &str) -> Option<SqlType> {
        let name = name.trim().to_ascii_lowercase();
        Some(match name.as_str() {
            "bit" | "boolean" => SqlType::Bit,
            "tinyint" => SqlType::TinyInt,
            "smallint" => SqlType::SmallInt,
            "int" | "integer" => SqlType::Integer,
            "bigint" => SqlType::BigInt,
            "real" => SqlType::Real,
            "float" => SqlType::Float,
            "double" => SqlType::Double,
            "numeric" => SqlType::Numeric,
            "decimal" | "money" | "smallmoney" => SqlType::Decimal,
            "char" => SqlType::Char,
            "varchar" => SqlType::VarChar,
            "text" => SqlType::LongVarChar,
            "nchar" => SqlType::WChar,
            "nvarchar" => SqlType::WVarChar,
            "ntext" => SqlType::WLongVarChar,
            "binary" => SqlType::Binary,
            "varbinary" => SqlType::VarBinary,
            "image" => SqlType::LongVarBinary,
            "date" => SqlType::Date,
            "time" => SqlType::Time,
            "datetime" | "smalldatetime" => SqlType::DateTime,
            "datetime2" | "timestamp" => SqlType::Timestamp,
            "datetimeoffset" => SqlType::DateTimeOffset,
            "uniqueidentifier" | "guid" => SqlType::Guid,
            "xml" => SqlType::Xml,
            "sql_variant" | "variant" => SqlType::Variant,
            "udt" => SqlType::Udt,
            "table" | "tvp" => SqlType::Table,
            _ => return None,
        })
    }

    pub const fn is_integral(&self) -> bool {
        matches!(
            self,
            SqlType::Bit
                | SqlType::TinyInt
                | SqlType::SmallInt
                | SqlType::Integer
                | SqlType::BigInt
        )
    }

    pub const fn is_floating(&self) -> bool {
        matches!(self, SqlType::Real | SqlType::Float | SqlType::Double)
    }

    pub const fn is_exact_numeric(&self) -> bool {
        matches!(self, SqlType::Numeric | SqlType::Decimal)
    }

    pub const fn is_narrow_string(&self) -> bool {
        matches!(
            self,
            SqlType::Char | SqlType::VarChar | SqlType::LongVarChar
        )
    }

    pub const fn is_wide_string(&self) -> bool {
        matches!(
            self,
            SqlType::WChar | SqlType::WVarChar | SqlType::WLongVarChar | SqlType::Xml
        )
    }

    pub const fn is_string(&self) -> bool {
        self.is_narrow_string() || self.is_wide_string()
    }

    pub const fn is_binary(&self) -> bool {
        matches!(
            self,
            SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary | SqlType::Udt
        )
    }

    pub const fn is_temporal(&self) -> bool {
        matches!(
            self,
            SqlType::Date
                | SqlType::Time
                | SqlType::DateTime
                | SqlType::Timestamp
                | SqlType::DateTimeOffset
        )
    }

    /// Types without a fixed decoding: the value is probed through the fallback chain.
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, SqlType::Variant | SqlType::Unknown(..))
    }
}

impl Default for SqlType {
    fn default() -> Self {
        SqlType::Unknown(0)
    }
}

impl Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Bit => f.write_str("bit"),
            SqlType::TinyInt => f.write_str("tinyint"),
            SqlType::SmallInt => f.write_str("smallint"),
            SqlType::Integer => f.write_str("int"),
            SqlType::BigInt => f.write_str("bigint"),
            SqlType::Real => f.write_str("real"),
            SqlType::Float => f.write_str("float"),
            SqlType::Double => f.write_str("double"),
            SqlType::Numeric => f.write_str("numeric"),
            SqlType::Decimal => f.write_str("decimal"),
            SqlType::Char => f.write_str("char"),
            SqlType::VarChar => f.write_str("varchar"),
            SqlType::LongVarChar => f.write_str("text"),
            SqlType::WChar => f.write_str("nchar"),
            SqlType::WVarChar => f.write_str("nvarchar"),
            SqlType::WLongVarChar => f.write_str("ntext"),
            SqlType::Binary => f.write_str("binary"),
            SqlType::VarBinary => f.write_str("varbinary"),
            SqlType::LongVarBinary => f.write_str("image"),
            SqlType::Date => f.write_str("date"),
            SqlType::Time => f.write_str("time"),
            SqlType::DateTime => f.write_str("datetime"),
            SqlType::Timestamp => f.write_str("datetime2"),
            SqlType::DateTimeOffset => f.write_str("datetimeoffset"),
            SqlType::Guid => f.write_str("uniqueidentifier"),
            SqlType::Xml => f.write_str("xml"),
            SqlType::Variant => f.write_str("sql_variant"),
            SqlType::Udt => f.write_str("udt"),
            SqlType::Table => f.write_str("table"),
            SqlType::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}
