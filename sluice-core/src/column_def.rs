use crate::{SqlType, native::Nullability};

/// Shape of a result column as reported by describe.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: SqlType,
    pub size: usize,
    pub decimal_digits: i16,
    pub nullable: bool,
    /// Driver specific type name, empty when the driver does not report it.
    pub type_name: String,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size: usize, decimal_digits: i16) -> Self {
        self.size = size;
        self.decimal_digits = decimal_digits;
        self
    }

    pub(crate) fn nullable_from(nullability: Nullability) -> bool {
        nullability != Nullability::NoNulls
    }

    pub fn with_nullability(mut self, nullability: Nullability) -> Self {
        self.nullable = Self::nullable_from(nullability);
        self
    }
}
