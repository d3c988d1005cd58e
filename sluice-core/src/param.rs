use crate::{Failure, HostValue, Result, SqlType};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamDirection {
    #[default]
    Input,
    Output,
    InputOutput,
}

impl ParamDirection {
    pub fn from_name(name: &str) -> Option<ParamDirection> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "in" | "input" => ParamDirection::Input,
            "out" | "output" => ParamDirection::Output,
            "inout" | "in_out" | "input_output" | "inputoutput" => ParamDirection::InputOutput,
            _ => return None,
        })
    }

    pub fn is_output(&self) -> bool {
        matches!(self, ParamDirection::Output | ParamDirection::InputOutput)
    }
}

/// Column of a table-valued parameter.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TableColumn {
    pub name: String,
    pub sql_type: Option<SqlType>,
    pub precision: Option<usize>,
    pub scale: Option<i16>,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type: Some(sql_type),
            ..Default::default()
        }
    }
}

/// Table-valued parameter: a user defined table type plus its rows.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TableSpec {
    pub type_name: String,
    pub schema: String,
    pub columns: Vec<TableColumn>,
    /// Row major values, every row has one value per column.
    pub rows: Vec<Vec<HostValue>>,
}

impl TableSpec {
    pub fn new(type_name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            schema: schema.into(),
            ..Default::default()
        }
    }

    pub fn with_column(mut self, column: TableColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_row(mut self, row: Vec<HostValue>) -> Self {
        self.rows.push(row);
        self
    }

    /// Values of column `index` across all rows.
    pub fn column_values(&self, index: usize) -> Vec<HostValue> {
        self.rows
            .iter()
            .map(|row| row.get(index).cloned().unwrap_or_default())
            .collect()
    }
}

/// A parameter as supplied by the host.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParamSpec {
    pub value: HostValue,
    /// Explicit target type, inferred from the value when absent.
    pub sql_type: Option<SqlType>,
    pub direction: ParamDirection,
    pub precision: Option<usize>,
    pub scale: Option<i16>,
    pub table: Option<TableSpec>,
}

impl ParamSpec {
    pub fn new(value: impl Into<HostValue>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn typed(value: impl Into<HostValue>, sql_type: SqlType) -> Self {
        Self {
            value: value.into(),
            sql_type: Some(sql_type),
            ..Default::default()
        }
    }

    /// Output parameter without input value.
    pub fn output(sql_type: SqlType) -> Self {
        Self {
            sql_type: Some(sql_type),
            direction: ParamDirection::Output,
            ..Default::default()
        }
    }

    pub fn table(table: TableSpec) -> Self {
        Self {
            sql_type: Some(SqlType::Table),
            table: Some(table),
            ..Default::default()
        }
    }

    pub fn with_direction(mut self, direction: ParamDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_precision(mut self, precision: usize, scale: i16) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Build the parameter at (1 based) `index` from a host value: objects are parsed as
    /// descriptors, every other shape is a plain input value.
    pub fn from_host(index: usize, value: HostValue) -> Result<Self> {
        match value {
            HostValue::Object(map) => Self::from_descriptor(index, map),
            value => Ok(Self::new(value)),
        }
    }

    /// Parse a named descriptor: `value`, `type`, `precision`, `scale`, `direction`,
    /// `type_name`, `schema`, `columns`, `rows`.
    pub fn from_descriptor(index: usize, mut map: BTreeMap<String, HostValue>) -> Result<Self> {
        let mut result = ParamSpec {
            value: map.remove("value").unwrap_or_default(),
            ..Default::default()
        };
        if let Some(v) = map.remove("type") {
            let name = v
                .as_str()
                .ok_or_else(|| Failure::bind(index, "`type` must be a string"))?;
            result.sql_type = Some(
                SqlType::from_name(name)
                    .ok_or_else(|| Failure::bind(index, format!("unknown SQL type `{name}`")))?,
            );
        }
        if let Some(v) = map.remove("direction") {
            let name = v
                .as_str()
                .ok_or_else(|| Failure::bind(index, "`direction` must be a string"))?;
            result.direction = ParamDirection::from_name(name)
                .ok_or_else(|| Failure::bind(index, format!("unknown direction `{name}`")))?;
        }
        result.precision = take_size(&mut map, index, "precision")?;
        result.scale = take_size(&mut map, index, "scale")?.map(|v| v as i16);
        let type_name = map.remove("type_name");
        let is_table = result.sql_type == Some(SqlType::Table)
            || type_name.is_some()
            || map.contains_key("columns");
        if is_table {
            result.sql_type = Some(SqlType::Table);
            result.table = Some(parse_table(index, type_name, &mut map)?);
        }
        if let Some(key) = map.keys().next() {
            log::warn!("Ignoring unknown key `{key}` in the descriptor of parameter {index}");
        }
        Ok(result)
    }
}

impl From<HostValue> for ParamSpec {
    fn from(value: HostValue) -> Self {
        ParamSpec::new(value)
    }
}

fn take_size(
    map: &mut BTreeMap<String, HostValue>,
    index: usize,
    key: &str,
) -> Result<Option<usize>> {
    let Some(v) = map.remove(key) else {
        return Ok(None);
    };
    match v.as_f64() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => Ok(Some(n as usize)),
        _ => Err(Failure::bind(index, format!("`{key}` must be a non negative integer")).into()),
    }
}

fn parse_table(
    index: usize,
    type_name: Option<HostValue>,
    map: &mut BTreeMap<String, HostValue>,
) -> Result<TableSpec> {
    let text = |v: Option<HostValue>, key: &str| -> Result<String> {
        match v {
            None => Ok(String::new()),
            Some(HostValue::String(v)) => Ok(v),
            Some(..) => Err(Failure::bind(index, format!("`{key}` must be a string")).into()),
        }
    };
    let mut table = TableSpec::new(text(type_name, "type_name")?, text(map.remove("schema"), "schema")?);
    if table.type_name.is_empty() {
        return Err(Failure::bind(index, "a table parameter requires `type_name`").into());
    }
    let columns = match map.remove("columns") {
        Some(HostValue::Array(v)) => v,
        None => Vec::new(),
        Some(..) => return Err(Failure::bind(index, "`columns` must be an array").into()),
    };
    for column in columns {
        table.columns.push(match column {
            HostValue::String(name) => TableColumn {
                name,
                ..Default::default()
            },
            HostValue::Object(mut map) => {
                let sql_type = match map.remove("type") {
                    Some(HostValue::String(name)) => Some(SqlType::from_name(&name).ok_or_else(
                        || Failure::bind(index, format!("unknown SQL type `{name}`")),
                    )?),
                    _ => None,
                };
                TableColumn {
                    name: text(map.remove("name"), "name")?,
                    sql_type,
                    precision: take_size(&mut map, index, "precision")?,
                    scale: take_size(&mut map, index, "scale")?.map(|v| v as i16),
                }
            }
            v => {
                return Err(Failure::bind(
                    index,
                    format!("a table column must be a name or an object, found {}", v.kind()),
                )
                .into());
            }
        });
    }
    let rows = match map.remove("rows") {
        Some(HostValue::Array(v)) => v,
        None => Vec::new(),
        Some(..) => return Err(Failure::bind(index, "`rows` must be an array").into()),
    };
    for (i, row) in rows.into_iter().enumerate() {
        let row = match row {
            HostValue::Array(v) => v,
            HostValue::Object(mut v) => table
                .columns
                .iter()
                .map(|c| v.remove(&c.name).unwrap_or_default())
                .collect(),
            v => {
                return Err(Failure::bind(
                    index,
                    format!("table row {i} must be an array or an object, found {}", v.kind()),
                )
                .into());
            }
        };
        if row.len() != table.columns.len() {
            return Err(Failure::bind(
                index,
                format!(
                    "table row {i} has {} values but the table has {} columns",
                    row.len(),
                    table.columns.len()
                ),
            )
            .into());
        }
        table.rows.push(row);
    }
    Ok(table)
}
