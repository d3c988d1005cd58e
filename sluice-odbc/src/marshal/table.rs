use crate::marshal::{BoundParameter, BoundTable, DatumStorage, bind_parameter, encode_utf16};
use sluice_core::{
    Context, Failure, HostValue, ParamDirection, ParamSpec, Result, SqlType,
    native::{CDataType, Len},
};

/// Marshal a table-valued parameter.
///
/// The parameter itself only carries the type name and the row count, each column is bound
/// as a parameter array of `rows` elements under the statement's parameter focus.
pub fn bind_table(index: usize, spec: &ParamSpec) -> Result<BoundParameter> {
    let Some(table) = &spec.table else {
        return Err(Failure::bind(index, "a table parameter requires its columns and rows").into());
    };
    if spec.direction != ParamDirection::Input {
        return Err(Failure::bind(index, "a table parameter can only be an input").into());
    }
    let position =
        u16::try_from(index).map_err(|_| Failure::bind(index, "too many parameters"))?;
    if table.type_name.is_empty() {
        return Err(Failure::bind(index, "a table parameter requires a type name").into());
    }
    if table.columns.is_empty() {
        return Err(Failure::bind(index, "a table parameter requires at least one column").into());
    }
    let rows = table.rows.len();
    let mut columns = Vec::with_capacity(table.columns.len());
    for (i, column) in table.columns.iter().enumerate() {
        let column_spec = ParamSpec {
            value: HostValue::Array(table.column_values(i)),
            sql_type: column.sql_type,
            precision: column.precision,
            scale: column.scale,
            ..Default::default()
        };
        let bound = if rows == 0 {
            empty_column(i + 1, &column_spec)
        } else {
            bind_parameter(i + 1, &column_spec)
        }
        .with_context(|| {
            format!(
                "While binding column `{}` of the table parameter {index} ({})",
                column.name, table.type_name
            )
        })?;
        columns.push(bound);
    }
    let type_name = encode_utf16(&table.type_name);
    let column_size = spec.precision.unwrap_or(rows).min(rows);
    Ok(BoundParameter {
        index: position,
        direction: ParamDirection::Input,
        c_type: CDataType::DEFAULT,
        sql_type: SqlType::Table,
        column_size,
        decimal_digits: 0,
        storage: DatumStorage::TableName(type_name.clone()),
        indicators: vec![rows as Len],
        rows: 1,
        table: Some(BoundTable {
            type_name,
            schema: encode_utf16(&table.schema),
            rows,
            columns,
        }),
    })
}

/// Column of a table without rows: a single NULL element keeps the buffers valid.
fn empty_column(index: usize, spec: &ParamSpec) -> Result<BoundParameter> {
    let spec = ParamSpec {
        value: HostValue::Null,
        ..spec.clone()
    };
    let mut bound = bind_parameter(index, &spec)?;
    bound.rows = 0;
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{FailureKind, TableColumn, TableSpec, Value, failure_kind};

    fn people() -> TableSpec {
        TableSpec::new("PersonType", "dbo")
            .with_column(TableColumn::new("id", SqlType::Integer))
            .with_column(TableColumn {
                name: "name".into(),
                ..Default::default()
            })
            .with_row(vec![1.into(), "Ada".into()])
            .with_row(vec![2.into(), HostValue::Null])
            .with_row(vec![3.into(), "Grace".into()])
    }

    #[test]
    fn table_parameter() {
        let p = bind_table(1, &ParamSpec::table(people())).unwrap();
        assert_eq!(p.c_type, CDataType::DEFAULT);
        assert_eq!(p.sql_type, SqlType::Table);
        assert_eq!(p.column_size, 3);
        assert_eq!(p.indicators, vec![3]);
        let table = p.table.unwrap();
        assert_eq!(table.type_name, encode_utf16("PersonType"));
        assert_eq!(table.schema, encode_utf16("dbo"));
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[0].index, 1);
        assert_eq!(table.columns[1].index, 2);
        assert_eq!(
            table.columns[0].values().unwrap(),
            vec![Value::Int32(Some(1)), Value::Int32(Some(2)), Value::Int32(Some(3))]
        );
        assert_eq!(table.columns[1].sql_type, SqlType::WVarChar);
        assert!(table.columns[1].is_null(1));
    }

    #[test]
    fn row_count_caps_column_size() {
        let p = bind_table(1, &ParamSpec::table(people()).with_precision(100, 0)).unwrap();
        assert_eq!(p.column_size, 3);
        let p = bind_table(1, &ParamSpec::table(people()).with_precision(2, 0)).unwrap();
        assert_eq!(p.column_size, 2);
    }

    #[test]
    fn empty_table() {
        let spec = TableSpec::new("PersonType", "")
            .with_column(TableColumn::new("id", SqlType::Integer));
        let p = bind_table(1, &ParamSpec::table(spec)).unwrap();
        assert_eq!(p.indicators, vec![0]);
        let table = p.table.unwrap();
        assert_eq!(table.rows, 0);
        assert_eq!(table.columns[0].rows, 0);
    }

    #[test]
    fn invalid_tables() {
        let error = bind_table(1, &ParamSpec::typed(HostValue::Null, SqlType::Table)).unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);
        let spec = TableSpec::new("T", "")
            .with_column(TableColumn::new("id", SqlType::Integer))
            .with_row(vec!["not a number".into()]);
        let error = bind_table(1, &ParamSpec::table(spec)).unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);
        assert!(format!("{error:#}").contains("column `id`"));
    }
}
