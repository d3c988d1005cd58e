#[cfg(test)]
mod tests {
    use sluice_core::{
        Diagnostic, Error, Failure, FailureKind, HostValue, ParamDirection, ParamSpec, SqlType,
        failure_kind, find_failure,
    };

    fn descriptor(entries: Vec<(&str, HostValue)>) -> HostValue {
        HostValue::object(entries)
    }

    #[test]
    fn plain_values() {
        let spec = ParamSpec::from_host(1, HostValue::Integer(5)).unwrap();
        assert_eq!(spec.value, HostValue::Integer(5));
        assert_eq!(spec.sql_type, None);
        assert_eq!(spec.direction, ParamDirection::Input);
        assert!(spec.table.is_none());
    }

    #[test]
    fn output_descriptor() {
        let spec = ParamSpec::from_host(
            2,
            descriptor(vec![
                ("type", "nvarchar".into()),
                ("direction", "out".into()),
                ("precision", 100.into()),
            ]),
        )
        .unwrap();
        assert_eq!(spec.sql_type, Some(SqlType::WVarChar));
        assert_eq!(spec.direction, ParamDirection::Output);
        assert!(spec.direction.is_output());
        assert_eq!(spec.precision, Some(100));
        assert!(spec.value.is_null());
    }

    #[test]
    fn table_descriptor() {
        let spec = ParamSpec::from_host(
            1,
            descriptor(vec![
                ("type_name", "PersonType".into()),
                ("schema", "dbo".into()),
                (
                    "columns",
                    HostValue::Array(vec![
                        descriptor(vec![("name", "id".into()), ("type", "int".into())]),
                        "name".into(),
                    ]),
                ),
                (
                    "rows",
                    HostValue::Array(vec![
                        HostValue::Array(vec![1.into(), "Ada".into()]),
                        descriptor(vec![("name", "Alan".into()), ("id", 2.into())]),
                    ]),
                ),
            ]),
        )
        .unwrap();
        assert_eq!(spec.sql_type, Some(SqlType::Table));
        let table = spec.table.unwrap();
        assert_eq!(table.type_name, "PersonType");
        assert_eq!(table.schema, "dbo");
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[0].sql_type, Some(SqlType::Integer));
        assert_eq!(table.columns[1].sql_type, None);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.column_values(0),
            vec![HostValue::from(1), HostValue::from(2)]
        );
        assert_eq!(
            table.column_values(1),
            vec![HostValue::from("Ada"), HostValue::from("Alan")]
        );
    }

    #[test]
    fn invalid_descriptors() {
        let error = ParamSpec::from_host(3, descriptor(vec![("type", "geometry".into())]))
            .unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);
        assert!(matches!(
            find_failure(&error),
            Some(Failure::ParameterBind { index: 3, .. })
        ));
        let error = ParamSpec::from_host(1, descriptor(vec![("direction", "sideways".into())]))
            .unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);
        let error = ParamSpec::from_host(
            1,
            descriptor(vec![
                ("type_name", "T".into()),
                ("columns", HostValue::Array(vec!["a".into()])),
                ("rows", HostValue::Array(vec![HostValue::Array(vec![1.into(), 2.into()])])),
            ]),
        )
        .unwrap_err();
        assert!(format!("{error:#}").contains("2 values"));
        let error =
            ParamSpec::from_host(1, descriptor(vec![("precision", (-1).into())])).unwrap_err();
        assert_eq!(failure_kind(&error), FailureKind::Marshal);
    }

    #[test]
    fn failure_classification() {
        let error = Error::new(Failure::NativeCall {
            operation: "SQLExecDirect",
            diagnostics: vec![Diagnostic::new("42S02", 208, "Invalid object name 'x'.")],
        })
        .context("While executing the query");
        assert_eq!(failure_kind(&error), FailureKind::Native);
        let failure = find_failure(&error).unwrap();
        assert_eq!(failure.diagnostics()[0].sqlstate, "42S02");
        assert!(format!("{error:#}").contains("[42S02] (208) Invalid object name 'x'."));
        assert_eq!(failure_kind(&Error::msg("other")), FailureKind::Unknown);
        assert_eq!(failure_kind(&Error::new(Failure::Cancelled)), FailureKind::Cancelled);
        assert_eq!(
            failure_kind(&Error::new(Failure::state("execute", "Closed"))),
            FailureKind::State
        );
    }
}
