#[cfg(test)]
mod tests {
    use indoc::indoc;
    use sluice::{
        ColumnDefinition, Environment, HostValue, OdbcConnection, ParamSpec, QueryOptions,
        SqlType, Value, native::NativeApi,
    };
    use sluice_tests::{
        MockCell, Script, execute_tests, init_logs, mock_connection, mock_driver,
        open_connection,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn shared_scenarios() {
        init_logs();
        let driver = mock_driver();
        let connection = open_connection(&driver)
            .await
            .expect("Could not open the connection");
        execute_tests(&driver, &connection).await;
        assert!(connection.close().await.expect("Could not close"));
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn host_rows() {
        init_logs();
        let driver = mock_driver();
        let sql = indoc! {"
            SELECT id, name, balance
            FROM accounts
            WHERE id >= ?
        "};
        driver.script(
            sql,
            Script::rows(
                vec![
                    ColumnDefinition::new("id", SqlType::BigInt),
                    ColumnDefinition::new("name", SqlType::WVarChar),
                    ColumnDefinition::new("balance", SqlType::Double),
                ],
                vec![
                    vec![MockCell::Int(1), "Ada".into(), 10.5.into()],
                    vec![MockCell::Int(2), MockCell::Null, 0.0.into()],
                ],
            ),
        );
        let connection = open_connection(&driver).await.unwrap();
        let parameters = vec![ParamSpec::from_host(1, HostValue::Integer(1)).unwrap()];
        let result = connection
            .execute_query(1, sql, parameters, QueryOptions::default())
            .await
            .unwrap();
        let rows = result.to_host();
        assert_eq!(
            rows[0],
            HostValue::object([
                ("id", HostValue::Integer(1)),
                ("name", HostValue::String("Ada".into())),
                ("balance", HostValue::Number(10.5)),
            ])
        );
        assert_eq!(rows[1].get("name"), Some(&HostValue::Null));
        let labeled = result.labeled_rows().collect::<Vec<_>>();
        assert_eq!(labeled[1].get_column("id"), Some(&Value::Int64(Some(2))));
        assert_eq!(labeled[0].names(), ["id", "name", "balance"]);
    }

    #[tokio::test]
    async fn descriptor_parameters() {
        let driver = mock_driver();
        let sql = "UPDATE accounts SET balance = ? WHERE id = ?";
        driver.script(sql, Script::affected(1));
        let connection = open_connection(&driver).await.unwrap();
        let balance = HostValue::object([
            ("value", HostValue::String("12.345".into())),
            ("type", HostValue::String("decimal".into())),
            ("precision", HostValue::Integer(10)),
            ("scale", HostValue::Integer(3)),
        ]);
        let parameters = [balance, HostValue::Integer(1)]
            .into_iter()
            .enumerate()
            .map(|(i, v)| ParamSpec::from_host(i + 1, v))
            .collect::<sluice::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(parameters[0].sql_type, Some(SqlType::Decimal));
        connection
            .execute_query(1, sql, parameters, QueryOptions::default())
            .await
            .unwrap();
        let execution = driver.last_execution().unwrap();
        let param = execution.param(1).unwrap();
        assert_eq!(param.sql_type, SqlType::Decimal.code());
        assert_eq!(param.column_size, 10);
        assert_eq!(param.decimal_digits, 3);
        assert_eq!(driver.numeric_descriptors(), vec![(1, 10, 3)]);
    }

    #[tokio::test]
    async fn global_environment() {
        init_logs();
        let driver = mock_driver();
        let api: Arc<dyn NativeApi> = driver.clone();
        assert!(Environment::global().is_none());
        let environment = Environment::init_global(api.clone()).unwrap();
        let again = Environment::init_global(api).unwrap();
        assert!(Arc::ptr_eq(&environment, &again));
        assert!(Environment::global().is_some());
        drop(again);

        let dispatcher = Arc::new(
            sluice::Dispatcher::new(sluice::DispatchContext::new()).unwrap(),
        );
        let connection = OdbcConnection::new(environment, dispatcher).unwrap();
        assert!(Environment::teardown_global());
        assert!(!Environment::teardown_global());
        assert!(Environment::global().is_none());
        // The connection keeps the environment alive
        assert_eq!(
            driver.live_handles(sluice::native::HandleKind::Environment),
            1
        );
        drop(connection);
        assert_eq!(
            driver.live_handles(sluice::native::HandleKind::Environment),
            0
        );
    }

    #[tokio::test]
    async fn closed_connection_fails() {
        let driver = mock_driver();
        let connection = mock_connection(&driver).unwrap();
        assert!(!connection.is_connected());
        sluice_tests::silent_logs! {
            assert!(
                connection
                    .execute_query(1, "SELECT 1", vec![], QueryOptions::default())
                    .await
                    .is_err()
            );
        }
        assert!(!connection.close().await.unwrap());
    }

    #[test]
    fn missing_libraries() {
        init_logs();
        sluice_tests::silent_logs! {
            let error = sluice::DriverManager::load("libsluice-missing-odbc.so")
                .err()
                .expect("The library must not load");
            assert!(format!("{error:#}").contains("While loading `libsluice-missing-odbc.so`"));
            let error = sluice::BcpLibrary::load(Some("libsluice-missing-bcp.so"))
                .err()
                .expect("The library must not load");
            assert_eq!(sluice::failure_kind(&error), sluice::FailureKind::Resource);
            assert!(matches!(
                sluice::find_failure(&error),
                Some(sluice::Failure::PluginLoad { .. })
            ));
        }
    }
}
