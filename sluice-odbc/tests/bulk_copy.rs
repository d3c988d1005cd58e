#[cfg(test)]
mod tests {
    use sluice_core::{
        FailureKind, HostValue, SqlType, failure_kind, find_failure, native::Bcp,
    };
    use sluice_odbc::{BulkColumn, BulkOptions};
    use sluice_tests::{
        MockCell, MockDriver, init_logs, mock_connection, mock_driver, open_connection,
        silent_logs,
    };
    use std::sync::Arc;

    fn people() -> Vec<BulkColumn> {
        vec![
            BulkColumn::new(
                "id",
                SqlType::Integer,
                vec![1.into(), 2.into(), 3.into()],
            ),
            BulkColumn::new(
                "name",
                SqlType::WVarChar,
                vec!["Ada".into(), HostValue::Null, "Grace Hopper".into()],
            ),
        ]
    }

    #[tokio::test]
    async fn insert_rows() {
        init_logs();
        let driver = mock_driver();
        let connection = open_connection(&driver).await.unwrap();
        let sent = connection.bulk_insert("dbo.people", people()).await.unwrap();
        assert_eq!(sent, 3);
        assert_eq!(driver.bcp_table().as_deref(), Some("dbo.people"));
        assert_eq!(
            driver.bcp_rows(),
            vec![
                vec![MockCell::Int(1), MockCell::Text("Ada".into())],
                vec![MockCell::Int(2), MockCell::Null],
                vec![MockCell::Int(3), MockCell::Text("Grace Hopper".into())],
            ]
        );
        assert_eq!(driver.bcp_committed(), 3);
        assert!(driver.bcp_controls().is_empty());
        assert_eq!(driver.calls("bcp_bind"), 2);
        assert_eq!(driver.calls("bcp_done"), 1);
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn batches() {
        let driver = mock_driver();
        let connection = open_connection(&driver).await.unwrap();
        let values = (0..5).map(HostValue::from).collect::<Vec<_>>();
        let options = BulkOptions {
            batch_size: 2,
            keep_nulls: true,
            ..Default::default()
        };
        let sent = connection
            .bulk_insert_with(
                "numbers",
                vec![BulkColumn::new("n", SqlType::BigInt, values)],
                options,
            )
            .await
            .unwrap();
        assert_eq!(sent, 5);
        assert_eq!(
            driver.bcp_controls(),
            vec![(Bcp::BATCH, 2), (Bcp::KEEPNULLS, 1)]
        );
        assert_eq!(driver.calls("bcp_batch"), 2);
        assert_eq!(driver.bcp_committed(), 5);
        assert_eq!(driver.bcp_rows()[4], vec![MockCell::Int(4)]);
    }

    #[tokio::test]
    async fn not_enabled() {
        let driver = mock_driver();
        let connection = mock_connection(&driver)
            .unwrap()
            .with_bulk_copy(driver.clone());
        connection
            .open("Driver={Mock Driver};Server=localhost", 0)
            .await
            .unwrap();
        silent_logs! {
            let error = connection.bulk_insert("dbo.people", people()).await.unwrap_err();
            assert!(format!("{error:#}").contains("bulk_copy=true"));
        }
        assert_eq!(driver.calls("bcp_initW"), 0);
    }

    #[tokio::test]
    async fn closed_connection() {
        let driver = mock_driver();
        let connection = mock_connection(&driver)
            .unwrap()
            .with_bulk_copy(driver.clone());
        silent_logs! {
            let error = connection.bulk_insert("dbo.people", people()).await.unwrap_err();
            assert!(format!("{error:#}").contains("it is not open"));
        }
    }

    #[tokio::test]
    async fn missing_function() {
        let driver = Arc::new(MockDriver::new().with_bcp_missing(&["bcp_initW"]));
        let connection = open_connection(&driver).await.unwrap();
        silent_logs! {
            let error = connection.bulk_insert("dbo.people", people()).await.unwrap_err();
            assert_eq!(failure_kind(&error), FailureKind::Resource);
        }
        assert_eq!(driver.calls("bcp_initW"), 0);
    }

    #[tokio::test]
    async fn failing_row() {
        let driver = mock_driver();
        let connection = open_connection(&driver).await.unwrap();
        driver.fail_bcp_row(1);
        silent_logs! {
            let error = connection.bulk_insert("dbo.people", people()).await.unwrap_err();
            assert_eq!(failure_kind(&error), FailureKind::Native);
            let failure = find_failure(&error).unwrap();
            assert_eq!(failure.diagnostics()[0].sqlstate, "22003");
            assert!(format!("{error:#}").contains("While bulk copying into `dbo.people`"));
        }
        assert_eq!(driver.bcp_rows().len(), 1);
        assert_eq!(driver.calls("bcp_done"), 1);
        // The connection is still usable and the failure does not repeat
        assert_eq!(
            connection.bulk_insert("dbo.people", people()).await.unwrap(),
            3
        );
        assert_eq!(driver.bcp_rows().len(), 3);
        assert_eq!(driver.bcp_committed(), 3);
    }

    #[tokio::test]
    async fn rejected_value() {
        let driver = mock_driver();
        let connection = open_connection(&driver).await.unwrap();
        let columns = vec![BulkColumn::new(
            "flag",
            SqlType::TinyInt,
            vec![1.into(), (-1).into()],
        )];
        silent_logs! {
            let error = connection.bulk_insert("flags", columns).await.unwrap_err();
            assert_eq!(failure_kind(&error), FailureKind::Marshal);
        }
        assert_eq!(driver.calls("bcp_initW"), 0);
    }

    #[tokio::test]
    async fn uneven_columns() {
        let driver = mock_driver();
        let connection = open_connection(&driver).await.unwrap();
        let mut columns = people();
        columns[1].values.pop();
        silent_logs! {
            let error = connection.bulk_insert("dbo.people", columns).await.unwrap_err();
            assert_eq!(failure_kind(&error), FailureKind::Marshal);
        }
    }
}
