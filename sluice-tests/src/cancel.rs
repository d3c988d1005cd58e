use crate::{MockCell, MockDriver, Script};
use sluice_core::{
    ColumnDefinition, FailureKind, QueryOptions, SqlType, StatementState, failure_kind,
};
use sluice_odbc::OdbcConnection;
use std::time::Duration;

pub async fn cancel(driver: &MockDriver, connection: &OdbcConnection) {
    const SQL: &str = "SELECT id FROM events";
    driver.script(
        SQL,
        Script::rows(
            vec![ColumnDefinition::new("id", SqlType::BigInt)],
            (0..20).map(|v| vec![MockCell::Int(v)]).collect(),
        )
        .with_fetch_delay(Duration::from_millis(50)),
    );
    let first = connection
        .execute_query(5, SQL, vec![], QueryOptions::default().with_batch_size(1))
        .await
        .expect("Failed to open the cursor");
    assert_eq!(first.rows.len(), 1);
    let fetches = driver.calls("SQLFetch");

    let fetching = connection.fetch_rows(5, 19);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(
        connection
            .cancel(5)
            .await
            .expect("Failed to cancel the statement")
    );
    let error;
    crate::silent_logs! {
        error = fetching.await.expect_err("The fetch should have been cancelled");
    }
    assert_eq!(failure_kind(&error), FailureKind::Cancelled);
    assert_eq!(
        connection.statement_state(5),
        Some(StatementState::Cancelled)
    );
    // No further rows are fetched once cancelled
    assert!(driver.calls("SQLFetch") - fetches <= 1);
    connection
        .release_statement(5)
        .await
        .expect("Failed to release the statement");
}
