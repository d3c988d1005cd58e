use crate::{MockDriver, Script};
use sluice_core::{ColumnDefinition, QueryOptions, SqlType, StatementState, Value};
use sluice_odbc::OdbcConnection;

pub async fn simple(driver: &MockDriver, connection: &OdbcConnection) {
    const SQL: &str = "SELECT 1 AS x";
    driver.script(
        SQL,
        Script::rows(
            vec![ColumnDefinition::new("x", SqlType::Integer)],
            vec![vec![1.into()]],
        ),
    );
    let result = connection
        .execute_query(1, SQL, vec![], QueryOptions::default())
        .await
        .expect("Failed to select 1");
    assert_eq!(result.columns.len(), 1);
    assert_eq!(result.columns[0].name, "x");
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0][0], Value::Int32(Some(1)));
    assert!(result.end_of_rows);
    assert_eq!(
        connection.statement_state(1),
        Some(StatementState::FetchComplete)
    );
    assert!(
        connection
            .release_statement(1)
            .await
            .expect("Failed to release the statement")
    );
}
