use crate::{MockDriver, Script};
use sluice_core::{QueryOptions, native::CompletionType};
use sluice_odbc::OdbcConnection;

pub async fn transaction(driver: &MockDriver, connection: &OdbcConnection) {
    const SQL: &str = "DELETE FROM sessions";
    driver.script(SQL, Script::affected(12));
    let before = driver.transactions().len();

    assert!(
        connection
            .begin_transaction()
            .await
            .expect("Failed to begin")
    );
    assert!(connection.in_transaction());
    let result = connection
        .execute_query(6, SQL, vec![], QueryOptions::default())
        .await
        .expect("Failed to delete");
    assert_eq!(result.row_count, 12);
    assert!(connection.rollback().await.expect("Failed to roll back"));
    assert!(!connection.in_transaction());

    assert!(
        connection
            .begin_transaction()
            .await
            .expect("Failed to begin")
    );
    assert!(connection.commit().await.expect("Failed to commit"));
    // Nothing to commit anymore
    assert!(!connection.commit().await.expect("Failed to commit"));
    assert_eq!(
        driver.transactions()[before..],
        [CompletionType::Rollback, CompletionType::Commit]
    );
    connection
        .release_statement(6)
        .await
        .expect("Failed to release the statement");
}
