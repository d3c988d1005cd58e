use crate::{MockCell, MockDriver, Script};
use sluice_core::{ParamSpec, QueryOptions, SqlType, Value};
use sluice_odbc::OdbcConnection;

pub async fn output(driver: &MockDriver, connection: &OdbcConnection) {
    const SQL: &str = "{CALL next_invoice(?)}";
    driver.script(SQL, Script::affected(0).with_output(1, 1024));
    connection
        .execute_query(
            4,
            SQL,
            vec![ParamSpec::output(SqlType::Integer)],
            QueryOptions::default(),
        )
        .await
        .expect("Failed to call the procedure");
    // The driver saw the zero placeholder
    let execution = driver.last_execution().expect("Missing execution");
    assert_eq!(
        execution.param(1).expect("Missing parameter 1").values,
        vec![MockCell::Int(0)]
    );
    let values = connection
        .unbind_output_parameters(4)
        .await
        .expect("Failed to read the output parameters");
    assert_eq!(values, vec![Value::Int32(Some(1024))]);
    connection
        .release_statement(4)
        .await
        .expect("Failed to release the statement");
}
