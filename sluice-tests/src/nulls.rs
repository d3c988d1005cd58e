use crate::{MockCell, MockDriver, Script};
use sluice_core::{HostValue, ParamSpec, QueryOptions, SqlType};
use sluice_odbc::OdbcConnection;

pub async fn nulls(driver: &MockDriver, connection: &OdbcConnection) {
    const SQL: &str = "UPDATE people SET nickname = ? WHERE id = ?";
    driver.script(SQL, Script::affected(1));
    let result = connection
        .execute_query(
            3,
            SQL,
            vec![
                ParamSpec::typed(HostValue::Null, SqlType::VarChar),
                ParamSpec::new(7),
            ],
            QueryOptions::default(),
        )
        .await
        .expect("Failed to update with a null");
    assert_eq!(result.row_count, 1);
    let execution = driver.last_execution().expect("Missing execution");
    let param = execution.param(1).expect("Missing parameter 1");
    assert_eq!(param.sql_type, SqlType::VarChar.code());
    assert_eq!(param.values, vec![MockCell::Null]);
    assert_eq!(
        execution.param(2).expect("Missing parameter 2").values,
        vec![MockCell::Int(7)]
    );
    connection
        .release_statement(3)
        .await
        .expect("Failed to release the statement");
}
