use crate::{MockCell, MockDriver, Script};
use sluice_core::{HostValue, ParamSpec, QueryOptions};
use sluice_odbc::OdbcConnection;

pub async fn arrays(driver: &MockDriver, connection: &OdbcConnection) {
    const SQL: &str = "INSERT INTO numbers (n) VALUES (?)";
    driver.script(SQL, Script::affected(3));
    connection
        .prepare(2, SQL, QueryOptions::default())
        .await
        .expect("Failed to prepare the insert");
    let values = HostValue::Array(vec![1.into(), 2.into(), 3.into()]);
    let result = connection
        .execute_prepared(2, vec![ParamSpec::new(values)], QueryOptions::default())
        .await
        .expect("Failed to insert the array");
    assert_eq!(result.row_count, 3);
    let execution = driver
        .last_execution()
        .expect("The insert did not reach the driver");
    assert_eq!(execution.paramset_size, 3);
    let param = execution.param(1).expect("Missing parameter 1");
    assert!(param.values.iter().all(|v| *v != MockCell::Null));
    assert_eq!(
        param.values,
        vec![MockCell::Int(1), MockCell::Int(2), MockCell::Int(3)]
    );

    // Nulls keep their own indicator whatever the majority type
    let values = HostValue::Array(vec!["a".into(), HostValue::Null, "c".into()]);
    connection
        .execute_prepared(2, vec![ParamSpec::new(values)], QueryOptions::default())
        .await
        .expect("Failed to insert the array with nulls");
    let execution = driver.last_execution().expect("Missing execution");
    assert_eq!(
        execution.param(1).expect("Missing parameter 1").values,
        vec![
            MockCell::Text("a".into()),
            MockCell::Null,
            MockCell::Text("c".into())
        ]
    );
    connection
        .release_statement(2)
        .await
        .expect("Failed to release the statement");
}
