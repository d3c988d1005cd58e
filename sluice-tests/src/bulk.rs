use crate::{MockCell, MockDriver};
use sluice_core::{HostValue, SqlType};
use sluice_odbc::{BulkColumn, OdbcConnection};

pub async fn bulk(driver: &MockDriver, connection: &OdbcConnection) {
    let columns = vec![
        BulkColumn::new("id", SqlType::BigInt, vec![1.into(), 2.into()]),
        BulkColumn::new(
            "city",
            SqlType::VarChar,
            vec!["Turin".into(), HostValue::Null],
        ),
    ];
    let sent = connection
        .bulk_insert("dbo.cities", columns)
        .await
        .expect("Failed to bulk copy");
    assert_eq!(sent, 2);
    assert_eq!(driver.bcp_table().as_deref(), Some("dbo.cities"));
    assert_eq!(
        driver.bcp_rows(),
        vec![
            vec![MockCell::Int(1), MockCell::Text("Turin".into())],
            vec![MockCell::Int(2), MockCell::Null],
        ]
    );
    assert_eq!(driver.bcp_committed(), 2);
}
