mod arrays;
mod bulk;
mod cancel;
mod mock;
mod nulls;
mod output;
mod simple;
mod transaction;

pub use mock::*;

use crate::{
    arrays::arrays, bulk::bulk, cancel::cancel, nulls::nulls, output::output, simple::simple,
    transaction::transaction,
};
use log::LevelFilter;
use sluice_core::{Result, native::NativeApi};
use sluice_odbc::{DispatchContext, Dispatcher, Environment, OdbcConnection};
use std::{env, sync::Arc};

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}

/// A closed connection to `driver` with its own environment and dispatcher.
///
/// Must be called inside a tokio runtime.
pub fn mock_connection(driver: &Arc<MockDriver>) -> Result<OdbcConnection> {
    let api: Arc<dyn NativeApi> = driver.clone();
    let environment = Environment::new(api)?;
    let dispatcher = Arc::new(Dispatcher::new(DispatchContext::new())?);
    OdbcConnection::new(environment, dispatcher)
}

/// An open connection to `driver`, bulk copy enabled and served by the driver itself.
pub async fn open_connection(driver: &Arc<MockDriver>) -> Result<OdbcConnection> {
    let connection = mock_connection(driver)?.with_bulk_copy(driver.clone());
    connection
        .open("Driver={Mock Driver};Server=localhost;bulk_copy=true", 0)
        .await?;
    Ok(connection)
}

/// Run every shared scenario on `connection`, which must be open on `driver` with bulk copy
/// enabled.
pub async fn execute_tests(driver: &MockDriver, connection: &OdbcConnection) {
    simple(driver, connection).await;
    arrays(driver, connection).await;
    nulls(driver, connection).await;
    output(driver, connection).await;
    transaction(driver, connection).await;
    cancel(driver, connection).await;
    bulk(driver, connection).await;
}
