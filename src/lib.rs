//! Asynchronous ODBC statement engine.
//!
//! Statements run on the tokio blocking pool, one lane per statement, and their results come
//! back as typed [`Value`]s or, converted, as [`HostValue`]s. Start from [`OdbcConnection`].
pub use sluice_core::*;
pub use sluice_odbc::*;
