mod bcp_library;
mod bulk_copy;
mod config;
mod connection;
mod diagnostics;
mod dispatcher;
mod driver_manager;
mod environment;
mod handle;
pub mod marshal;
mod statement;

pub use bcp_library::*;
pub use bulk_copy::*;
pub use config::*;
pub use connection::*;
pub use diagnostics::*;
pub use dispatcher::*;
pub use driver_manager::*;
pub use environment::*;
pub use handle::*;
pub use marshal::*;
pub use statement::*;
