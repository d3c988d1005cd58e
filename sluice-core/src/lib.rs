mod column_def;
mod diagnostic;
mod failure;
mod host_value;
pub mod native;
mod options;
mod param;
mod parse;
mod query;
mod sql_type;
mod util;
mod value;

pub use ::anyhow::Context;
pub use column_def::*;
pub use diagnostic::*;
pub use failure::*;
pub use host_value::*;
pub use options::*;
pub use param::*;
pub use parse::*;
pub use query::*;
pub use sql_type::*;
pub use util::*;
pub use value::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
