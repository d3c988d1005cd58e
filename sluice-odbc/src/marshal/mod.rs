//! Conversion between host values and native buffers.
mod bind;
mod decode;
mod infer;
mod numeric;
mod storage;
mod table;
pub mod temporal;
mod utf16;

pub use bind::*;
pub use decode::*;
pub use infer::*;
pub use numeric::*;
pub use storage::*;
pub use table::*;
pub use utf16::*;
