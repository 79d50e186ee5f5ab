//! Shared foundations: the SQL type system, runtime values, and the
//! per-query processing log.

pub mod error;
pub mod logging;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use types::{Field, Schema, SqlType};
pub use value::{Row, Value};
