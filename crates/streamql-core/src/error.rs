//! Error types for the streamql core crate.
//!
//! Schema construction is the only fallible operation at this layer; the
//! engine and serde crates wrap these in their own error enums via `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Duplicate field name in schema: {0}")]
    DuplicateField(String),

    #[error("Schema has no field named: {0}")]
    UnknownField(String),

    #[error("Empty field name in schema")]
    EmptyFieldName,
}

pub type Result<T> = std::result::Result<T, Error>;
