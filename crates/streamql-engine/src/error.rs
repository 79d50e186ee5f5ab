//! Engine error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Statement-level compilation failure. Carries the original statement
    /// text so callers can report which statement was rejected.
    #[error("{message}\nStatement: {statement}")]
    Statement { statement: String, message: String },

    /// A field referenced by an expression or key selection that does not
    /// exist in the operator's schema.
    #[error("Field not found in schema: {0}")]
    UnknownField(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Sink already registered: {0}")]
    SinkExists(String),

    /// Fatal per-query invariant breach, such as an interrupted blocking
    /// enqueue outside of shutdown.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Schema(#[from] streamql_core::Error),
}

impl Error {
    /// Attach the offending statement text to a message.
    pub fn statement(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Statement {
            statement: statement.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
