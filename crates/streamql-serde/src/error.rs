//! Decoder error types.

use thiserror::Error;

/// Record-level decode failure. Raised only for payloads that are malformed
/// at the wire level; schema mismatches never produce this.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to parse payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Payload is not a structured record: {0}")]
    NotARecord(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
