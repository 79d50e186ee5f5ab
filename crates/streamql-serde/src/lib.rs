//! Schema-directed record decoding.
//!
//! Converts untyped wire payloads into positional rows matching a target
//! schema. Missing or extra fields are never errors; only payloads that
//! cannot be parsed at all fail, and those are reported through the owning
//! query's processing log before the error is handed back to the runtime's
//! record-level error path.

pub mod error;
pub mod json;

pub use error::{DecodeError, Result};
pub use json::JsonRowDecoder;
