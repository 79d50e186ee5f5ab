//! JSON payload decoder.
//!
//! Decodes an untyped JSON object into a row in target-schema order. Field
//! matching is case-insensitive via a case-folded index built once per
//! payload; coercion widens numerics, passes strings through, recurses into
//! arrays and maps, and serializes nested structures back to JSON text when
//! the declared field type is VARCHAR.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use streamql_core::logging::{ProcessingEvent, ProcessingLogConfig, StructuredLogger};
use streamql_core::{Row, Schema, SqlType, Value};

use crate::error::{DecodeError, Result};

/// Decodes JSON payloads against a fixed target schema.
///
/// Constructed once per source; `decode` runs per record on whichever runtime
/// thread owns the record's partition, so the decoder holds no mutable state.
pub struct JsonRowDecoder {
    schema: Schema,
    logger: StructuredLogger,
    log_config: ProcessingLogConfig,
}

impl JsonRowDecoder {
    pub fn new(schema: Schema, logger: StructuredLogger, log_config: ProcessingLogConfig) -> Self {
        Self {
            schema,
            logger,
            log_config,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Decode one payload into a row of exactly `schema.len()` values.
    ///
    /// Malformed payloads are logged with their raw bytes (when the log
    /// config permits) and returned as errors; the runtime is expected to
    /// skip the record and continue the partition.
    pub fn decode(&self, payload: &[u8]) -> Result<Row> {
        let parsed: JsonValue = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(cause) => {
                self.log_error(cause.to_string(), payload);
                return Err(DecodeError::Malformed(cause));
            }
        };

        let object = match parsed {
            JsonValue::Object(map) => map,
            other => {
                let cause = format!("expected a JSON object, got: {other}");
                self.log_error(cause.clone(), payload);
                return Err(DecodeError::NotARecord(cause));
            }
        };

        // Pass 1: case-folded index of the payload's key space.
        let folded: HashMap<String, &JsonValue> = object
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();

        // Pass 2: resolve each schema field against the index.
        let row = self
            .schema
            .fields()
            .iter()
            .map(|field| {
                folded
                    .get(&field.name.to_ascii_lowercase())
                    .map(|raw| coerce(raw, &field.sql_type))
                    .unwrap_or(Value::Null)
            })
            .collect();

        Ok(row)
    }

    fn log_error(&self, cause: String, payload: &[u8]) {
        let payload = self
            .log_config
            .include_payload
            .then(|| payload.to_vec());
        self.logger
            .log(ProcessingEvent::DeserializationError { cause, payload });
    }
}

/// Coerce a raw JSON value to a declared type. Total: values that cannot be
/// represented in the declared type decode to null rather than failing the
/// record.
fn coerce(raw: &JsonValue, target: &SqlType) -> Value {
    match (raw, target) {
        (JsonValue::Null, _) => Value::Null,

        (JsonValue::Bool(b), SqlType::Boolean) => Value::Boolean(*b),

        (JsonValue::Number(n), SqlType::Integer) => {
            n.as_i64().map(Value::Integer).unwrap_or(Value::Null)
        }
        (JsonValue::Number(n), SqlType::Bigint) => {
            n.as_i64().map(Value::Bigint).unwrap_or(Value::Null)
        }
        // Widening: integral JSON numbers fill DOUBLE fields.
        (JsonValue::Number(n), SqlType::Double) => {
            n.as_f64().map(Value::Double).unwrap_or(Value::Null)
        }

        (JsonValue::String(s), SqlType::Varchar) => Value::Varchar(s.clone()),

        // Struct-as-string fallback: a nested structure declared as VARCHAR
        // is serialized back to its canonical textual form.
        (JsonValue::Object(_) | JsonValue::Array(_), SqlType::Varchar) => {
            match serde_json::to_string(raw) {
                Ok(text) => Value::Varchar(text),
                Err(_) => Value::Null,
            }
        }
        // Scalar non-strings render through their JSON form.
        (JsonValue::Bool(b), SqlType::Varchar) => Value::Varchar(b.to_string()),
        (JsonValue::Number(n), SqlType::Varchar) => Value::Varchar(n.to_string()),

        (JsonValue::Array(items), SqlType::Array(elem)) => {
            Value::Array(items.iter().map(|v| coerce(v, elem)).collect())
        }

        (JsonValue::Object(entries), SqlType::Map(_, value_type)) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), coerce(v, value_type)))
                .collect(),
        ),

        _ => Value::Null,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
