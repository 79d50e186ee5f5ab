//! Runtime values flowing through compiled queries.
//!
//! A [`Row`] is a positional sequence of values in schema order. Absent or
//! null input decodes to [`Value::Null`] rather than an error; operators and
//! predicates treat null as absorbing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::SqlType;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Bigint(i64),
    Double(f64),
    Varchar(String),
    Array(Vec<Value>),
    /// Map entries in input order; keys are strings on the wire.
    Map(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widening view as f64 for numeric comparison; `None` for non-numerics.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) | Value::Bigint(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The type this value would carry in a schema, when unambiguous.
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(SqlType::Boolean),
            Value::Integer(_) => Some(SqlType::Integer),
            Value::Bigint(_) => Some(SqlType::Bigint),
            Value::Double(_) => Some(SqlType::Double),
            Value::Varchar(_) => Some(SqlType::Varchar),
            Value::Array(_) | Value::Map(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(v) | Value::Bigint(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Varchar(s) => f.write_str(s),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Value::Map(entries) => {
                let rendered: Vec<String> =
                    entries.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
        }
    }
}

/// A positional row matching some schema's field order.
pub type Row = Vec<Value>;

// ===========================================================================
// Tests
// ===========================================================================
