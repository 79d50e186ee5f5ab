//! The SQL type system: recursive column types and ordered schemas.
//!
//! A [`Schema`] is an ordered, name-unique list of typed fields. Schemas are
//! compared structurally (names case-sensitive, order significant) and render
//! to the bracketed form used by plan text and error messages:
//! `[COL0 : BIGINT, COL1 : VARCHAR]`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// SqlType
// ---------------------------------------------------------------------------

/// A column type. Arrays and maps nest arbitrarily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Boolean,
    Integer,
    Bigint,
    Double,
    Varchar,
    /// Array with a single element type.
    Array(Box<SqlType>),
    /// Map with key and value types.
    Map(Box<SqlType>, Box<SqlType>),
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Integer => write!(f, "INT"),
            SqlType::Bigint => write!(f, "BIGINT"),
            SqlType::Double => write!(f, "DOUBLE"),
            SqlType::Varchar => write!(f, "VARCHAR"),
            SqlType::Array(elem) => write!(f, "ARRAY<{elem}>"),
            SqlType::Map(key, value) => write!(f, "MAP<{key},{value}>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Field / Schema
// ---------------------------------------------------------------------------

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub sql_type: SqlType,
}

impl Field {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// An ordered sequence of fields with unique names.
///
/// Name uniqueness is enforced case-insensitively at construction; lookup is
/// case-insensitive as well, but rendering and structural equality preserve
/// the declared spelling and order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting empty or duplicate (case-insensitive) names.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut seen: Vec<String> = Vec::with_capacity(fields.len());
        for field in &fields {
            if field.name.is_empty() {
                return Err(Error::EmptyFieldName);
            }
            let folded = field.name.to_ascii_lowercase();
            if seen.contains(&folded) {
                return Err(Error::DuplicateField(field.name.clone()));
            }
            seen.push(folded);
        }
        Ok(Self { fields })
    }

    /// Schema with no fields, for sources that are resolved later.
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Case-insensitive lookup returning the field position and definition.
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name.eq_ignore_ascii_case(name))
    }

    /// Position of a field, case-insensitive.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.field(name).map(|(i, _)| i)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Render as `[COL0 : BIGINT, COL1 : VARCHAR]`.
    pub fn render(&self) -> String {
        let cols: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{} : {}", f.name, f.sql_type))
            .collect();
        format!("[{}]", cols.join(", "))
    }

    /// Concatenate two schemas, failing on colliding names. Used for join
    /// output schemas.
    pub fn join(&self, other: &Schema) -> Result<Schema> {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Schema::new(fields)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn order_schema() -> Schema {
        Schema::new(vec![
            Field::new("ORDERTIME", SqlType::Bigint),
            Field::new("ITEMID", SqlType::Varchar),
            Field::new("ORDERUNITS", SqlType::Double),
        ])
        .unwrap()
    }

    #[test]
    fn test_type_rendering() {
        assert_eq!(SqlType::Bigint.to_string(), "BIGINT");
        assert_eq!(SqlType::Varchar.to_string(), "VARCHAR");
        assert_eq!(
            SqlType::Array(Box::new(SqlType::Double)).to_string(),
            "ARRAY<DOUBLE>"
        );
        assert_eq!(
            SqlType::Map(Box::new(SqlType::Varchar), Box::new(SqlType::Double)).to_string(),
            "MAP<VARCHAR,DOUBLE>"
        );
        assert_eq!(
            SqlType::Array(Box::new(SqlType::Array(Box::new(SqlType::Integer)))).to_string(),
            "ARRAY<ARRAY<INT>>"
        );
    }

    #[test]
    fn test_schema_render() {
        assert_eq!(
            order_schema().render(),
            "[ORDERTIME : BIGINT, ITEMID : VARCHAR, ORDERUNITS : DOUBLE]"
        );
    }

    #[test]
    fn test_schema_rejects_duplicate_names() {
        let result = Schema::new(vec![
            Field::new("COL0", SqlType::Bigint),
            Field::new("col0", SqlType::Varchar),
        ]);
        assert!(matches!(result, Err(Error::DuplicateField(_))));
    }

    #[test]
    fn test_schema_rejects_empty_name() {
        let result = Schema::new(vec![Field::new("", SqlType::Bigint)]);
        assert!(matches!(result, Err(Error::EmptyFieldName)));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let schema = order_schema();
        assert_eq!(schema.index_of("itemid"), Some(1));
        assert_eq!(schema.index_of("ItemId"), Some(1));
        assert_eq!(schema.index_of("ITEMID"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn test_structural_equality_is_order_sensitive() {
        let a = Schema::new(vec![
            Field::new("A", SqlType::Bigint),
            Field::new("B", SqlType::Varchar),
        ])
        .unwrap();
        let b = Schema::new(vec![
            Field::new("B", SqlType::Varchar),
            Field::new("A", SqlType::Bigint),
        ])
        .unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_join_schemas() {
        let left = Schema::new(vec![Field::new("L0", SqlType::Bigint)]).unwrap();
        let right = Schema::new(vec![Field::new("R0", SqlType::Varchar)]).unwrap();
        let joined = left.join(&right).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.index_of("R0"), Some(1));

        // Colliding names fail.
        assert!(left.join(&left).is_err());
    }
}
