//! The logical plan: a schema-annotated operator-intent tree.
//!
//! Analysis produces one [`LogicalPlanNode`] per statement. Every node
//! carries its output schema already computed; the physical builder takes
//! those schemas verbatim and only validates compatibility at sink
//! boundaries.

use std::fmt;

use serde::{Deserialize, Serialize};
use streamql_core::Schema;

use crate::expr::{AggregateExpression, Expression, SelectExpression};

// ---------------------------------------------------------------------------
// Shapes and sink targets
// ---------------------------------------------------------------------------

/// Whether a streaming collection is an append-only stream or a
/// continuously-updated keyed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionShape {
    Stream,
    Table,
}

impl fmt::Display for CollectionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionShape::Stream => write!(f, "STREAM"),
            CollectionShape::Table => write!(f, "TABLE"),
        }
    }
}

/// How a statement's sink came into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    /// CREATE STREAM/TABLE ... AS SELECT: the sink is declared by this
    /// statement and registered on success.
    Create,
    /// INSERT INTO: the sink must already exist and is validated against.
    InsertInto,
}

/// Where a statement's results go.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkTarget {
    /// Persistent named output log.
    Log { name: String, mode: SinkMode },
    /// Bare query: results are pulled synchronously through a bounded queue.
    Queue,
}

// ---------------------------------------------------------------------------
// Plan tree
// ---------------------------------------------------------------------------

/// One operator-intent node. Children are owned; the tree is immutable once
/// built.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    Source {
        name: String,
        schema: Schema,
        shape: CollectionShape,
        key_field: Option<String>,
    },
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expression,
        schema: Schema,
    },
    Project {
        input: Box<LogicalPlan>,
        expressions: Vec<SelectExpression>,
        schema: Schema,
    },
    Aggregate {
        input: Box<LogicalPlan>,
        group_expressions: Vec<Expression>,
        aggregates: Vec<AggregateExpression>,
        schema: Schema,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        key_field: String,
        schema: Schema,
    },
    Rekey {
        input: Box<LogicalPlan>,
        key_field: String,
        update_row: bool,
        schema: Schema,
    },
    Sink {
        input: Box<LogicalPlan>,
        target: SinkTarget,
        shape: CollectionShape,
        schema: Schema,
    },
}

impl LogicalPlan {
    /// Output schema, fully determined by the subtree at analysis time.
    pub fn schema(&self) -> &Schema {
        match self {
            LogicalPlan::Source { schema, .. }
            | LogicalPlan::Filter { schema, .. }
            | LogicalPlan::Project { schema, .. }
            | LogicalPlan::Aggregate { schema, .. }
            | LogicalPlan::Join { schema, .. }
            | LogicalPlan::Rekey { schema, .. }
            | LogicalPlan::Sink { schema, .. } => schema,
        }
    }

    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Source { .. } => Vec::new(),
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Rekey { input, .. }
            | LogicalPlan::Sink { input, .. } => vec![input],
            LogicalPlan::Join { left, right, .. } => vec![left, right],
        }
    }

    /// Operator kind label used in plan text.
    pub fn kind_label(&self) -> &'static str {
        match self {
            LogicalPlan::Source { .. } => "SOURCE",
            LogicalPlan::Filter { .. } => "FILTER",
            LogicalPlan::Project { .. } => "PROJECT",
            LogicalPlan::Aggregate { .. } => "AGGREGATE",
            LogicalPlan::Join { .. } => "JOIN",
            LogicalPlan::Rekey { .. } => "REKEY",
            LogicalPlan::Sink { .. } => "SINK",
        }
    }
}

/// A statement's logical plan together with the original statement text,
/// kept for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalPlanNode {
    pub statement: String,
    pub root: LogicalPlan,
}

impl LogicalPlanNode {
    pub fn new(statement: impl Into<String>, root: LogicalPlan) -> Self {
        Self {
            statement: statement.into(),
            root,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use streamql_core::{Field, SqlType};

    use super::*;

    fn source() -> LogicalPlan {
        LogicalPlan::Source {
            name: "TEST1".into(),
            schema: Schema::new(vec![
                Field::new("COL0", SqlType::Bigint),
                Field::new("COL1", SqlType::Varchar),
            ])
            .unwrap(),
            shape: CollectionShape::Stream,
            key_field: None,
        }
    }

    #[test]
    fn test_schema_access_through_tree() {
        let plan = LogicalPlan::Project {
            schema: Schema::new(vec![Field::new("COL0", SqlType::Bigint)]).unwrap(),
            expressions: vec![SelectExpression::passthrough("COL0")],
            input: Box::new(source()),
        };
        assert_eq!(plan.schema().len(), 1);
        assert_eq!(plan.children()[0].schema().len(), 2);
        assert_eq!(plan.kind_label(), "PROJECT");
    }

    #[test]
    fn test_shape_rendering() {
        assert_eq!(CollectionShape::Stream.to_string(), "STREAM");
        assert_eq!(CollectionShape::Table.to_string(), "TABLE");
    }
}
