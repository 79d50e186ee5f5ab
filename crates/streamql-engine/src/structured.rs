//! Schema-aware streaming operators.
//!
//! The physical builder materializes each logical node into one of these.
//! Operators come in two collection shapes, an append-only [`SchemaStream`]
//! and a continuously-updated keyed [`SchemaTable`], plus a grouped
//! intermediate and two terminal forms. Every transformation returns a new
//! operator with a derived schema and lineage back to its sources; nothing
//! mutates the receiver. Terminal operators are distinct types with no
//! transformation methods at all, so composing past a sink does not compile.

use std::sync::Arc;

use streamql_core::{Field, Schema};

use crate::error::{Error, Result};
use crate::expr::{AggregateExpression, Expression, SelectExpression};
use crate::queue::{bounded_row_queue, RowQueue};
use crate::topology::{NodeId, StepKind, TopologyBuilder};

// ---------------------------------------------------------------------------
// Logger paths and lineage
// ---------------------------------------------------------------------------

/// Hierarchical processing-log path, one segment per operator under the
/// owning query id, e.g. `InsertQuery_1.Project`.
#[derive(Debug, Clone)]
pub struct LoggerPath {
    segments: Vec<String>,
}

impl LoggerPath {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            segments: vec![root.into()],
        }
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn render(&self) -> String {
        self.segments.join(".")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Source,
    Filter,
    Project,
    Rekey,
    GroupBy,
    Aggregate,
    Join,
    Sink,
}

/// Immediate upstream operator reference, kept for debugging and plan
/// inspection rather than re-execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorLineage {
    pub kind: OperatorKind,
    pub node: NodeId,
}

// ---------------------------------------------------------------------------
// SchemaStream
// ---------------------------------------------------------------------------

/// An append-only record stream with a known schema and key descriptor.
#[derive(Debug, Clone)]
pub struct SchemaStream {
    builder: Arc<TopologyBuilder>,
    node: NodeId,
    schema: Schema,
    key_field: Option<String>,
    sources: Vec<OperatorLineage>,
    logger: LoggerPath,
}

impl SchemaStream {
    /// Root operator over a named input log. The key descriptor, when
    /// present, must name a schema field.
    pub fn source(
        builder: Arc<TopologyBuilder>,
        name: impl Into<String>,
        schema: Schema,
        key_field: Option<String>,
        logger: LoggerPath,
    ) -> Result<Self> {
        let name = name.into();
        if let Some(key) = &key_field {
            if !schema.contains(key) {
                return Err(Error::UnknownField(key.clone()));
            }
        }
        let node = builder.add_step(StepKind::Source { name }, vec![]);
        Ok(Self {
            builder,
            node,
            schema,
            key_field,
            sources: Vec::new(),
            logger,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn sources(&self) -> &[OperatorLineage] {
        &self.sources
    }

    pub fn logger_path(&self) -> String {
        self.logger.render()
    }

    fn lineage(&self, kind: OperatorKind) -> Vec<OperatorLineage> {
        vec![OperatorLineage {
            kind,
            node: self.node,
        }]
    }

    /// Drop rows whose predicate evaluates false or null. Schema and key are
    /// unchanged.
    pub fn filter(&self, predicate: Expression, logger: LoggerPath) -> SchemaStream {
        let node = self.builder.add_step(
            StepKind::Filter {
                predicate,
                schema: self.schema.clone(),
            },
            vec![self.node],
        );
        SchemaStream {
            builder: Arc::clone(&self.builder),
            node,
            schema: self.schema.clone(),
            key_field: self.key_field.clone(),
            sources: self.lineage(OperatorKind::Filter),
            logger,
        }
    }

    /// Project to a new schema. The current key field, when one exists and
    /// is not already selected, is prepended to keep routing intact.
    pub fn select(
        &self,
        expressions: Vec<SelectExpression>,
        logger: LoggerPath,
    ) -> Result<SchemaStream> {
        let (expressions, schema, key_field) =
            project(&self.schema, self.key_field.as_deref(), expressions)?;
        let node = self.builder.add_step(
            StepKind::Select {
                expressions,
                schema: self.schema.clone(),
            },
            vec![self.node],
        );
        Ok(SchemaStream {
            builder: Arc::clone(&self.builder),
            node,
            schema,
            key_field,
            sources: self.lineage(OperatorKind::Project),
            logger,
        })
    }

    /// Repartition by an existing field. Triggers a shuffle in the runtime;
    /// schema is unchanged, only the key descriptor moves.
    pub fn select_key(
        &self,
        new_key: &str,
        update_row: bool,
        logger: LoggerPath,
    ) -> Result<SchemaStream> {
        let (key_index, field) = self
            .schema
            .field(new_key)
            .ok_or_else(|| Error::UnknownField(new_key.to_string()))?;
        let key_field = Some(field.name.clone());
        let node = self.builder.add_step(
            StepKind::Rekey {
                key_index,
                update_row,
            },
            vec![self.node],
        );
        Ok(SchemaStream {
            builder: Arc::clone(&self.builder),
            node,
            schema: self.schema.clone(),
            key_field,
            sources: self.lineage(OperatorKind::Rekey),
            logger,
        })
    }

    /// Group by the given expressions, producing the intermediate a
    /// downstream aggregate consumes.
    pub fn group_by(
        &self,
        key_expressions: Vec<Expression>,
        logger: LoggerPath,
    ) -> GroupedSchemaStream {
        let node = self.builder.add_step(
            StepKind::GroupBy {
                key_expressions: key_expressions.clone(),
                schema: self.schema.clone(),
            },
            vec![self.node],
        );
        GroupedSchemaStream {
            builder: Arc::clone(&self.builder),
            node,
            schema: self.schema.clone(),
            key_expressions,
            sources: self.lineage(OperatorKind::GroupBy),
            logger,
        }
    }

    /// Stream-table left join. Output schema is the declared join schema;
    /// unmatched probes pad the table side with nulls.
    pub fn left_join(
        &self,
        table: &SchemaTable,
        join_schema: Schema,
        key_field: &str,
        logger: LoggerPath,
    ) -> Result<SchemaStream> {
        if !join_schema.contains(key_field) {
            return Err(Error::UnknownField(key_field.to_string()));
        }
        let node = self.builder.add_step(
            StepKind::JoinTable {
                table: table.node,
                right_width: table.schema.len(),
            },
            vec![self.node],
        );
        let mut sources = self.lineage(OperatorKind::Join);
        sources.push(OperatorLineage {
            kind: OperatorKind::Join,
            node: table.node,
        });
        Ok(SchemaStream {
            builder: Arc::clone(&self.builder),
            node,
            schema: join_schema,
            key_field: Some(key_field.to_string()),
            sources,
            logger,
        })
    }

    /// Terminal write to a persistent output log.
    pub fn into_log(self, target: impl Into<String>, logger: LoggerPath) -> LogSinkOperator {
        let target = target.into();
        let node = self
            .builder
            .add_step(StepKind::LogSink { target }, vec![self.node]);
        LogSinkOperator {
            node,
            schema: self.schema,
            key_field: self.key_field,
            logger,
        }
    }

    /// Terminal pull boundary: attach a bounded queue the caller drains.
    pub fn into_queue(self, capacity: usize, logger: LoggerPath) -> QueuedSink {
        let (producer, queue) = bounded_row_queue(capacity);
        let node = self
            .builder
            .add_step(StepKind::QueueSink { producer }, vec![self.node]);
        QueuedSink {
            node,
            schema: self.schema,
            key_field: self.key_field,
            queue,
            logger,
        }
    }
}

// ---------------------------------------------------------------------------
// GroupedSchemaStream
// ---------------------------------------------------------------------------

/// Grouped intermediate between `group_by` and an aggregate. Not itself
/// queryable; its only continuation is [`GroupedSchemaStream::aggregate`].
#[derive(Debug, Clone)]
pub struct GroupedSchemaStream {
    builder: Arc<TopologyBuilder>,
    node: NodeId,
    schema: Schema,
    key_expressions: Vec<Expression>,
    sources: Vec<OperatorLineage>,
    logger: LoggerPath,
}

impl GroupedSchemaStream {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn sources(&self) -> &[OperatorLineage] {
        &self.sources
    }

    /// Fold each group into one continuously-updated row. The output schema
    /// comes from the logical layer, which already placed group columns
    /// ahead of aggregate columns.
    pub fn aggregate(
        &self,
        aggregates: Vec<AggregateExpression>,
        output_schema: Schema,
        logger: LoggerPath,
    ) -> SchemaTable {
        let key_field = match self.key_expressions.as_slice() {
            [Expression::Column(name)] => Some(name.clone()),
            _ => None,
        };
        let node = self.builder.add_step(
            StepKind::Aggregate {
                group_expressions: self.key_expressions.clone(),
                aggregates,
                schema: self.schema.clone(),
            },
            vec![self.node],
        );
        SchemaTable {
            builder: Arc::clone(&self.builder),
            node,
            schema: output_schema,
            key_field,
            sources: vec![OperatorLineage {
                kind: OperatorKind::Aggregate,
                node: self.node,
            }],
            logger,
        }
    }
}

// ---------------------------------------------------------------------------
// SchemaTable
// ---------------------------------------------------------------------------

/// A continuously-updated keyed table. Each arriving row upserts its key.
#[derive(Debug, Clone)]
pub struct SchemaTable {
    builder: Arc<TopologyBuilder>,
    node: NodeId,
    schema: Schema,
    key_field: Option<String>,
    sources: Vec<OperatorLineage>,
    logger: LoggerPath,
}

impl SchemaTable {
    /// Root operator over a named input log materialized as a table.
    pub fn source(
        builder: Arc<TopologyBuilder>,
        name: impl Into<String>,
        schema: Schema,
        key_field: Option<String>,
        logger: LoggerPath,
    ) -> Result<Self> {
        let name = name.into();
        if let Some(key) = &key_field {
            if !schema.contains(key) {
                return Err(Error::UnknownField(key.clone()));
            }
        }
        let node = builder.add_step(StepKind::Source { name }, vec![]);
        Ok(Self {
            builder,
            node,
            schema,
            key_field,
            sources: Vec::new(),
            logger,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn sources(&self) -> &[OperatorLineage] {
        &self.sources
    }

    pub fn logger_path(&self) -> String {
        self.logger.render()
    }

    pub fn filter(&self, predicate: Expression, logger: LoggerPath) -> SchemaTable {
        let node = self.builder.add_step(
            StepKind::Filter {
                predicate,
                schema: self.schema.clone(),
            },
            vec![self.node],
        );
        SchemaTable {
            builder: Arc::clone(&self.builder),
            node,
            schema: self.schema.clone(),
            key_field: self.key_field.clone(),
            sources: vec![OperatorLineage {
                kind: OperatorKind::Filter,
                node: self.node,
            }],
            logger,
        }
    }

    pub fn select(
        &self,
        expressions: Vec<SelectExpression>,
        logger: LoggerPath,
    ) -> Result<SchemaTable> {
        let (expressions, schema, key_field) =
            project(&self.schema, self.key_field.as_deref(), expressions)?;
        let node = self.builder.add_step(
            StepKind::Select {
                expressions,
                schema: self.schema.clone(),
            },
            vec![self.node],
        );
        Ok(SchemaTable {
            builder: Arc::clone(&self.builder),
            node,
            schema,
            key_field,
            sources: vec![OperatorLineage {
                kind: OperatorKind::Project,
                node: self.node,
            }],
            logger,
        })
    }

    pub fn into_log(self, target: impl Into<String>, logger: LoggerPath) -> LogSinkOperator {
        let target = target.into();
        let node = self
            .builder
            .add_step(StepKind::LogSink { target }, vec![self.node]);
        LogSinkOperator {
            node,
            schema: self.schema,
            key_field: self.key_field,
            logger,
        }
    }

    pub fn into_queue(self, capacity: usize, logger: LoggerPath) -> QueuedSink {
        let (producer, queue) = bounded_row_queue(capacity);
        let node = self
            .builder
            .add_step(StepKind::QueueSink { producer }, vec![self.node]);
        QueuedSink {
            node,
            schema: self.schema,
            key_field: self.key_field,
            queue,
            logger,
        }
    }
}

// ---------------------------------------------------------------------------
// Terminal operators
// ---------------------------------------------------------------------------

/// Leaf writing to a persistent output log. Offers no transformations.
#[derive(Debug)]
pub struct LogSinkOperator {
    node: NodeId,
    schema: Schema,
    key_field: Option<String>,
    logger: LoggerPath,
}

impl LogSinkOperator {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn logger_path(&self) -> String {
        self.logger.render()
    }
}

/// Leaf handing records to a bounded pull queue. Offers no transformations.
#[derive(Debug)]
pub struct QueuedSink {
    node: NodeId,
    schema: Schema,
    key_field: Option<String>,
    queue: RowQueue,
    logger: LoggerPath,
}

impl QueuedSink {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn logger_path(&self) -> String {
        self.logger.render()
    }

    pub fn queue(&self) -> &RowQueue {
        &self.queue
    }

    pub fn take_queue(self) -> RowQueue {
        self.queue
    }
}

// ---------------------------------------------------------------------------
// Projection helper
// ---------------------------------------------------------------------------

/// Derive a projection's final expression list, output schema, and key
/// descriptor. The existing key field is prepended when not already part of
/// the selection.
fn project(
    schema: &Schema,
    key_field: Option<&str>,
    mut expressions: Vec<SelectExpression>,
) -> Result<(Vec<SelectExpression>, Schema, Option<String>)> {
    let mut new_key = None;
    if let Some(key) = key_field {
        let selected = expressions.iter().find(|e| {
            e.alias.eq_ignore_ascii_case(key)
                || matches!(&e.expression, Expression::Column(name) if name.eq_ignore_ascii_case(key))
        });
        match selected {
            Some(expr) => new_key = Some(expr.alias.clone()),
            None => {
                expressions.insert(0, SelectExpression::passthrough(key));
                new_key = Some(key.to_string());
            }
        }
    }
    let mut fields = Vec::with_capacity(expressions.len());
    for expr in &expressions {
        fields.push(Field::new(
            expr.alias.clone(),
            expr.expression.infer_type(schema)?,
        ));
    }
    let schema = Schema::new(fields)?;
    Ok((expressions, schema, new_key))
}

// ===========================================================================
// Tests
// ===========================================================================
