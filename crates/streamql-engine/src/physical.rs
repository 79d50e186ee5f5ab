//! The physical plan builder: compiles a logical plan into schema-aware
//! operators registered on a topology, validates sink compatibility, and
//! starts the result on the runtime.
//!
//! Compilation is recursive post-order: children first, then the parent's
//! transformation applied through the operator family. Schemas are taken
//! verbatim from the logical layer; the builder validates only at sink
//! boundaries, and a statement that fails validation starts nothing.

use std::collections::HashMap;
use std::sync::Arc;

use streamql_core::logging::ProcessingLogContext;
use streamql_core::Schema;
use tracing::info;

use crate::catalog::{MetaStore, SinkDescriptor};
use crate::config::{
    append_to_list_property, EngineConfig, PropertyValue, RuntimeProperties, APPLICATION_ID,
    CONSUMER_COLLECTOR_CLASS, CONSUMER_INTERCEPTOR_CLASSES, PRODUCER_COLLECTOR_CLASS,
    PRODUCER_INTERCEPTOR_CLASSES, SERVICE_ID_PREFIX,
};
use crate::error::{Error, Result};
use crate::logical::{CollectionShape, LogicalPlan, LogicalPlanNode, SinkMode, SinkTarget};
use crate::query::{PlanStep, QueryIdGenerator, QueryMetadata};
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::runtime::StreamRuntime;
use crate::structured::{LoggerPath, SchemaStream, SchemaTable};
use crate::topology::TopologyBuilder;

// ---------------------------------------------------------------------------
// Compiled operators
// ---------------------------------------------------------------------------

/// A compiled subtree, tagged by collection shape.
enum CompiledOp {
    Stream(SchemaStream),
    Table(SchemaTable),
}

impl CompiledOp {
    fn shape(&self) -> CollectionShape {
        match self {
            CompiledOp::Stream(_) => CollectionShape::Stream,
            CompiledOp::Table(_) => CollectionShape::Table,
        }
    }

    fn schema(&self) -> &Schema {
        match self {
            CompiledOp::Stream(s) => s.schema(),
            CompiledOp::Table(t) => t.schema(),
        }
    }

    fn key_field(&self) -> Option<&str> {
        match self {
            CompiledOp::Stream(s) => s.key_field(),
            CompiledOp::Table(t) => t.key_field(),
        }
    }

    fn logger_path(&self) -> String {
        match self {
            CompiledOp::Stream(s) => s.logger_path(),
            CompiledOp::Table(t) => t.logger_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Compiles one statement at a time. The topology builder is owned per
/// statement; metastore, id generator, and runtime are shared across
/// statements.
pub struct PhysicalPlanBuilder {
    topology: Arc<TopologyBuilder>,
    config: EngineConfig,
    overrides: HashMap<String, PropertyValue>,
    metastore: Arc<dyn MetaStore>,
    log_context: ProcessingLogContext,
    query_ids: Arc<QueryIdGenerator>,
    runtime: Arc<dyn StreamRuntime>,
}

impl PhysicalPlanBuilder {
    pub fn new(
        topology: Arc<TopologyBuilder>,
        config: EngineConfig,
        metastore: Arc<dyn MetaStore>,
        log_context: ProcessingLogContext,
        overrides: HashMap<String, PropertyValue>,
        query_ids: Arc<QueryIdGenerator>,
        runtime: Arc<dyn StreamRuntime>,
    ) -> Self {
        Self {
            topology,
            config,
            overrides,
            metastore,
            log_context,
            query_ids,
            runtime,
        }
    }

    /// Namespaced service identity prefixing every application id.
    pub fn service_id(&self) -> String {
        format!("{SERVICE_ID_PREFIX}{}", self.config.service_id)
    }

    /// Compile, validate, and start one statement. On any validation error
    /// the runtime is never invoked; a CREATE sink is registered only after
    /// the runtime has accepted the topology.
    pub fn build_physical_plan(&self, plan: &LogicalPlanNode) -> Result<QueryMetadata> {
        let LogicalPlan::Sink {
            input,
            target,
            shape: declared_shape,
            ..
        } = &plan.root
        else {
            return Err(Error::statement(
                &plan.statement,
                "Logical plan root must be a sink",
            ));
        };

        let query_id = self.query_ids.next_id(target, *declared_shape);
        let logger_root = LoggerPath::new(&query_id);
        let (compiled, child_plan) = self.compile(input, &plan.statement, &logger_root)?;

        let result_shape = compiled.shape();
        let result_schema = compiled.schema().clone();

        let (root_plan, queue, sink_name, pending_sink) = match target {
            SinkTarget::Log { name, mode } => {
                self.validate_log_sink(plan, name, *mode, &compiled)?;
                let pending = (*mode == SinkMode::Create).then(|| {
                    SinkDescriptor::new(
                        name.clone(),
                        result_schema.clone(),
                        compiled.key_field().map(String::from),
                        result_shape,
                    )
                });
                let logger = logger_root.child(name);
                let sink = match compiled {
                    CompiledOp::Stream(s) => s.into_log(name.clone(), logger),
                    CompiledOp::Table(t) => t.into_log(name.clone(), logger),
                };
                let root = PlanStep::new(
                    "SINK",
                    sink.schema().clone(),
                    sink.logger_path(),
                    vec![child_plan],
                );
                (root, None, Some(name.clone()), pending)
            }
            SinkTarget::Queue => {
                let logger = logger_root.child("Queue");
                let sink = match compiled {
                    CompiledOp::Stream(s) => s.into_queue(DEFAULT_QUEUE_CAPACITY, logger),
                    CompiledOp::Table(t) => t.into_queue(DEFAULT_QUEUE_CAPACITY, logger),
                };
                let root = PlanStep::new(
                    "SINK",
                    sink.schema().clone(),
                    sink.logger_path(),
                    vec![child_plan],
                );
                (root, Some(sink.take_queue()), None, None)
            }
        };

        let properties = self.assemble_properties(&query_id);
        let execution = self.runtime.start(self.topology.build(), properties)?;

        // A new sink becomes visible only once its query is running; a
        // failed start must not leave a registration behind.
        if let Some(descriptor) = pending_sink {
            if let Err(err) = self.metastore.register_sink(descriptor) {
                execution.stop();
                return Err(err);
            }
        }

        info!(
            query_id = %query_id,
            application_id = %execution.application_id(),
            shape = %result_shape,
            "statement compiled and started"
        );

        Ok(QueryMetadata::new(
            query_id,
            plan.statement.clone(),
            root_plan.render(),
            result_shape,
            sink_name,
            execution,
            queue,
        ))
    }

    // -----------------------------------------------------------------------
    // Sink validation
    // -----------------------------------------------------------------------

    fn validate_log_sink(
        &self,
        plan: &LogicalPlanNode,
        name: &str,
        mode: SinkMode,
        compiled: &CompiledOp,
    ) -> Result<()> {
        let existing = self.metastore.sink(name);
        match mode {
            SinkMode::Create => {
                if existing.is_some() {
                    return Err(Error::statement(
                        &plan.statement,
                        format!("Cannot create {name}. A sink with the same name already exists."),
                    ));
                }
                Ok(())
            }
            SinkMode::InsertInto => {
                let Some(sink) = existing else {
                    return Err(Error::statement(
                        &plan.statement,
                        format!("Sink does not exist for the INSERT INTO statement: {name}"),
                    ));
                };
                if sink.shape == CollectionShape::Table {
                    return Err(Error::statement(
                        &plan.statement,
                        format!(
                            "INSERT INTO can only be used to insert into a stream. {name} is a table."
                        ),
                    ));
                }
                if compiled.shape() != sink.shape {
                    return Err(Error::statement(
                        &plan.statement,
                        format!(
                            "Incompatible data sink and query result. Data sink ({name}) type is {} but select query result is {}.",
                            sink.shape,
                            compiled.shape()
                        ),
                    ));
                }
                if compiled.schema() != &sink.schema {
                    return Err(Error::statement(
                        &plan.statement,
                        format!(
                            "Incompatible schema between results and sink. Result schema is {}, but the sink schema is {}.",
                            compiled.schema().render(),
                            sink.schema.render()
                        ),
                    ));
                }
                let keys_match = match (compiled.key_field(), sink.key_field.as_deref()) {
                    (Some(result), Some(declared)) => result.eq_ignore_ascii_case(declared),
                    (None, None) => true,
                    _ => false,
                };
                if !keys_match {
                    return Err(Error::statement(
                        &plan.statement,
                        format!(
                            "Incompatible key fields for sink and results. Sink key field is {} while result key field is {}",
                            sink.key_field.as_deref().unwrap_or("null"),
                            compiled.key_field().unwrap_or("null")
                        ),
                    ));
                }
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Recursive compilation
    // -----------------------------------------------------------------------

    fn compile(
        &self,
        node: &LogicalPlan,
        statement: &str,
        logger_root: &LoggerPath,
    ) -> Result<(CompiledOp, PlanStep)> {
        match node {
            LogicalPlan::Source {
                name,
                schema,
                shape,
                key_field,
            } => {
                let logger = logger_root.child("Source");
                let op = match shape {
                    CollectionShape::Stream => CompiledOp::Stream(SchemaStream::source(
                        Arc::clone(&self.topology),
                        name.clone(),
                        schema.clone(),
                        key_field.clone(),
                        logger,
                    )?),
                    CollectionShape::Table => CompiledOp::Table(SchemaTable::source(
                        Arc::clone(&self.topology),
                        name.clone(),
                        schema.clone(),
                        key_field.clone(),
                        logger,
                    )?),
                };
                let step = PlanStep::new("SOURCE", schema.clone(), op.logger_path(), vec![]);
                Ok((op, step))
            }
            LogicalPlan::Filter {
                input,
                predicate,
                schema,
            } => {
                let (child, child_step) = self.compile(input, statement, logger_root)?;
                let logger = logger_root.child("Filter");
                let op = match child {
                    CompiledOp::Stream(s) => {
                        CompiledOp::Stream(s.filter(predicate.clone(), logger))
                    }
                    CompiledOp::Table(t) => CompiledOp::Table(t.filter(predicate.clone(), logger)),
                };
                let step =
                    PlanStep::new("FILTER", schema.clone(), op.logger_path(), vec![child_step]);
                Ok((op, step))
            }
            LogicalPlan::Project {
                input,
                expressions,
                schema,
            } => {
                let (child, child_step) = self.compile(input, statement, logger_root)?;
                let logger = logger_root.child("Project");
                let op = match child {
                    CompiledOp::Stream(s) => {
                        CompiledOp::Stream(s.select(expressions.clone(), logger)?)
                    }
                    CompiledOp::Table(t) => CompiledOp::Table(t.select(expressions.clone(), logger)?),
                };
                let step =
                    PlanStep::new("PROJECT", schema.clone(), op.logger_path(), vec![child_step]);
                Ok((op, step))
            }
            LogicalPlan::Rekey {
                input,
                key_field,
                update_row,
                schema,
            } => {
                let (child, child_step) = self.compile(input, statement, logger_root)?;
                let CompiledOp::Stream(stream) = child else {
                    return Err(Error::statement(
                        statement,
                        "PARTITION BY is only supported on streams.",
                    ));
                };
                let logger = logger_root.child("Rekey");
                let op = CompiledOp::Stream(stream.select_key(key_field, *update_row, logger)?);
                let step =
                    PlanStep::new("REKEY", schema.clone(), op.logger_path(), vec![child_step]);
                Ok((op, step))
            }
            LogicalPlan::Aggregate {
                input,
                group_expressions,
                aggregates,
                schema,
            } => {
                let (child, child_step) = self.compile(input, statement, logger_root)?;
                let CompiledOp::Stream(stream) = child else {
                    return Err(Error::statement(
                        statement,
                        "GROUP BY is only supported on streams.",
                    ));
                };
                let grouped =
                    stream.group_by(group_expressions.clone(), logger_root.child("GroupBy"));
                let table = grouped.aggregate(
                    aggregates.clone(),
                    schema.clone(),
                    logger_root.child("Aggregate"),
                );
                let step = PlanStep::new(
                    "AGGREGATE",
                    schema.clone(),
                    table.logger_path(),
                    vec![child_step],
                );
                Ok((CompiledOp::Table(table), step))
            }
            LogicalPlan::Join {
                left,
                right,
                key_field,
                schema,
            } => {
                let (left_op, left_step) = self.compile(left, statement, logger_root)?;
                let (right_op, right_step) = self.compile(right, statement, logger_root)?;
                let (CompiledOp::Stream(stream), CompiledOp::Table(table)) = (left_op, right_op)
                else {
                    return Err(Error::statement(
                        statement,
                        "Join is only supported between a stream and a table.",
                    ));
                };
                let logger = logger_root.child("Join");
                let joined = stream.left_join(&table, schema.clone(), key_field, logger)?;
                let step = PlanStep::new(
                    "JOIN",
                    schema.clone(),
                    joined.logger_path(),
                    vec![left_step, right_step],
                );
                Ok((CompiledOp::Stream(joined), step))
            }
            LogicalPlan::Sink { .. } => Err(Error::statement(
                statement,
                "Sink must be the root of the logical plan",
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Runtime property assembly
    // -----------------------------------------------------------------------

    /// Engine config merged with statement overrides, instrumentation
    /// interceptors appended, application id and error logger attached.
    fn assemble_properties(&self, query_id: &str) -> RuntimeProperties {
        let mut entries = self.config.merged_with(&self.overrides);
        entries.insert(
            APPLICATION_ID.to_string(),
            PropertyValue::str(format!("{}{query_id}", self.service_id())),
        );
        append_to_list_property(
            &mut entries,
            CONSUMER_INTERCEPTOR_CLASSES,
            CONSUMER_COLLECTOR_CLASS,
        );
        append_to_list_property(
            &mut entries,
            PRODUCER_INTERCEPTOR_CLASSES,
            PRODUCER_COLLECTOR_CLASS,
        );
        RuntimeProperties {
            entries,
            error_logger: Some(self.log_context.logger(query_id.to_string())),
        }
    }
}
