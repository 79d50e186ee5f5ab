//! Runtime boundary and the in-process reference runtime.
//!
//! The physical builder only depends on [`StreamRuntime`]: give it a built
//! topology plus assembled properties, get back a running, stoppable
//! execution. [`LocalRuntime`] interprets topologies on the caller's thread,
//! which is enough for embedded use and for exercising compiled plans in
//! tests; a partition-parallel runtime plugs in behind the same trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use streamql_core::logging::ProcessingEvent;
use streamql_core::{Row, Value};
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::RuntimeProperties;
use crate::error::Result;
use crate::expr::AggregateFunction;
use crate::topology::{NodeId, RecordKey, StepKind, Topology, TopologyStep};

// ---------------------------------------------------------------------------
// Runtime traits
// ---------------------------------------------------------------------------

/// A running, stoppable execution of one compiled topology.
pub trait QueryExecution: Send + Sync {
    /// Stable identity of this execution, e.g. a consumer-group name.
    fn application_id(&self) -> &str;

    fn is_active(&self) -> bool;

    /// Request the runtime to stop processing this topology's partitions.
    /// Idempotent.
    fn stop(&self);
}

/// Factory turning a built topology and assembled configuration into a
/// running execution.
pub trait StreamRuntime: Send + Sync {
    fn start(&self, topology: Topology, properties: RuntimeProperties)
        -> Result<Box<dyn QueryExecution>>;
}

// ---------------------------------------------------------------------------
// Local runtime
// ---------------------------------------------------------------------------

/// In-process, single-threaded topology interpreter. Records published to a
/// named source flow through every active execution synchronously.
#[derive(Default)]
pub struct LocalRuntime {
    executions: Mutex<Vec<Arc<LocalExecution>>>,
    /// Rows written by log sinks, keyed by target name.
    logs: Arc<Mutex<HashMap<String, Vec<(String, Row)>>>>,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one record into every active execution consuming `source`.
    /// Stopped executions are dropped from the registry on the way through.
    pub fn publish(&self, source: &str, key: RecordKey, row: Row) {
        let executions: Vec<Arc<LocalExecution>> = {
            let mut registry = self.executions.lock().expect("runtime poisoned");
            registry.retain(|exec| exec.active.load(Ordering::Acquire));
            registry.clone()
        };
        for exec in executions {
            let source_ids: Vec<NodeId> = exec
                .topology
                .sources_named(source)
                .map(|step| step.id)
                .collect();
            for id in source_ids {
                exec.propagate(id, &key, &row);
            }
        }
    }

    /// Number of registered executions. Stopped executions linger until the
    /// next publish prunes them.
    pub fn execution_count(&self) -> usize {
        self.executions.lock().expect("runtime poisoned").len()
    }

    /// Rows written so far to a persistent output, in arrival order.
    pub fn log(&self, target: &str) -> Vec<(String, Row)> {
        self.logs
            .lock()
            .expect("runtime poisoned")
            .get(&target.to_ascii_uppercase())
            .cloned()
            .unwrap_or_default()
    }
}

impl StreamRuntime for LocalRuntime {
    fn start(
        &self,
        topology: Topology,
        properties: RuntimeProperties,
    ) -> Result<Box<dyn QueryExecution>> {
        let application_id = properties
            .application_id()
            .map(String::from)
            .unwrap_or_else(|| format!("streamql_local_{}", Uuid::new_v4()));
        debug!(application_id = %application_id, steps = topology.steps.len(), "starting topology");
        let execution = Arc::new(LocalExecution {
            application_id,
            topology,
            properties,
            active: AtomicBool::new(true),
            state: Mutex::new(ExecutionState::default()),
            logs: Arc::clone(&self.logs),
        });
        self.executions
            .lock()
            .expect("runtime poisoned")
            .push(Arc::clone(&execution));
        Ok(Box::new(LocalExecutionHandle { inner: execution }))
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

struct LocalExecutionHandle {
    inner: Arc<LocalExecution>,
}

impl QueryExecution for LocalExecutionHandle {
    fn application_id(&self) -> &str {
        &self.inner.application_id
    }

    fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.inner.active.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct ExecutionState {
    /// Materialized table contents keyed by table node, then rendered key.
    tables: HashMap<NodeId, HashMap<String, Row>>,
    /// Aggregate accumulators keyed by aggregate node, then rendered key.
    accumulators: HashMap<NodeId, HashMap<String, Vec<Accumulator>>>,
}

struct LocalExecution {
    application_id: String,
    topology: Topology,
    properties: RuntimeProperties,
    active: AtomicBool,
    state: Mutex<ExecutionState>,
    logs: Arc<Mutex<HashMap<String, Vec<(String, Row)>>>>,
}

impl LocalExecution {
    /// Push one record out of `from` into every consuming step. A join's
    /// table side materializes state instead of emitting.
    fn propagate(&self, from: NodeId, key: &RecordKey, row: &Row) {
        let steps: Vec<TopologyStep> = self.topology.steps.to_vec();
        for step in &steps {
            if step.inputs.contains(&from) {
                self.apply(step, key, row);
            } else if let StepKind::JoinTable { table, .. } = &step.kind {
                if *table == from {
                    self.state
                        .lock()
                        .expect("execution state poisoned")
                        .tables
                        .entry(from)
                        .or_default()
                        .insert(key.render(), row.clone());
                }
            }
        }
    }

    fn apply(&self, step: &TopologyStep, key: &RecordKey, row: &Row) {
        match &step.kind {
            StepKind::Source { .. } => self.propagate(step.id, key, row),
            StepKind::Filter { predicate, schema } => {
                let keep = matches!(
                    predicate.eval(schema, row),
                    Ok(Value::Boolean(true))
                );
                if keep {
                    self.propagate(step.id, key, row);
                }
            }
            StepKind::Select {
                expressions,
                schema,
            } => {
                let mut out = Vec::with_capacity(expressions.len());
                for expr in expressions {
                    match expr.expression.eval(schema, row) {
                        Ok(value) => out.push(value),
                        Err(err) => {
                            error!(step = step.id, error = %err, "projection failed, dropping record");
                            return;
                        }
                    }
                }
                self.propagate(step.id, key, &out);
            }
            StepKind::Rekey { key_index, .. } => {
                let new_key = row
                    .get(*key_index)
                    .cloned()
                    .map(RecordKey::Plain)
                    .unwrap_or(RecordKey::None);
                self.propagate(step.id, &new_key, row);
            }
            StepKind::GroupBy {
                key_expressions,
                schema,
            } => {
                let mut values = Vec::with_capacity(key_expressions.len());
                for expr in key_expressions {
                    match expr.eval(schema, row) {
                        Ok(value) => values.push(value),
                        Err(err) => {
                            error!(step = step.id, error = %err, "group key failed, dropping record");
                            return;
                        }
                    }
                }
                let group_key = match values.as_slice() {
                    [single] => single.clone(),
                    many => Value::Varchar(
                        many.iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>()
                            .join("|"),
                    ),
                };
                self.propagate(step.id, &RecordKey::Plain(group_key), row);
            }
            StepKind::Aggregate {
                group_expressions,
                aggregates,
                schema,
            } => {
                let mut out = Vec::with_capacity(group_expressions.len() + aggregates.len());
                for expr in group_expressions {
                    match expr.eval(schema, row) {
                        Ok(value) => out.push(value),
                        Err(err) => {
                            error!(step = step.id, error = %err, "group column failed, dropping record");
                            return;
                        }
                    }
                }
                {
                    let mut state = self.state.lock().expect("execution state poisoned");
                    let slots = state
                        .accumulators
                        .entry(step.id)
                        .or_default()
                        .entry(key.render())
                        .or_insert_with(|| aggregates.iter().map(|_| Accumulator::default()).collect());
                    for (slot, agg) in slots.iter_mut().zip(aggregates) {
                        let value = match &agg.argument {
                            Some(expr) => expr.eval(schema, row).ok(),
                            None => Some(Value::Bigint(1)),
                        };
                        slot.update(value.as_ref());
                        out.push(slot.output(agg.function));
                    }
                }
                self.propagate(step.id, key, &out);
            }
            StepKind::JoinTable { table, right_width } => {
                let right = {
                    let state = self.state.lock().expect("execution state poisoned");
                    state
                        .tables
                        .get(table)
                        .and_then(|rows| rows.get(&key.render()))
                        .cloned()
                };
                let mut out = row.clone();
                match right {
                    Some(right_row) => out.extend(right_row),
                    None => out.extend(std::iter::repeat(Value::Null).take(*right_width)),
                }
                self.propagate(step.id, key, &out);
            }
            StepKind::LogSink { target } => {
                self.logs
                    .lock()
                    .expect("runtime poisoned")
                    .entry(target.to_ascii_uppercase())
                    .or_default()
                    .push((key.render(), row.clone()));
            }
            StepKind::QueueSink { producer } => {
                if let Err(err) = producer.push(key, Some(row.clone())) {
                    if let Some(logger) = &self.properties.error_logger {
                        logger.log(ProcessingEvent::ProductionError {
                            cause: err.to_string(),
                        });
                    }
                    error!(step = step.id, error = %err, "queue hand-off failed");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

/// Running state for one aggregate column within one group.
#[derive(Debug, Default, Clone)]
struct Accumulator {
    count: i64,
    sum: f64,
    ints_only: bool,
    seen: bool,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    fn update(&mut self, value: Option<&Value>) {
        let Some(value) = value else { return };
        if value.is_null() {
            return;
        }
        let integral = matches!(value, Value::Integer(_) | Value::Bigint(_));
        if !self.seen {
            self.ints_only = integral;
            self.seen = true;
        } else {
            self.ints_only = self.ints_only && integral;
        }
        self.count += 1;
        if let Some(v) = value.as_f64() {
            self.sum += v;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
    }

    fn output(&self, function: AggregateFunction) -> Value {
        match function {
            AggregateFunction::Count => Value::Bigint(self.count),
            AggregateFunction::Sum => self.numeric(self.sum),
            AggregateFunction::Min => self.min.map_or(Value::Null, |v| self.numeric(v)),
            AggregateFunction::Max => self.max.map_or(Value::Null, |v| self.numeric(v)),
        }
    }

    fn numeric(&self, v: f64) -> Value {
        if self.ints_only {
            Value::Bigint(v as i64)
        } else {
            Value::Double(v)
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use streamql_core::{Field, Schema, SqlType};

    use super::*;
    use crate::config::RuntimeProperties;
    use crate::expr::{BinaryOp, Expression, SelectExpression};
    use crate::structured::{LoggerPath, SchemaStream, SchemaTable};
    use crate::topology::TopologyBuilder;

    fn order_schema() -> Schema {
        Schema::new(vec![
            Field::new("ITEMID", SqlType::Varchar),
            Field::new("ORDERUNITS", SqlType::Double),
        ])
        .unwrap()
    }

    fn properties() -> RuntimeProperties {
        RuntimeProperties {
            entries: HashMap::new(),
            error_logger: None,
        }
    }

    fn plain(key: &str) -> RecordKey {
        RecordKey::Plain(Value::Varchar(key.into()))
    }

    #[test]
    fn test_filter_and_project_flow_to_log() {
        let builder = Arc::new(TopologyBuilder::new());
        let source = SchemaStream::source(
            Arc::clone(&builder),
            "ORDERS",
            order_schema(),
            None,
            LoggerPath::new("q"),
        )
        .unwrap();
        let filtered = source.filter(
            Expression::binary(
                BinaryOp::Gt,
                Expression::column("ORDERUNITS"),
                Expression::literal(Value::Double(5.0)),
            ),
            LoggerPath::new("q"),
        );
        let projected = filtered
            .select(
                vec![SelectExpression::passthrough("ITEMID")],
                LoggerPath::new("q"),
            )
            .unwrap();
        projected.into_log("OUT", LoggerPath::new("q"));

        let runtime = LocalRuntime::new();
        let execution = runtime.start(builder.build(), properties()).unwrap();

        runtime.publish(
            "ORDERS",
            plain("a"),
            vec![Value::Varchar("item_1".into()), Value::Double(10.0)],
        );
        runtime.publish(
            "ORDERS",
            plain("b"),
            vec![Value::Varchar("item_2".into()), Value::Double(2.0)],
        );

        let rows = runtime.log("OUT");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, vec![Value::Varchar("item_1".into())]);
        assert!(execution.is_active());
    }

    #[test]
    fn test_stopped_execution_ignores_records() {
        let builder = Arc::new(TopologyBuilder::new());
        let source = SchemaStream::source(
            Arc::clone(&builder),
            "ORDERS",
            order_schema(),
            None,
            LoggerPath::new("q"),
        )
        .unwrap();
        source.into_log("OUT2", LoggerPath::new("q"));

        let runtime = LocalRuntime::new();
        let execution = runtime.start(builder.build(), properties()).unwrap();
        execution.stop();
        assert!(!execution.is_active());

        runtime.publish("ORDERS", plain("a"), vec![Value::Null, Value::Null]);
        assert!(runtime.log("OUT2").is_empty());
    }

    #[test]
    fn test_publish_prunes_stopped_executions() {
        let runtime = LocalRuntime::new();
        let mut handles = Vec::new();
        for n in 0..3 {
            let builder = Arc::new(TopologyBuilder::new());
            let source = SchemaStream::source(
                Arc::clone(&builder),
                "ORDERS",
                order_schema(),
                None,
                LoggerPath::new("q"),
            )
            .unwrap();
            source.into_log(format!("OUT_{n}"), LoggerPath::new("q"));
            handles.push(runtime.start(builder.build(), properties()).unwrap());
        }
        assert_eq!(runtime.execution_count(), 3);

        handles[0].stop();
        handles[2].stop();
        runtime.publish(
            "ORDERS",
            plain("a"),
            vec![Value::Varchar("item_1".into()), Value::Double(1.0)],
        );

        // Only the live execution remains registered and only it saw the row.
        assert_eq!(runtime.execution_count(), 1);
        assert_eq!(runtime.log("OUT_1").len(), 1);
        assert!(runtime.log("OUT_0").is_empty());
        assert!(runtime.log("OUT_2").is_empty());
    }

    #[test]
    fn test_group_by_sum_updates_per_key() {
        use crate::expr::{AggregateExpression, AggregateFunction};

        let builder = Arc::new(TopologyBuilder::new());
        let source = SchemaStream::source(
            Arc::clone(&builder),
            "ORDERS",
            order_schema(),
            None,
            LoggerPath::new("q"),
        )
        .unwrap();
        let grouped = source.group_by(vec![Expression::column("ITEMID")], LoggerPath::new("q"));
        let table = grouped.aggregate(
            vec![AggregateExpression::new(
                AggregateFunction::Sum,
                Some(Expression::column("ORDERUNITS")),
                "TOTAL",
            )],
            Schema::new(vec![
                Field::new("ITEMID", SqlType::Varchar),
                Field::new("TOTAL", SqlType::Double),
            ])
            .unwrap(),
            LoggerPath::new("q"),
        );
        table.into_log("TOTALS", LoggerPath::new("q"));

        let runtime = LocalRuntime::new();
        runtime.start(builder.build(), properties()).unwrap();

        runtime.publish(
            "ORDERS",
            plain("x"),
            vec![Value::Varchar("item_1".into()), Value::Double(2.0)],
        );
        runtime.publish(
            "ORDERS",
            plain("y"),
            vec![Value::Varchar("item_1".into()), Value::Double(3.0)],
        );

        let rows = runtime.log("TOTALS");
        assert_eq!(rows.len(), 2);
        // Continuous refinement: second update carries the running total.
        assert_eq!(
            rows[1].1,
            vec![Value::Varchar("item_1".into()), Value::Double(5.0)]
        );
        assert_eq!(rows[1].0, "item_1");
    }

    #[test]
    fn test_left_join_pads_nulls_on_miss() {
        let builder = Arc::new(TopologyBuilder::new());
        let stream = SchemaStream::source(
            Arc::clone(&builder),
            "ORDERS",
            order_schema(),
            Some("ITEMID".into()),
            LoggerPath::new("q"),
        )
        .unwrap();
        let table = SchemaTable::source(
            Arc::clone(&builder),
            "ITEMS",
            Schema::new(vec![
                Field::new("ID", SqlType::Varchar),
                Field::new("NAME", SqlType::Varchar),
            ])
            .unwrap(),
            Some("ID".into()),
            LoggerPath::new("q"),
        )
        .unwrap();
        let join_schema = order_schema().join(table.schema()).unwrap();
        let joined = stream
            .left_join(&table, join_schema, "ITEMID", LoggerPath::new("q"))
            .unwrap();
        joined.into_log("ENRICHED", LoggerPath::new("q"));

        let runtime = LocalRuntime::new();
        runtime.start(builder.build(), properties()).unwrap();

        // Miss: table has no row for item_1 yet.
        runtime.publish(
            "ORDERS",
            plain("item_1"),
            vec![Value::Varchar("item_1".into()), Value::Double(1.0)],
        );
        // Materialize the table row, then hit.
        runtime.publish(
            "ITEMS",
            plain("item_1"),
            vec![Value::Varchar("item_1".into()), Value::Varchar("Home Appliances".into())],
        );
        runtime.publish(
            "ORDERS",
            plain("item_1"),
            vec![Value::Varchar("item_1".into()), Value::Double(2.0)],
        );

        let rows = runtime.log("ENRICHED");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1[2], Value::Null);
        assert_eq!(rows[0].1[3], Value::Null);
        assert_eq!(rows[1].1[3], Value::Varchar("Home Appliances".into()));
    }
}
