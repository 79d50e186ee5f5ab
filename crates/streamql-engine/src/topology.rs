//! Dataflow topology registration.
//!
//! The physical builder registers one step per operator; the external
//! runtime (or the in-process [`crate::runtime::LocalRuntime`]) interprets
//! the resulting [`Topology`]. Steps reference each other by id, parents
//! naming their inputs, so a built topology is a plain dag description with
//! no behavior of its own.

use std::fmt;
use std::sync::Mutex;

use streamql_core::{Schema, Value};

use crate::expr::{AggregateExpression, Expression, SelectExpression};
use crate::queue::QueueProducer;

// ---------------------------------------------------------------------------
// Record keys
// ---------------------------------------------------------------------------

/// A time window attached to a windowed aggregate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Window{{start={}, end={}}}", self.start_ms, self.end_ms)
    }
}

/// The routing key attached to a record in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKey {
    None,
    Plain(Value),
    Windowed { key: Value, window: TimeWindow },
}

impl RecordKey {
    /// String form used for pull-queue hand-off and output logs. Windowed
    /// keys render as `"<key> : <window>"`.
    pub fn render(&self) -> String {
        match self {
            RecordKey::None => "null".to_string(),
            RecordKey::Plain(value) => value.to_string(),
            RecordKey::Windowed { key, window } => format!("{key} : {window}"),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

pub type NodeId = usize;

/// What one registered step does to each record reaching it. Steps that
/// evaluate expressions carry their input schema so the runtime can resolve
/// column references.
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Consume a named input log.
    Source { name: String },
    Filter {
        predicate: Expression,
        schema: Schema,
    },
    Select {
        expressions: Vec<SelectExpression>,
        schema: Schema,
    },
    /// Re-route by the value at `key_index`. `update_row` asks the runtime
    /// to also rewrite any key column it materializes in the row itself.
    Rekey { key_index: usize, update_row: bool },
    GroupBy {
        key_expressions: Vec<Expression>,
        schema: Schema,
    },
    Aggregate {
        group_expressions: Vec<Expression>,
        aggregates: Vec<AggregateExpression>,
        schema: Schema,
    },
    /// Stream-table left join: probe the materialized state of `table` with
    /// the record key; misses pad `right_width` nulls.
    JoinTable { table: NodeId, right_width: usize },
    /// Write to a persistent named output.
    LogSink { target: String },
    /// Push `(rendered key, row)` into a bounded pull queue.
    QueueSink { producer: QueueProducer },
}

#[derive(Debug, Clone)]
pub struct TopologyStep {
    pub id: NodeId,
    pub kind: StepKind,
    pub inputs: Vec<NodeId>,
}

/// An immutable description of a compiled dataflow.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub steps: Vec<TopologyStep>,
}

impl Topology {
    /// Steps that consume the output of `id` directly.
    pub fn downstream_of(&self, id: NodeId) -> impl Iterator<Item = &TopologyStep> {
        self.steps
            .iter()
            .filter(move |step| step.inputs.contains(&id))
    }

    /// Source steps reading the named input log.
    pub fn sources_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TopologyStep> {
        self.steps.iter().filter(move |step| {
            matches!(&step.kind, StepKind::Source { name: n } if n.eq_ignore_ascii_case(name))
        })
    }
}

/// Accumulates steps during one compilation call.
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    steps: Mutex<Vec<TopologyStep>>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&self, kind: StepKind, inputs: Vec<NodeId>) -> NodeId {
        let mut steps = self.steps.lock().expect("topology builder poisoned");
        let id = steps.len();
        steps.push(TopologyStep { id, kind, inputs });
        id
    }

    pub fn build(&self) -> Topology {
        Topology {
            steps: self.steps.lock().expect("topology builder poisoned").clone(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
