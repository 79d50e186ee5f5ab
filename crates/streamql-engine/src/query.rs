//! Query handles: ids, plan text, lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use streamql_core::Schema;
use tracing::info;

use crate::logical::{CollectionShape, SinkMode, SinkTarget};
use crate::queue::RowQueue;
use crate::runtime::QueryExecution;

// ---------------------------------------------------------------------------
// Query ids
// ---------------------------------------------------------------------------

/// Hands out stable, human-readable query ids. Persistent queries encode
/// their statement kind and sink name; bare queries get a transient id.
#[derive(Debug, Default)]
pub struct QueryIdGenerator {
    next: AtomicU64,
}

impl QueryIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, target: &SinkTarget, shape: CollectionShape) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        match target {
            SinkTarget::Log {
                mode: SinkMode::InsertInto,
                ..
            } => format!("InsertQuery_{n}"),
            SinkTarget::Log {
                mode: SinkMode::Create,
                name,
            } => match shape {
                CollectionShape::Stream => format!("CSAS_{name}_{n}"),
                CollectionShape::Table => format!("CTAS_{name}_{n}"),
            },
            SinkTarget::Queue => format!("transient_{n}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan text
// ---------------------------------------------------------------------------

/// One rendered operator in the execution-plan text, root at the top.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub kind_label: String,
    pub schema: Schema,
    pub logger_path: String,
    pub children: Vec<PlanStep>,
}

impl PlanStep {
    pub fn new(
        kind_label: impl Into<String>,
        schema: Schema,
        logger_path: impl Into<String>,
        children: Vec<PlanStep>,
    ) -> Self {
        Self {
            kind_label: kind_label.into(),
            schema,
            logger_path: logger_path.into(),
            children,
        }
    }

    /// Indented per-operator rendering, one line each, children one
    /// tab-pair deeper than their parent.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        self.render_into(0, &mut lines);
        lines.join("\n")
    }

    fn render_into(&self, depth: usize, lines: &mut Vec<String>) {
        lines.push(format!(
            "{} > [ {} ] | Schema: {} | Logger: {}",
            "\t\t".repeat(depth),
            self.kind_label,
            self.schema.render(),
            self.logger_path,
        ));
        for child in &self.children {
            child.render_into(depth + 1, lines);
        }
    }
}

// ---------------------------------------------------------------------------
// Query metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Running,
    Terminated,
}

/// Handle to one running statement. Closing releases the pull queue, if any,
/// and stops the underlying execution; once terminated a handle never runs
/// again.
pub struct QueryMetadata {
    query_id: String,
    statement: String,
    execution_plan: String,
    shape: CollectionShape,
    sink_name: Option<String>,
    started_at_ms: i64,
    state: Mutex<QueryState>,
    execution: Box<dyn QueryExecution>,
    queue: Option<RowQueue>,
}

impl QueryMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        query_id: impl Into<String>,
        statement: impl Into<String>,
        execution_plan: String,
        shape: CollectionShape,
        sink_name: Option<String>,
        execution: Box<dyn QueryExecution>,
        queue: Option<RowQueue>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            statement: statement.into(),
            execution_plan,
            shape,
            sink_name,
            started_at_ms: Utc::now().timestamp_millis(),
            state: Mutex::new(QueryState::Running),
            execution,
            queue,
        }
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn get_execution_plan(&self) -> &str {
        &self.execution_plan
    }

    pub fn shape(&self) -> CollectionShape {
        self.shape
    }

    /// Name of the persistent sink this query writes to, when it has one.
    pub fn sink_name(&self) -> Option<&str> {
        self.sink_name.as_deref()
    }

    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }

    pub fn application_id(&self) -> &str {
        self.execution.application_id()
    }

    /// Pull queue for bare queries; `None` for persistent sinks.
    pub fn queue(&self) -> Option<&RowQueue> {
        self.queue.as_ref()
    }

    pub fn state(&self) -> QueryState {
        *self.state.lock().expect("query state poisoned")
    }

    pub fn is_running(&self) -> bool {
        self.state() == QueryState::Running
    }

    /// Stop the query. Idempotent; releases the queue first so any producer
    /// blocked on a full queue unblocks before the topology is stopped.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("query state poisoned");
        if *state == QueryState::Terminated {
            return;
        }
        *state = QueryState::Terminated;
        drop(state);

        if let Some(queue) = &self.queue {
            queue.close();
        }
        self.execution.stop();
        info!(query_id = %self.query_id, "query terminated");
    }
}

impl std::fmt::Debug for QueryMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryMetadata")
            .field("query_id", &self.query_id)
            .field("statement", &self.statement)
            .field("shape", &self.shape)
            .field("state", &self.state())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use streamql_core::{Field, SqlType};

    use super::*;

    #[test]
    fn test_query_id_formats() {
        let ids = QueryIdGenerator::new();
        let insert = SinkTarget::Log {
            name: "S1".into(),
            mode: SinkMode::InsertInto,
        };
        let create = SinkTarget::Log {
            name: "S1".into(),
            mode: SinkMode::Create,
        };
        assert_eq!(ids.next_id(&insert, CollectionShape::Stream), "InsertQuery_0");
        assert_eq!(ids.next_id(&create, CollectionShape::Stream), "CSAS_S1_1");
        assert_eq!(ids.next_id(&create, CollectionShape::Table), "CTAS_S1_2");
        assert_eq!(ids.next_id(&SinkTarget::Queue, CollectionShape::Stream), "transient_3");
    }

    #[test]
    fn test_plan_rendering_indents_by_depth() {
        let schema = Schema::new(vec![
            Field::new("COL0", SqlType::Bigint),
            Field::new("COL1", SqlType::Varchar),
        ])
        .unwrap();
        let plan = PlanStep::new(
            "SINK",
            schema.clone(),
            "InsertQuery_1.S1",
            vec![PlanStep::new(
                "PROJECT",
                schema.clone(),
                "InsertQuery_1.Project",
                vec![PlanStep::new(
                    "SOURCE",
                    schema.clone(),
                    "InsertQuery_1.Source",
                    vec![],
                )],
            )],
        );

        let text = plan.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            " > [ SINK ] | Schema: [COL0 : BIGINT, COL1 : VARCHAR] | Logger: InsertQuery_1.S1"
        );
        assert!(lines[1].starts_with("\t\t > [ PROJECT ]"));
        assert!(lines[2].starts_with("\t\t\t\t > [ SOURCE ]"));
    }
}
