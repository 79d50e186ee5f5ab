//! Streaming-SQL compilation engine.
//!
//! Takes a schema-annotated logical plan, compiles it bottom-up into
//! schema-aware streaming operators registered on a dataflow topology,
//! validates sink compatibility, and starts the result on a pluggable
//! runtime, yielding a named, cancellable query handle. Interactive
//! statements terminate in a bounded pull queue instead of a persistent
//! output log.

pub mod catalog;
pub mod config;
pub mod error;
pub mod expr;
pub mod logical;
pub mod physical;
pub mod query;
pub mod queue;
pub mod runtime;
pub mod structured;
pub mod topology;

pub use catalog::{InMemoryMetaStore, MetaStore, SinkDescriptor};
pub use config::{EngineConfig, PropertyValue, RuntimeProperties};
pub use error::{Error, Result};
pub use expr::{AggregateExpression, AggregateFunction, BinaryOp, Expression, SelectExpression};
pub use logical::{CollectionShape, LogicalPlan, LogicalPlanNode, SinkMode, SinkTarget};
pub use physical::PhysicalPlanBuilder;
pub use query::{QueryIdGenerator, QueryMetadata, QueryState};
pub use queue::{RowQueue, DEFAULT_QUEUE_CAPACITY};
pub use runtime::{LocalRuntime, QueryExecution, StreamRuntime};
pub use structured::{LoggerPath, SchemaStream, SchemaTable};
pub use topology::{RecordKey, TimeWindow, Topology, TopologyBuilder};
