//! Per-query structured processing log.
//!
//! Record-level failures (a payload that cannot be decoded, a write that was
//! rejected by the output log) must not halt a partition; they are reported
//! through a [`StructuredLogger`] bound to a hierarchical path such as
//! `InsertQuery_1.Project`. The default sink forwards events to `tracing`;
//! tests install a capturing sink to assert on what was logged.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::error;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Controls what processing-log events carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLogConfig {
    /// Whether raw payload bytes are attached to deserialization errors.
    pub include_payload: bool,
}

impl Default for ProcessingLogConfig {
    fn default() -> Self {
        Self {
            include_payload: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A structured event emitted on the processing log.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingEvent {
    /// A raw payload could not be parsed at the deserialization boundary.
    DeserializationError {
        cause: String,
        /// Raw bytes, present when the log config permits.
        payload: Option<Vec<u8>>,
    },
    /// The runtime failed to produce a record to an output log.
    ProductionError { cause: String },
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Destination for processing-log events.
pub trait LogSink: Send + Sync {
    fn log(&self, path: &str, event: &ProcessingEvent);
}

/// Default sink: structured `tracing` output.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, path: &str, event: &ProcessingEvent) {
        match event {
            ProcessingEvent::DeserializationError { cause, payload } => {
                error!(
                    logger = %path,
                    cause = %cause,
                    payload_bytes = payload.as_ref().map(|p| p.len()).unwrap_or(0),
                    "deserialization error"
                );
            }
            ProcessingEvent::ProductionError { cause } => {
                error!(logger = %path, cause = %cause, "production error");
            }
        }
    }
}

/// Capturing sink for tests: records every event with its logger path.
#[derive(Debug, Default)]
pub struct CapturingSink {
    events: Mutex<Vec<(String, ProcessingEvent)>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, ProcessingEvent)> {
        self.events.lock().expect("log sink poisoned").clone()
    }
}

impl LogSink for CapturingSink {
    fn log(&self, path: &str, event: &ProcessingEvent) {
        self.events
            .lock()
            .expect("log sink poisoned")
            .push((path.to_string(), event.clone()));
    }
}

// ---------------------------------------------------------------------------
// Logger / context
// ---------------------------------------------------------------------------

/// A logger bound to one hierarchical path.
#[derive(Clone)]
pub struct StructuredLogger {
    path: String,
    sink: Arc<dyn LogSink>,
}

impl StructuredLogger {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn log(&self, event: ProcessingEvent) {
        self.sink.log(&self.path, &event);
    }
}

impl fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredLogger")
            .field("path", &self.path)
            .finish()
    }
}

/// Factory handing out loggers under a shared sink and config.
#[derive(Clone)]
pub struct ProcessingLogContext {
    config: ProcessingLogConfig,
    sink: Arc<dyn LogSink>,
}

impl ProcessingLogContext {
    /// Context with the default config and the `tracing` sink.
    pub fn new() -> Self {
        Self::with_sink(ProcessingLogConfig::default(), Arc::new(TracingSink))
    }

    pub fn with_sink(config: ProcessingLogConfig, sink: Arc<dyn LogSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &ProcessingLogConfig {
        &self.config
    }

    pub fn logger(&self, path: impl Into<String>) -> StructuredLogger {
        StructuredLogger {
            path: path.into(),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl Default for ProcessingLogContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessingLogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingLogContext")
            .field("config", &self.config)
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
