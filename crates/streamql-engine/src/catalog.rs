//! Sink catalog: resolves persistent output names to their declared schema,
//! key field and collection shape.
//!
//! The engine reads the catalog during compilation and registers newly
//! created sinks after a CREATE ... AS SELECT validates. Lookups are
//! case-insensitive on the sink name.

use std::collections::HashMap;
use std::sync::RwLock;

use streamql_core::Schema;

use crate::error::{Error, Result};
use crate::logical::CollectionShape;

/// Declared properties of a persistent output log.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkDescriptor {
    pub name: String,
    pub schema: Schema,
    pub key_field: Option<String>,
    pub shape: CollectionShape,
}

impl SinkDescriptor {
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        key_field: Option<String>,
        shape: CollectionShape,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            key_field,
            shape,
        }
    }
}

pub trait MetaStore: Send + Sync {
    /// Look up a sink by name, or `None` if it has never been registered.
    fn sink(&self, name: &str) -> Option<SinkDescriptor>;

    /// Register a newly created sink. Fails if the name is taken.
    fn register_sink(&self, descriptor: SinkDescriptor) -> Result<()>;
}

/// Process-local metastore.
#[derive(Debug, Default)]
pub struct InMemoryMetaStore {
    sinks: RwLock<HashMap<String, SinkDescriptor>>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetaStore for InMemoryMetaStore {
    fn sink(&self, name: &str) -> Option<SinkDescriptor> {
        self.sinks
            .read()
            .expect("metastore poisoned")
            .get(&name.to_ascii_uppercase())
            .cloned()
    }

    fn register_sink(&self, descriptor: SinkDescriptor) -> Result<()> {
        let mut sinks = self.sinks.write().expect("metastore poisoned");
        let key = descriptor.name.to_ascii_uppercase();
        if sinks.contains_key(&key) {
            return Err(Error::SinkExists(descriptor.name));
        }
        sinks.insert(key, descriptor);
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
