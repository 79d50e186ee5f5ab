//! Engine configuration and per-query runtime property assembly.
//!
//! Runtime properties are stringly-keyed, matching the external runtime's
//! configuration surface. Interceptor-style list properties can arrive as a
//! single class name, a comma-separated string, or an explicit list; merging
//! normalizes all shapes before appending.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use streamql_core::logging::StructuredLogger;

// ---------------------------------------------------------------------------
// Property keys and instrumentation classes
// ---------------------------------------------------------------------------

pub const APPLICATION_ID: &str = "application.id";
pub const CONSUMER_INTERCEPTOR_CLASSES: &str = "consumer.interceptor.classes";
pub const PRODUCER_INTERCEPTOR_CLASSES: &str = "producer.interceptor.classes";

pub const CONSUMER_COLLECTOR_CLASS: &str = "streamql.metrics.ConsumerCollector";
pub const PRODUCER_COLLECTOR_CLASS: &str = "streamql.metrics.ProducerCollector";

/// Prefix namespacing every query's application id under one service.
pub const SERVICE_ID_PREFIX: &str = "_streamql-";
pub const DEFAULT_SERVICE_ID: &str = "default_";

// ---------------------------------------------------------------------------
// Property values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Str(String),
    List(Vec<String>),
}

impl PropertyValue {
    pub fn str(value: impl Into<String>) -> Self {
        PropertyValue::Str(value.into())
    }
}

/// The three shapes a configured class-list property can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListProperty {
    Absent,
    Single(String),
    Many(Vec<String>),
}

impl ListProperty {
    pub fn from_value(value: Option<&PropertyValue>) -> Self {
        match value {
            None => ListProperty::Absent,
            Some(PropertyValue::Str(s)) => ListProperty::Single(s.clone()),
            Some(PropertyValue::List(items)) => ListProperty::Many(items.clone()),
        }
    }

    /// Normalize to an explicit list. Single strings may hold several
    /// comma-separated entries.
    pub fn normalize(self) -> Vec<String> {
        match self {
            ListProperty::Absent => Vec::new(),
            ListProperty::Single(s) => s
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            ListProperty::Many(items) => items,
        }
    }
}

/// Append `entry` to a list-shaped property, normalizing whatever shape is
/// currently stored. Duplicates are not removed.
pub fn append_to_list_property(
    properties: &mut HashMap<String, PropertyValue>,
    key: &str,
    entry: &str,
) {
    let mut list = ListProperty::from_value(properties.get(key)).normalize();
    list.push(entry.to_string());
    properties.insert(key.to_string(), PropertyValue::List(list));
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Engine-wide configuration shared by every statement.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub service_id: String,
    pub properties: HashMap<String, PropertyValue>,
}

impl EngineConfig {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Engine-wide properties with statement-scoped overrides layered on top.
    pub fn merged_with(&self, overrides: &HashMap<String, PropertyValue>) -> HashMap<String, PropertyValue> {
        let mut merged = self.properties.clone();
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_ID)
    }
}

/// Fully assembled configuration handed to the runtime alongside a built
/// topology.
#[derive(Debug, Clone)]
pub struct RuntimeProperties {
    pub entries: HashMap<String, PropertyValue>,
    /// Per-query structured logger the runtime reports production errors to.
    pub error_logger: Option<StructuredLogger>,
}

impl RuntimeProperties {
    pub fn application_id(&self) -> Option<&str> {
        match self.entries.get(APPLICATION_ID) {
            Some(PropertyValue::Str(id)) => Some(id),
            _ => None,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_when_absent() {
        let mut props = HashMap::new();
        append_to_list_property(&mut props, CONSUMER_INTERCEPTOR_CLASSES, CONSUMER_COLLECTOR_CLASS);
        assert_eq!(
            props.get(CONSUMER_INTERCEPTOR_CLASSES),
            Some(&PropertyValue::List(vec![CONSUMER_COLLECTOR_CLASS.into()]))
        );
    }

    #[test]
    fn test_append_to_single_string() {
        let mut props = HashMap::new();
        props.insert(
            CONSUMER_INTERCEPTOR_CLASSES.to_string(),
            PropertyValue::str("some.MockInterceptor"),
        );
        append_to_list_property(&mut props, CONSUMER_INTERCEPTOR_CLASSES, CONSUMER_COLLECTOR_CLASS);
        assert_eq!(
            props.get(CONSUMER_INTERCEPTOR_CLASSES),
            Some(&PropertyValue::List(vec![
                "some.MockInterceptor".into(),
                CONSUMER_COLLECTOR_CLASS.into(),
            ]))
        );
    }

    #[test]
    fn test_append_to_comma_separated_string() {
        let mut props = HashMap::new();
        props.insert(
            PRODUCER_INTERCEPTOR_CLASSES.to_string(),
            PropertyValue::str("one.Interceptor, two.Interceptor"),
        );
        append_to_list_property(&mut props, PRODUCER_INTERCEPTOR_CLASSES, PRODUCER_COLLECTOR_CLASS);
        assert_eq!(
            props.get(PRODUCER_INTERCEPTOR_CLASSES),
            Some(&PropertyValue::List(vec![
                "one.Interceptor".into(),
                "two.Interceptor".into(),
                PRODUCER_COLLECTOR_CLASS.into(),
            ]))
        );
    }

    #[test]
    fn test_append_to_existing_list() {
        let mut props = HashMap::new();
        props.insert(
            PRODUCER_INTERCEPTOR_CLASSES.to_string(),
            PropertyValue::List(vec!["one.Interceptor".into()]),
        );
        append_to_list_property(&mut props, PRODUCER_INTERCEPTOR_CLASSES, PRODUCER_COLLECTOR_CLASS);
        assert_eq!(
            props.get(PRODUCER_INTERCEPTOR_CLASSES),
            Some(&PropertyValue::List(vec![
                "one.Interceptor".into(),
                PRODUCER_COLLECTOR_CLASS.into(),
            ]))
        );
    }

    #[test]
    fn test_overrides_win() {
        let config = EngineConfig::default()
            .with_property("commit.interval.ms", PropertyValue::str("2000"));
        let mut overrides = HashMap::new();
        overrides.insert("commit.interval.ms".to_string(), PropertyValue::str("100"));
        let merged = config.merged_with(&overrides);
        assert_eq!(
            merged.get("commit.interval.ms"),
            Some(&PropertyValue::str("100"))
        );
    }
}
