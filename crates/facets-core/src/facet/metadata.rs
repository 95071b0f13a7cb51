//! Facet metadata and metadata-based selection

use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Metadata bag attached to a facet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: BTreeMap<String, Value>,
}

impl Metadata {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a metadata value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Set a metadata value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Remove a metadata value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Whether a key is present with a non-null value
    pub fn is_defined(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|v| !v.is_null())
    }

    /// String value of a key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.as_str())
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

/// Predicate over a metadata value
pub type MetaPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One metadata criterion
#[derive(Clone)]
pub enum MetaTest {
    /// Value must equal
    Equals(Value),
    /// Predicate must hold; absent keys are tested as `Undefined`
    Predicate(MetaPredicate),
    /// Key present and not null
    Defined,
    /// Key absent or null
    Undefined,
}

impl fmt::Debug for MetaTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaTest::Equals(v) => write!(f, "Equals({})", v),
            MetaTest::Predicate(_) => write!(f, "Predicate(..)"),
            MetaTest::Defined => write!(f, "Defined"),
            MetaTest::Undefined => write!(f, "Undefined"),
        }
    }
}

/// Conjunction of metadata criteria used to select facets
#[derive(Debug, Clone, Default)]
pub struct MetaFilter {
    criteria: Vec<(String, MetaTest)>,
}

impl MetaFilter {
    /// A filter that matches every facet
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key == value`
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.push((key.into(), MetaTest::Equals(value.into())));
        self
    }

    /// Require a predicate on `key`
    pub fn matching<F>(mut self, key: impl Into<String>, pred: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.criteria.push((key.into(), MetaTest::Predicate(Arc::new(pred))));
        self
    }

    /// Require `key` to be defined
    pub fn defined(mut self, key: impl Into<String>) -> Self {
        self.criteria.push((key.into(), MetaTest::Defined));
        self
    }

    /// Require `key` to be undefined
    pub fn undefined(mut self, key: impl Into<String>) -> Self {
        self.criteria.push((key.into(), MetaTest::Undefined));
        self
    }

    /// Whether any criterion tests `key`
    pub fn mentions(&self, key: &str) -> bool {
        self.criteria.iter().any(|(k, _)| k == key)
    }

    /// Whether `meta` satisfies every criterion
    pub fn matches(&self, meta: &Metadata) -> bool {
        self.criteria.iter().all(|(key, test)| {
            let value = meta.get(key);
            match test {
                MetaTest::Equals(expected) => value == Some(expected),
                MetaTest::Predicate(pred) => pred(value.unwrap_or(&Value::Undefined)),
                MetaTest::Defined => meta.is_defined(key),
                MetaTest::Undefined => !meta.is_defined(key),
            }
        })
    }
}
