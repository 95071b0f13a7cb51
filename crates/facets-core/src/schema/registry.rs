//! Registry of defined classes

use super::FacetClass;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

static GLOBAL: Lazy<ClassRegistry> = Lazy::new(ClassRegistry::new);

/// Classes indexed by name
#[derive(Debug)]
pub struct ClassRegistry {
    classes: DashMap<String, Arc<FacetClass>>,
}

impl ClassRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            classes: DashMap::new(),
        }
    }

    /// Process-wide registry used by [`FacetClass::define`]
    pub fn global() -> &'static ClassRegistry {
        &GLOBAL
    }

    /// Register a class, returning the class previously registered under its name
    pub fn register(&self, class: Arc<FacetClass>) -> Option<Arc<FacetClass>> {
        self.classes.insert(class.name().to_string(), class)
    }

    /// Get class by name
    pub fn get_by_name(&self, name: &str) -> Option<Arc<FacetClass>> {
        self.classes.get(name).map(|entry| entry.value().clone())
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no class is registered
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
