//! Key-value persistence collaborator
//!
//! The store is consulted for `Stored` default values and by the explicit
//! `facet_db_get` / `facet_db_set` helpers. Keys are `"Class:name"`.

use crate::value::Value;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Persistence backend
pub trait FacetStore: Send + Sync {
    /// Look up a value
    fn get(&self, key: &str) -> Option<Value>;

    /// Store a value, or delete the key when `value` is `None`
    fn set(&self, key: &str, value: Option<Value>);
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<FxHashMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl FacetStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Option<Value>) {
        let previous = {
            let mut entries = self.entries.write();
            match value {
                Some(value) => entries.insert(key.to_string(), value),
                None => entries.remove(key),
            }
        };
        drop(previous);
    }
}

static STORE: Lazy<RwLock<Arc<dyn FacetStore>>> =
    Lazy::new(|| RwLock::new(Arc::new(MemoryStore::new())));

/// Install the process-wide store
pub fn install(store: Arc<dyn FacetStore>) {
    *STORE.write() = store;
}

/// The process-wide store
pub fn current() -> Arc<dyn FacetStore> {
    STORE.read().clone()
}

/// Store key for a facet of a class
pub fn key(class: &str, name: &str) -> String {
    format!("{}:{}", class, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_and_delete() {
        let store = MemoryStore::new();
        store.set("Point:x", Some(Value::Int(3)));
        assert_eq!(store.get("Point:x"), Some(Value::Int(3)));
        assert_eq!(store.len(), 1);
        store.set("Point:x", None);
        assert!(store.get("Point:x").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_key_format() {
        assert_eq!(key("Window", "size"), "Window:size");
    }
}
