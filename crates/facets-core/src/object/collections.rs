//! In-place updates of list and dict facets
//!
//! Each update stores a new collection value (copy-on-write) and fires the
//! `<name>_items` event with an [`ItemsEvent`] describing the change.

use super::HasFacets;
use crate::error::{FacetError, FacetResult};
use crate::facet::Facet;
use crate::value::{ItemsEvent, Value};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

impl HasFacets {
    /// Replace `range` of a list facet with `values`, returning the removed
    /// elements; the range is clamped to the list
    pub fn list_splice(&self, name: &str, range: Range<usize>, values: Vec<Value>) -> FacetResult<Vec<Value>> {
        let facet = self.facet_arc(name);
        let added = self.check_items(name, &facet, values)?;
        let current = self.get(name)?;

        let event = {
            let mut state = self.lock();
            let Some(Value::List(list)) = state.values.get_mut(name) else {
                return Err(self.not_a(name, current, "a list"));
            };
            let len = list.len();
            let start = range.start.min(len);
            let end = range.end.clamp(start, len);
            let removed: Vec<Value> = Arc::make_mut(list)
                .splice(start..end, added.iter().cloned())
                .collect();
            ItemsEvent::List {
                index: start,
                removed,
                added,
            }
        };
        let removed = match &event {
            ItemsEvent::List { removed, .. } => removed.clone(),
            ItemsEvent::Dict { .. } => Vec::new(),
        };
        self.fire_items(name, event)?;
        Ok(removed)
    }

    /// Append to a list facet
    pub fn list_append(&self, name: &str, value: Value) -> FacetResult<()> {
        self.list_splice(name, usize::MAX..usize::MAX, vec![value]).map(|_| ())
    }

    /// Insert into a list facet before `index`
    pub fn list_insert(&self, name: &str, index: usize, value: Value) -> FacetResult<()> {
        self.list_splice(name, index..index, vec![value]).map(|_| ())
    }

    /// Remove and return the element at `index` of a list facet
    pub fn list_remove(&self, name: &str, index: usize) -> FacetResult<Value> {
        let len = self.get(name)?.as_list().map_or(0, |l| l.len());
        if index >= len {
            return Err(FacetError::Validation {
                class: self.class_name().to_string(),
                name: name.to_string(),
                value: Value::Int(index as i64),
                expected: format!("an index below {}", len),
            });
        }
        let mut removed = self.list_splice(name, index..index + 1, Vec::new())?;
        Ok(removed.pop().unwrap_or_default())
    }

    /// Insert or replace a key of a dict facet, returning the previous value
    pub fn dict_insert(&self, name: &str, key: &str, value: Value) -> FacetResult<Option<Value>> {
        let facet = self.facet_arc(name);
        let value = self
            .check_items(name, &facet, vec![value])?
            .pop()
            .unwrap_or_default();
        let current = self.get(name)?;

        let (previous, event) = {
            let mut state = self.lock();
            let Some(Value::Dict(map)) = state.values.get_mut(name) else {
                return Err(self.not_a(name, current, "a dict"));
            };
            let previous = Arc::make_mut(map).insert(key.to_string(), value.clone());
            let mut added = BTreeMap::new();
            let mut changed = BTreeMap::new();
            match &previous {
                Some(old) => changed.insert(key.to_string(), old.clone()),
                None => added.insert(key.to_string(), value),
            };
            let event = ItemsEvent::Dict {
                added,
                changed,
                removed: BTreeMap::new(),
            };
            (previous, event)
        };
        self.fire_items(name, event)?;
        Ok(previous)
    }

    /// Remove a key of a dict facet, returning its value
    pub fn dict_remove(&self, name: &str, key: &str) -> FacetResult<Option<Value>> {
        let current = self.get(name)?;
        let previous = {
            let mut state = self.lock();
            let Some(Value::Dict(map)) = state.values.get_mut(name) else {
                return Err(self.not_a(name, current, "a dict"));
            };
            if !map.contains_key(key) {
                return Ok(None);
            }
            Arc::make_mut(map).remove(key)
        };
        if let Some(old) = &previous {
            let mut removed = BTreeMap::new();
            removed.insert(key.to_string(), old.clone());
            self.fire_items(
                name,
                ItemsEvent::Dict {
                    added: BTreeMap::new(),
                    changed: BTreeMap::new(),
                    removed,
                },
            )?;
        }
        Ok(previous)
    }

    fn check_items(&self, name: &str, facet: &Facet, values: Vec<Value>) -> FacetResult<Vec<Value>> {
        values
            .into_iter()
            .map(|value| {
                facet
                    .validator()
                    .validate_item(value.clone())
                    .map_err(|expected| FacetError::Validation {
                        class: self.class_name().to_string(),
                        name: name.to_string(),
                        value,
                        expected,
                    })
            })
            .collect()
    }

    fn not_a(&self, name: &str, value: Value, expected: &str) -> FacetError {
        FacetError::Validation {
            class: self.class_name().to_string(),
            name: name.to_string(),
            value,
            expected: expected.to_string(),
        }
    }

    fn fire_items(&self, name: &str, event: ItemsEvent) -> FacetResult<()> {
        self.facet_property_set(&format!("{}_items", name), Value::Undefined, Value::from(event))
    }
}
