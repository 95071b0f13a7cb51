//! Reading, assigning and resetting facet values

use super::HasFacets;
use crate::error::{FacetError, FacetResult};
use crate::facet::{DefaultValue, Facet, FacetKind, MetaFilter};
use crate::schema::builder::lookup_mapped;
use crate::store;
use crate::value::Value;
use std::sync::Arc;

impl HasFacets {
    /// Current value of `name`
    ///
    /// The first read of an unassigned facet computes its default and
    /// stores it; later reads return the stored value.
    pub fn get(&self, name: &str) -> FacetResult<Value> {
        let facet = self.facet_arc(name);
        match facet.kind() {
            FacetKind::Property(_) => return self.property_value(name, &facet),
            FacetKind::Event => return Ok(Value::Undefined),
            _ => {}
        }
        if let Some(value) = self.lock().values.get(name) {
            return Ok(value.clone());
        }
        if let FacetKind::Delegate(spec) = facet.kind() {
            return self.delegate_get(name, spec);
        }
        self.default_for(name, &facet)
    }

    fn default_for(&self, name: &str, facet: &Facet) -> FacetResult<Value> {
        let schema = self.schema();
        let value = match schema.defaults.get(name) {
            Some(factory) => factory(self),
            None => match facet.default_value() {
                DefaultValue::Constant(value) => value.clone(),
                DefaultValue::Factory(factory) => factory(self),
                DefaultValue::Stored { fallback } => store::current()
                    .get(&store::key(self.class_name(), name))
                    .unwrap_or_else(|| fallback.clone()),
                DefaultValue::Missing => return Err(self.no_such_facet(name)),
            },
        };
        let mut state = self.lock();
        Ok(state.values.entry(name.to_string()).or_insert(value).clone())
    }

    /// Assign `name`, notifying observers if the value changed
    pub fn set(&self, name: &str, value: impl Into<Value>) -> FacetResult<()> {
        self.assign(name, value.into(), true)
    }

    /// Assign `name` without notifying anyone
    pub fn set_quiet(&self, name: &str, value: impl Into<Value>) -> FacetResult<()> {
        self.assign(name, value.into(), false)
    }

    pub(crate) fn assign(&self, name: &str, value: Value, notify: bool) -> FacetResult<()> {
        let facet = self.facet_arc(name);
        match facet.kind() {
            FacetKind::Constant | FacetKind::Disallow => return Err(self.read_only(name)),
            FacetKind::Property(spec) => {
                return match &spec.setter {
                    Some(setter) => setter(self, value),
                    None => Err(self.read_only(name)),
                }
            }
            FacetKind::Delegate(spec) if spec.modify => return self.delegate_set(name, spec, value, notify),
            _ => {}
        }

        let value = self.validate(name, &facet, value)?;
        if facet.is_event() {
            if notify {
                self.facet_property_set(name, Value::Undefined, value)?;
            }
            return Ok(());
        }

        let stored = self.lock().values.get(name).cloned();
        let current = match stored {
            Some(value) => value,
            None => self.get(name).unwrap_or(Value::Undefined),
        };

        let declared = self.schema().facet(name).is_some();
        let (old, token, first_dynamic) = {
            let mut state = self.lock();
            let assigned = state.values.get(name).is_some_and(|v| !v.is_undefined());
            if matches!(facet.kind(), FacetKind::ReadOnly) && assigned {
                return Err(self.read_only(name));
            }
            // notifier forks also live in instance_facets, so ask the class
            let first_dynamic = !declared && !state.added.contains(name) && state.dynamic.insert(name.to_string());
            let old = state
                .values
                .insert(name.to_string(), value.clone())
                .unwrap_or(current);
            let token = match facet.kind() {
                FacetKind::Delegate(_) => state.delegate_tokens.remove(name),
                _ => None,
            };
            (old, token, first_dynamic)
        };

        if let Some(token) = token {
            self.unsubscribe(token);
            tracing::debug!(object = %self.class_name(), facet = %name, "delegate listener removed");
        }
        if first_dynamic {
            self.facet_property_set("facet_added", Value::Undefined, Value::from(name))?;
        }
        if let FacetKind::Mapped(map) = facet.kind() {
            let mapped = lookup_mapped(map, &value);
            self.assign(&format!("{}_", name), mapped, notify)?;
        }
        if notify && facet.comparison_mode().changed(&old, &value) {
            self.facet_property_set(name, old, value)?;
        }
        Ok(())
    }

    pub(crate) fn validate(&self, name: &str, facet: &Facet, value: Value) -> FacetResult<Value> {
        let checked = facet
            .validator()
            .validate(value.clone())
            .map_err(|expected| FacetError::Validation {
                class: self.class_name().to_string(),
                name: name.to_string(),
                value,
                expected,
            })?;
        match self.schema().validate_hooks.get(name) {
            Some(hook) => hook(self, checked),
            None => Ok(checked),
        }
    }

    pub(crate) fn read_only(&self, name: &str) -> FacetError {
        FacetError::ReadOnly {
            class: self.class_name().to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn no_such_facet(&self, name: &str) -> FacetError {
        FacetError::NoSuchFacet {
            class: self.class_name().to_string(),
            name: name.to_string(),
        }
    }

    /// Values of `names`; an empty slice reads every readable facet
    pub fn facet_get(&self, names: &[&str]) -> FacetResult<Vec<(String, Value)>> {
        if names.is_empty() {
            return Ok(self
                .facet_names(&MetaFilter::new())
                .into_iter()
                .filter_map(|name| self.get(&name).ok().map(|value| (name, value)))
                .collect());
        }
        names
            .iter()
            .map(|name| Ok((name.to_string(), self.get(name)?)))
            .collect()
    }

    /// Assign several facets in order, stopping at the first failure
    pub fn facet_set(&self, values: &[(&str, Value)]) -> FacetResult<()> {
        for (name, value) in values {
            self.assign(name, value.clone(), true)?;
        }
        Ok(())
    }

    /// Like [`facet_set`](Self::facet_set) without notifications
    pub fn facet_setq(&self, values: &[(&str, Value)]) -> FacetResult<()> {
        for (name, value) in values {
            self.assign(name, value.clone(), false)?;
        }
        Ok(())
    }

    /// Reset facets to their defaults; returns the names that failed
    ///
    /// `None` resets every explicitly declared facet that stores a value.
    pub fn reset_facets(&self, names: Option<&[&str]>) -> Vec<String> {
        let names: Vec<String> = match names {
            Some(names) => names.iter().map(|n| n.to_string()).collect(),
            None => self
                .schema()
                .facets
                .iter()
                .filter(|(_, f)| {
                    !f.is_items_shadow()
                        && !matches!(
                            f.kind(),
                            FacetKind::Event
                                | FacetKind::Property(_)
                                | FacetKind::Constant
                                | FacetKind::Disallow
                        )
                })
                .map(|(name, _)| name.clone())
                .collect(),
        };

        let mut failed = Vec::new();
        for name in names {
            if let Err(err) = self.reset_facet(&name) {
                tracing::debug!(object = %self.class_name(), facet = %name, error = %err, "reset failed");
                failed.push(name);
            }
        }
        failed
    }

    fn reset_facet(&self, name: &str) -> FacetResult<()> {
        let facet = self.facet_arc(name);
        match facet.kind() {
            FacetKind::Event | FacetKind::Property(_) => return Err(self.read_only(name)),
            FacetKind::Constant | FacetKind::Disallow => return Ok(()),
            _ => {}
        }
        let removed = self.lock().values.remove(name);
        if matches!(facet.kind(), FacetKind::Delegate(_)) {
            self.ensure_delegate_listener(name)?;
        }
        let Some(old) = removed else {
            return Ok(());
        };
        let new = self.get(name).unwrap_or(Value::Undefined);
        if facet.comparison_mode().changed(&old, &new) {
            self.facet_property_set(name, old, new)?;
        }
        Ok(())
    }

    /// Add a facet to this instance only, firing `facet_added`
    pub fn add_facet(&self, name: &str, facet: Facet) -> FacetResult<()> {
        let collection = facet.collection_kind().is_some();
        let replaced = {
            let mut state = self.lock();
            let mut replaced = Vec::new();
            replaced.extend(state.instance_facets.insert(name.to_string(), Arc::new(facet)));
            replaced.extend(state.fork_bases.remove(name));
            state.added.insert(name.to_string());
            if collection {
                let items = format!("{}_items", name);
                replaced.extend(
                    state
                        .instance_facets
                        .insert(items.clone(), Arc::new(Facet::items_event())),
                );
                replaced.extend(state.fork_bases.remove(&items));
                state.added.insert(items);
            }
            replaced
        };
        drop(replaced);
        self.facet_property_set("facet_added", Value::Undefined, Value::from(name))
    }

    /// Remove a facet added with [`add_facet`](Self::add_facet)
    pub fn remove_facet(&self, name: &str) -> bool {
        let items = format!("{}_items", name);
        let (facets, values) = {
            let mut state = self.lock();
            if !state.added.remove(name) {
                return false;
            }
            let mut facets = Vec::new();
            let mut values = Vec::new();
            for key in [name, items.as_str()] {
                if key != name && !state.added.remove(key) {
                    continue;
                }
                facets.extend(state.instance_facets.remove(key));
                values.extend(state.values.remove(key));
            }
            (facets, values)
        };
        drop(facets);
        drop(values);
        true
    }

    /// Assign an animation frame value
    ///
    /// A finite float rejected by the validator is retried once as the
    /// nearest integer; if that is rejected too the frame is skipped. NaN and
    /// infinities keep the original validation error.
    pub fn set_frame_value(&self, name: &str, value: Value) -> FacetResult<()> {
        let err = match self.set(name, value.clone()) {
            Err(err) if err.is_validation() => err,
            other => return other,
        };
        let f = match value {
            Value::Float(f) if f.is_finite() => f,
            _ => return Err(err),
        };
        match self.set(name, Value::Int(f.round() as i64)) {
            Err(retry) if retry.is_validation() => {
                tracing::debug!(object = %self.class_name(), facet = %name, error = %retry, "frame value skipped");
                Ok(())
            }
            other => other,
        }
    }

    /// Invoke a typed method
    pub fn call(&self, method: &str, args: &[Value]) -> FacetResult<Value> {
        let schema = self.schema();
        let typed = schema.method(method).ok_or_else(|| self.no_such_facet(method))?;
        typed.invoke(self, args)
    }

    /// Read this facet's entry in the persistence store
    pub fn facet_db_get(&self, name: &str) -> Option<Value> {
        store::current().get(&store::key(self.class_name(), name))
    }

    /// Write (or with `None` delete) this facet's entry in the persistence store
    pub fn facet_db_set(&self, name: &str, value: Option<Value>) {
        store::current().set(&store::key(self.class_name(), name), value)
    }
}
