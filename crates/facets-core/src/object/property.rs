//! Computed property values and their dependency notifications

use super::HasFacets;
use crate::error::FacetResult;
use crate::facet::{Facet, FacetKind};
use crate::value::Value;

impl HasFacets {
    pub(crate) fn property_value(&self, name: &str, facet: &Facet) -> FacetResult<Value> {
        let FacetKind::Property(spec) = facet.kind() else {
            return Err(self.no_such_facet(name));
        };
        if spec.cached {
            if let Some(value) = self.lock().property_cache.get(name) {
                return Ok(value.clone());
            }
        }
        let getter = spec.getter.clone().ok_or_else(|| self.no_such_facet(name))?;
        let value = getter(self)?;
        if spec.cached {
            let stale = self.lock().property_cache.insert(name.to_string(), value.clone());
            drop(stale);
        }
        Ok(value)
    }

    /// Move the cached value aside before a dependency change makes it stale
    pub(crate) fn property_pre(&self, name: &str) {
        let stale = {
            let mut state = self.lock();
            match state.property_cache.remove(name) {
                Some(old) if !state.cached_old.contains_key(name) => {
                    state.cached_old.insert(name.to_string(), old);
                    None
                }
                other => other,
            }
        };
        drop(stale);
    }

    /// Announce the recomputed value after a dependency changed
    pub(crate) fn property_post(&self, name: &str) -> FacetResult<()> {
        let facet = self.facet_arc(name);
        let FacetKind::Property(spec) = facet.kind() else {
            return Ok(());
        };
        let old = if spec.cached {
            self.lock().cached_old.remove(name).unwrap_or_default()
        } else {
            Value::Undefined
        };
        let new = self.property_value(name, &facet)?;
        if old.is_undefined() || old != new {
            self.facet_property_set(name, old, new)?;
        }
        Ok(())
    }
}
