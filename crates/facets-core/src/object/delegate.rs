//! Delegate facets
//!
//! A delegate reads through to a facet of the object held in another local
//! facet. While delegating, an internal listener on `<holder>:<target>`
//! re-announces the target's changes under the local name. A prototype
//! delegate stops delegating once assigned locally and resumes on reset.

use super::{HasFacets, ListenOptions};
use crate::error::{FacetError, FacetResult};
use crate::facet::{DelegateSpec, FacetKind};
use crate::notify::{Dispatch, Notifier};
use crate::value::Value;

impl HasFacets {
    /// Object and facet name the delegate `name` currently forwards to
    ///
    /// Returns `None` while the holder facet does not contain an object.
    pub fn delegate_target(&self, name: &str) -> FacetResult<Option<(HasFacets, String)>> {
        let facet = self.facet_arc(name);
        let FacetKind::Delegate(spec) = facet.kind() else {
            return Err(FacetError::Delegate {
                name: name.to_string(),
                message: "not a delegate facet".to_string(),
            });
        };
        self.target_of(name, spec)
    }

    fn target_of(&self, name: &str, spec: &DelegateSpec) -> FacetResult<Option<(HasFacets, String)>> {
        let holder = self.get(&spec.delegate)?;
        let schema = self.schema();
        Ok(holder
            .as_object()
            .map(|obj| (obj.clone(), spec.target_name(name, schema.delegate_prefix()))))
    }

    fn unbound(&self, name: &str, spec: &DelegateSpec) -> FacetError {
        FacetError::Delegate {
            name: name.to_string(),
            message: format!("'{}' does not hold an object", spec.delegate),
        }
    }

    pub(crate) fn delegate_get(&self, name: &str, spec: &DelegateSpec) -> FacetResult<Value> {
        self.ensure_delegate_listener(name)?;
        match self.target_of(name, spec)? {
            Some((target, target_name)) => target.get(&target_name),
            None => Err(self.unbound(name, spec)),
        }
    }

    pub(crate) fn delegate_set(&self, name: &str, spec: &DelegateSpec, value: Value, notify: bool) -> FacetResult<()> {
        match self.target_of(name, spec)? {
            Some((target, target_name)) => {
                self.ensure_delegate_listener(name)?;
                target.assign(&target_name, value, notify)
            }
            None => Err(self.unbound(name, spec)),
        }
    }

    /// Install the re-announcing listener of a delegate unless it is
    /// already installed or the delegate is locally overridden
    pub(crate) fn ensure_delegate_listener(&self, name: &str) -> FacetResult<()> {
        let facet = self.facet_arc(name);
        let FacetKind::Delegate(spec) = facet.kind() else {
            return Ok(());
        };
        if !spec.listenable {
            return Ok(());
        }
        {
            let state = self.lock();
            if state.delegate_tokens.contains_key(name) || (!spec.modify && state.values.contains_key(name)) {
                return Ok(());
            }
        }

        let schema = self.schema();
        let pattern = match schema.delegate_patterns.get(name) {
            Some(pattern) => pattern.clone(),
            None => format!(
                "{}:{}",
                spec.delegate,
                spec.target_name(name, schema.delegate_prefix())
            ),
        };
        let owner = self.downgrade();
        let local = name.to_string();
        let notifier = Notifier::internal(move |event| match owner.upgrade() {
            Some(owner) => owner.facet_property_set(&local, event.old.clone(), event.new.clone()),
            None => Ok(()),
        });
        let options = ListenOptions {
            dispatch: Dispatch::Same,
            priority: false,
            deferred: false,
        };
        let token = self.subscribe(&pattern, notifier, None, options)?;
        let previous = self.lock().delegate_tokens.insert(name.to_string(), token);
        if let Some(previous) = previous {
            self.unsubscribe(previous);
        }
        tracing::debug!(object = %self.class_name(), facet = %name, pattern = %pattern, "delegate listener installed");
        Ok(())
    }
}
