//! Facet-bearing objects
//!
//! [`HasFacets`] is a cheap handle to one instance. Values, per-instance
//! facet forks and subscriptions sit behind a single mutex; the lock is
//! only held for map updates and never while user code runs. Anything that
//! might own user closures or other objects (replaced values, detached
//! notifiers, bindings) is moved out of the lock and dropped afterwards.

mod access;
mod collections;
mod copy;
mod delegate;
mod property;

use crate::config;
use crate::error::{FacetError, FacetResult};
use crate::facet::{Facet, MetaFilter};
use crate::id::{ListenerToken, NotifierId, ObjectId};
use crate::listener::{ListenerBinding, Pattern};
use crate::notify::{ChangeEvent, Dispatch, Handler, Notifier};
use crate::schema::{ClassSchema, FacetClass, ListenerKind};
use crate::sync::SyncLink;
use crate::value::Value;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};

/// Where a facet lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetSource {
    /// Added to, or forked for, this instance
    Instance,
    /// Explicitly declared by the class
    Class,
    /// Matched a prefix template
    Prefix,
}

/// Options for [`HasFacets::on_facet_set_with`]
#[derive(Debug, Clone)]
pub struct ListenOptions {
    /// How the handler is invoked
    pub dispatch: Dispatch,
    /// Put the handler in front of already installed ones
    pub priority: bool,
    /// Leave link children unbound until the link is first assigned
    pub deferred: bool,
}

impl Default for ListenOptions {
    fn default() -> Self {
        let dispatch = Dispatch::parse(&config::current().default_dispatch).unwrap_or_default();
        Self {
            dispatch,
            priority: false,
            deferred: false,
        }
    }
}

pub(crate) enum Subscription {
    Direct {
        pattern: String,
        handler: Option<Handler>,
        notifier: NotifierId,
        names: Vec<String>,
    },
    Bound(Arc<ListenerBinding>),
}

impl Subscription {
    fn matches(&self, text: &str, target: &Handler) -> bool {
        match self {
            Subscription::Direct {
                pattern, handler, ..
            } => pattern == text && handler.as_ref().is_some_and(|h| h.same_as(target)),
            Subscription::Bound(binding) => {
                binding.pattern_text() == text && binding.handler().is_some_and(|h| h.same_as(target))
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct ObjectState {
    pub values: FxHashMap<String, Value>,
    pub instance_facets: FxHashMap<String, Arc<Facet>>,
    /// Names added with `add_facet` (as opposed to notifier forks)
    pub added: FxHashSet<String>,
    /// Class facet each notifier fork was taken from
    pub fork_bases: FxHashMap<String, Arc<Facet>>,
    /// Class schema generation the forks were taken under
    pub generation: u64,
    /// Prefix-matched names assigned at least once
    pub dynamic: FxHashSet<String>,
    pub any_notifiers: Vec<Notifier>,
    pub property_cache: FxHashMap<String, Value>,
    pub cached_old: FxHashMap<String, Value>,
    pub delegate_tokens: FxHashMap<String, ListenerToken>,
    pub subscriptions: FxHashMap<ListenerToken, Subscription>,
    pub sync: FxHashMap<String, Vec<SyncLink>>,
    pub syncing: FxHashSet<String>,
    pub notify_suspended: bool,
}

pub(crate) struct ObjectInner {
    id: ObjectId,
    class: Arc<FacetClass>,
    state: Mutex<ObjectState>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        let state = std::mem::take(self.state.get_mut());
        for (_, subscription) in state.subscriptions {
            if let Subscription::Bound(binding) = subscription {
                binding.unbind_all();
            }
        }
    }
}

/// Handle to an object with facets
#[derive(Clone)]
pub struct HasFacets(Arc<ObjectInner>);

/// Non-owning handle, used by listener edges
#[derive(Clone)]
pub struct WeakHasFacets(Weak<ObjectInner>);

impl WeakHasFacets {
    /// The object, if it is still alive
    pub fn upgrade(&self) -> Option<HasFacets> {
        self.0.upgrade().map(HasFacets)
    }
}

impl fmt::Debug for WeakHasFacets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(obj) => write!(f, "Weak({:?})", obj),
            None => write!(f, "Weak(<dropped>)"),
        }
    }
}

/// Re-enables notifications when dropped
#[must_use = "notifications resume as soon as the guard is dropped"]
pub struct NotifyGuard {
    object: HasFacets,
    previous: bool,
}

impl Drop for NotifyGuard {
    fn drop(&mut self) {
        self.object.lock().notify_suspended = self.previous;
    }
}

impl HasFacets {
    pub(crate) fn create(class: &Arc<FacetClass>, values: &[(&str, Value)]) -> FacetResult<HasFacets> {
        let object = HasFacets(Arc::new(ObjectInner {
            id: ObjectId::new(),
            class: class.clone(),
            state: Mutex::new(ObjectState::default()),
        }));
        let schema = class.schema();
        object.bind_class_listeners(&schema, false)?;
        for (name, value) in values {
            object.set(name, value.clone())?;
        }
        object.bind_class_listeners(&schema, true)?;
        Ok(object)
    }

    fn bind_class_listeners(&self, schema: &ClassSchema, post_init: bool) -> FacetResult<()> {
        for spec in schema.listeners.iter().filter(|s| s.post_init == post_init) {
            let options = ListenOptions {
                dispatch: spec.dispatch.clone(),
                priority: matches!(spec.kind, ListenerKind::PropertyPre(_)),
                deferred: false,
            };
            match &spec.kind {
                ListenerKind::Method(factory) => {
                    let handler = factory(self);
                    self.on_facet_set_with(&spec.pattern, handler, options)?;
                }
                ListenerKind::PropertyPre(name) => {
                    let owner = self.downgrade();
                    let name = name.clone();
                    let notifier = Notifier::internal(move |_| {
                        if let Some(owner) = owner.upgrade() {
                            owner.property_pre(&name);
                        }
                        Ok(())
                    });
                    self.subscribe(&spec.pattern, notifier, None, options)?;
                }
                ListenerKind::PropertyPost(name) => {
                    let owner = self.downgrade();
                    let name = name.clone();
                    let notifier = Notifier::internal(move |_| match owner.upgrade() {
                        Some(owner) => owner.property_post(&name),
                        None => Ok(()),
                    });
                    self.subscribe(&spec.pattern, notifier, None, options)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ObjectState> {
        let mut state = self.0.state.lock();
        let generation = self.0.class.generation();
        if state.generation != generation {
            state.generation = generation;
            self.refork(&mut state);
        }
        state
    }

    /// Move instance notifiers of stale forks onto the current class facets
    fn refork(&self, state: &mut ObjectState) {
        let names: Vec<String> = state.fork_bases.keys().cloned().collect();
        for name in names {
            let (Some(old_base), Some(fork)) = (state.fork_bases.get(&name), state.instance_facets.get(&name)) else {
                continue;
            };
            let base = self.0.class.class_facet(&name);
            if Arc::ptr_eq(&base, old_base) {
                continue;
            }
            let mut fresh = base.as_ref().clone();
            let mut front = 0;
            let mut past_class = false;
            for notifier in fork.notifiers() {
                if old_base.has_notifier(notifier.id()) {
                    past_class = true;
                } else if past_class {
                    fresh.add_notifier(notifier.clone(), false);
                } else {
                    fresh.notifiers.insert(front, notifier.clone());
                    front += 1;
                }
            }
            tracing::debug!(object = %self.class_name(), facet = %name, "facet fork refreshed");
            state.instance_facets.insert(name.clone(), Arc::new(fresh));
            state.fork_bases.insert(name, base);
        }
    }

    /// Unique identity
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// The object's class
    pub fn class(&self) -> &Arc<FacetClass> {
        &self.0.class
    }

    /// Name of the object's class
    pub fn class_name(&self) -> &str {
        self.0.class.name()
    }

    /// Whether both handles refer to the same object
    pub fn ptr_eq(&self, other: &HasFacets) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakHasFacets {
        WeakHasFacets(Arc::downgrade(&self.0))
    }

    pub(crate) fn schema(&self) -> Arc<ClassSchema> {
        self.0.class.schema()
    }

    // ----- introspection -----

    /// Facet backing `name` and where it was found
    ///
    /// Every name resolves: names neither declared nor added fall through
    /// to the prefix templates, which always include a catch-all.
    pub fn resolve_facet(&self, name: &str) -> (Arc<Facet>, FacetSource) {
        if let Some(facet) = self.lock().instance_facets.get(name) {
            return (facet.clone(), FacetSource::Instance);
        }
        if let Some(facet) = self.schema().facet(name) {
            return (facet.clone(), FacetSource::Class);
        }
        (self.0.class.prefix_facet(name), FacetSource::Prefix)
    }

    pub(crate) fn facet_arc(&self, name: &str) -> Arc<Facet> {
        self.resolve_facet(name).0
    }

    /// Whether `name` is a facet of this object rather than an unknown name
    /// caught by the implicit catch-all
    pub fn has_facet(&self, name: &str) -> bool {
        {
            let state = self.lock();
            if state.instance_facets.contains_key(name) || state.dynamic.contains(name) {
                return true;
            }
        }
        let schema = self.schema();
        if schema.facet(name).is_some() {
            return true;
        }
        let prefix = schema.match_prefix(name);
        !(prefix.is_empty() && schema.implicit_catch_all)
    }

    /// Facet backing `name`, including per-instance forks
    pub fn facet(&self, name: &str) -> Option<Arc<Facet>> {
        self.has_facet(name).then(|| self.facet_arc(name))
    }

    /// Class-level facet for `name`, ignoring per-instance forks
    pub fn base_facet(&self, name: &str) -> Option<Arc<Facet>> {
        self.has_facet(name).then(|| self.0.class.class_facet(name))
    }

    fn known_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.schema().facets.keys().cloned().collect();
        let state = self.lock();
        names.extend(state.instance_facets.keys().cloned());
        names.extend(state.dynamic.iter().cloned());
        names
    }

    /// Names whose facet metadata matches `filter`, sorted
    ///
    /// Events are left out unless the filter tests `type`.
    pub fn facet_names(&self, filter: &MetaFilter) -> Vec<String> {
        self.facets(filter).into_iter().map(|(name, _)| name).collect()
    }

    /// Facets whose metadata matches `filter`, sorted by name
    pub fn facets(&self, filter: &MetaFilter) -> Vec<(String, Arc<Facet>)> {
        let skip_events = !filter.mentions("type");
        self.known_names()
            .into_iter()
            .map(|name| {
                let facet = self.facet_arc(&name);
                (name, facet)
            })
            .filter(|(_, f)| !(skip_events && f.is_event()))
            .filter(|(_, f)| filter.matches(f.metadata()))
            .collect()
    }

    /// Every facet name, events included
    pub fn all_facet_names(&self) -> Vec<String> {
        self.known_names().into_iter().collect()
    }

    // ----- notifiers -----

    /// Attach a notifier to one facet of this instance only
    ///
    /// The first instance-level notifier forks the class facet, so sibling
    /// instances keep the class template.
    pub fn add_facet_notifier(&self, name: &str, notifier: Notifier, priority: bool) -> FacetResult<()> {
        let (facet, _) = self.resolve_facet(name);
        let is_delegate = matches!(facet.kind(), crate::facet::FacetKind::Delegate(_));
        {
            let mut state = self.lock();
            if !state.instance_facets.contains_key(name) && !state.added.contains(name) {
                state.fork_bases.insert(name.to_string(), facet.clone());
            }
            let entry = state
                .instance_facets
                .entry(name.to_string())
                .or_insert(facet);
            Arc::make_mut(entry).add_notifier(notifier, priority);
        }
        if is_delegate {
            self.ensure_delegate_listener(name)?;
        }
        Ok(())
    }

    /// Detach a notifier from one facet; returns whether it was installed
    pub fn remove_facet_notifier(&self, name: &str, id: NotifierId) -> bool {
        let removed = {
            let mut state = self.lock();
            state
                .instance_facets
                .get_mut(name)
                .and_then(|facet| Arc::make_mut(facet).take_notifier(id))
        };
        removed.is_some()
    }

    pub(crate) fn facet_has_notifier(&self, name: &str, id: NotifierId) -> bool {
        self.lock()
            .instance_facets
            .get(name)
            .is_some_and(|f| f.has_notifier(id))
    }

    /// Attach a notifier that sees every facet change of this instance
    pub fn add_any_notifier(&self, notifier: Notifier) {
        self.lock().any_notifiers.push(notifier);
    }

    /// Detach an object-wide notifier
    pub fn remove_any_notifier(&self, id: NotifierId) -> bool {
        let removed = {
            let mut state = self.lock();
            let index = state.any_notifiers.iter().position(|n| n.id() == id);
            index.map(|i| state.any_notifiers.remove(i))
        };
        removed.is_some()
    }

    /// Deliver a change of `name` to everything observing it
    ///
    /// Object-wide notifiers run first, then the facet's own notifiers in
    /// installation order. A facet carrying `event` metadata also fires the
    /// named event.
    pub fn facet_property_set(&self, name: &str, old: Value, new: Value) -> FacetResult<()> {
        let object_notifiers = {
            let state = self.lock();
            if state.notify_suspended {
                return Ok(());
            }
            state.any_notifiers.clone()
        };
        let facet = self.facet_arc(name);
        let schema = self.schema();
        let event = ChangeEvent::new(self, name, old, new);
        for notifier in object_notifiers
            .iter()
            .chain(schema.any_notifiers.iter())
            .chain(facet.notifiers().iter())
        {
            notifier.notify(&event)?;
        }
        if let Some(fired) = facet.metadata().get_str("event") {
            if fired != name {
                self.facet_property_set(fired, Value::Undefined, Value::from(name))?;
            }
        }
        Ok(())
    }

    /// Suspend notifications until the returned guard is dropped
    pub fn suspend_notifications(&self) -> NotifyGuard {
        let previous = std::mem::replace(&mut self.lock().notify_suspended, true);
        NotifyGuard {
            object: self.clone(),
            previous,
        }
    }

    /// Whether notifications are currently suspended
    pub fn notifications_suspended(&self) -> bool {
        self.lock().notify_suspended
    }

    // ----- subscriptions -----

    /// Subscribe `handler` to the facets named by `pattern`
    pub fn on_facet_set(&self, pattern: &str, handler: Handler) -> FacetResult<ListenerToken> {
        self.on_facet_set_with(pattern, handler, ListenOptions::default())
    }

    /// Subscribe with explicit dispatch, priority and binding options
    pub fn on_facet_set_with(
        &self,
        pattern: &str,
        handler: Handler,
        options: ListenOptions,
    ) -> FacetResult<ListenerToken> {
        let notifier = Notifier::new(handler.clone(), options.dispatch.clone());
        self.subscribe(pattern, notifier, Some(handler), options)
    }

    pub(crate) fn subscribe(
        &self,
        text: &str,
        delivery: Notifier,
        handler: Option<Handler>,
        options: ListenOptions,
    ) -> FacetResult<ListenerToken> {
        let pattern = Pattern::parse(text)?;
        let value_shaped = handler.as_ref().is_some_and(Handler::is_value_shaped);
        if value_shaped {
            pattern
                .check_resolvable()
                .map_err(|message| FacetError::AmbiguousListener {
                    pattern: text.to_string(),
                    message,
                })?;
        }

        let subscription = match pattern.simple_names() {
            Some(simple) => {
                let mut names = Vec::with_capacity(simple.len());
                for name in simple {
                    let collection = self.facet_arc(&name).collection_kind().is_some();
                    self.add_facet_notifier(&name, delivery.clone(), options.priority)?;
                    if collection {
                        let items = format!("{}_items", name);
                        self.add_facet_notifier(&items, delivery.clone(), options.priority)?;
                        names.push(items);
                    }
                    names.push(name);
                }
                Subscription::Direct {
                    pattern: text.to_string(),
                    handler,
                    notifier: delivery.id(),
                    names,
                }
            }
            None => Subscription::Bound(ListenerBinding::bind(self, pattern, delivery, handler, options)?),
        };

        let token = ListenerToken::new();
        self.lock().subscriptions.insert(token, subscription);
        tracing::debug!(object = %self.class_name(), pattern = %text, token = token.as_u64(), "listener bound");
        Ok(token)
    }

    /// Remove a subscription; returns false if the token is unknown
    pub fn unsubscribe(&self, token: ListenerToken) -> bool {
        let subscription = self.lock().subscriptions.remove(&token);
        let Some(subscription) = subscription else {
            return false;
        };
        match subscription {
            Subscription::Direct { notifier, names, .. } => {
                for name in &names {
                    self.remove_facet_notifier(name, notifier);
                }
            }
            Subscription::Bound(binding) => binding.unbind_all(),
        }
        tracing::debug!(object = %self.class_name(), token = token.as_u64(), "listener unbound");
        true
    }

    /// Remove every subscription of `handler` made with `pattern`
    pub fn remove_facet_listener(&self, pattern: &str, handler: &Handler) -> bool {
        let tokens: Vec<ListenerToken> = self
            .lock()
            .subscriptions
            .iter()
            .filter(|(_, s)| s.matches(pattern, handler))
            .map(|(token, _)| *token)
            .collect();
        let mut removed = false;
        for token in tokens {
            removed |= self.unsubscribe(token);
        }
        removed
    }
}

impl fmt::Debug for HasFacets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object #{}>", self.class_name(), self.id().as_u64())
    }
}
