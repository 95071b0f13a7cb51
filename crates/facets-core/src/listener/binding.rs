//! Live bindings of parsed patterns onto object graphs
//!
//! A binding keeps one entry per (pattern node, object) pair it reached.
//! Entries are reference counted because recursive patterns and shared
//! sub-objects can reach the same pair along several paths; notifiers are
//! installed when an entry first appears and removed when its last path
//! goes away. The delivery notifier itself is shared by every leaf, so
//! leaf installs are counted per (object, facet) and a facet never carries
//! it twice.

use super::parser::{Item, Node, NodeId, Pattern};
use crate::error::{FacetError, FacetResult};
use crate::facet::MetaFilter;
use crate::id::{NotifierId, ObjectId};
use crate::notify::{ChangeEvent, Handler, Notifier};
use crate::object::{HasFacets, ListenOptions, WeakHasFacets};
use crate::value::{ItemsEvent, Value};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Weak};

type Key = (NodeId, ObjectId);

enum Installed {
    /// The shared delivery notifier
    Leaf(String),
    /// A link or bookkeeping notifier owned by this entry
    Own(String, NotifierId),
    /// The delivery notifier as an object-wide notifier
    Any,
}

impl Installed {
    fn facet_name(&self) -> Option<&str> {
        match self {
            Installed::Leaf(name) | Installed::Own(name, _) => Some(name),
            Installed::Any => None,
        }
    }
}

struct Active {
    object: WeakHasFacets,
    refs: usize,
    installed: Vec<Installed>,
    /// Entries registered below this one, per link facet
    children: FxHashMap<String, Vec<Key>>,
}

#[derive(Default)]
struct BindingState {
    active: FxHashMap<Key, Active>,
    leaves: FxHashMap<(ObjectId, String), usize>,
    any: FxHashMap<ObjectId, usize>,
}

pub(crate) struct ListenerBinding {
    pattern: Arc<Pattern>,
    delivery: Notifier,
    handler: Option<Handler>,
    options: ListenOptions,
    value_shaped: bool,
    state: Mutex<BindingState>,
    me: Weak<ListenerBinding>,
}

impl ListenerBinding {
    /// Bind `pattern` starting at `object`
    ///
    /// On failure everything installed so far is removed again.
    pub(crate) fn bind(
        object: &HasFacets,
        pattern: Arc<Pattern>,
        delivery: Notifier,
        handler: Option<Handler>,
        options: ListenOptions,
    ) -> FacetResult<Arc<ListenerBinding>> {
        let value_shaped = handler.as_ref().is_some_and(Handler::is_value_shaped);
        let binding = Arc::new_cyclic(|me| ListenerBinding {
            pattern,
            delivery,
            handler,
            options,
            value_shaped,
            state: Mutex::new(BindingState::default()),
            me: me.clone(),
        });
        let mut roots = Vec::new();
        if let Err(e) = binding.register(binding.pattern.root(), object, &mut roots) {
            binding.unbind_all();
            return Err(e);
        }
        Ok(binding)
    }

    pub(crate) fn pattern_text(&self) -> &str {
        self.pattern.text()
    }

    pub(crate) fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    /// Remove every notifier this binding installed
    pub(crate) fn unbind_all(&self) {
        let entries: Vec<(Key, Active)> = self.state.lock().active.drain().collect();
        for (key, mut entry) in entries {
            entry.children.clear();
            self.teardown(key, entry);
        }
    }

    fn register(&self, node: NodeId, object: &HasFacets, out: &mut Vec<Key>) -> FacetResult<()> {
        let item = match self.pattern.node(node) {
            Node::Group(members) => {
                for &member in members {
                    self.register(member, object, out)?;
                }
                return Ok(());
            }
            Node::Item(item) => item,
        };

        let key = (node, object.id());
        out.push(key);
        {
            let mut state = self.state.lock();
            if let Some(active) = state.active.get_mut(&key) {
                active.refs += 1;
                return Ok(());
            }
            state.active.insert(
                key,
                Active {
                    object: object.downgrade(),
                    refs: 1,
                    installed: Vec::new(),
                    children: FxHashMap::default(),
                },
            );
        }

        if item.is_any_facet {
            self.install_any(key, object);
            return Ok(());
        }

        if item.simple {
            if !object.has_facet(&item.name) {
                if item.optional {
                    return Ok(());
                }
                return Err(FacetError::NoSuchFacet {
                    class: object.class_name().to_string(),
                    name: item.name.clone(),
                });
            }
            return self.register_name(node, item, object, &item.name);
        }

        // wildcard: watch for facets added later, then take what matches now
        self.install_own(key, object, "facet_added", self.facet_added_notifier(node))?;
        for name in object.facet_names(&MetaFilter::new()) {
            if Self::selects(item, object, &name) {
                self.register_name(node, item, object, &name)?;
            }
        }
        Ok(())
    }

    fn register_name(&self, node: NodeId, item: &Item, object: &HasFacets, name: &str) -> FacetResult<()> {
        let key = (node, object.id());
        let collection = object.facet_arc(name).collection_kind().is_some();
        let items = format!("{}_items", name);

        if item.list_handler {
            return self.install_leaf(key, object, &items);
        }

        let Some(next) = item.next else {
            self.install_leaf(key, object, name)?;
            if collection {
                self.install_leaf(key, object, &items)?;
            }
            return Ok(());
        };

        if self.value_shaped && item.notify && collection {
            return Err(self.ambiguous(name));
        }
        self.install_own(key, object, name, self.link_notifier(node))?;
        if collection {
            self.install_own(key, object, &items, self.link_items_notifier(node, name))?;
        }
        if self.options.deferred {
            return Ok(());
        }
        let value = object.get(name)?;
        if self.value_shaped && item.notify && is_collection(&value) {
            return Err(self.ambiguous(name));
        }
        self.bind_children(key, next, name, value.objects())
    }

    /// Register `next` on each child and record the children under `link`
    fn bind_children(&self, key: Key, next: NodeId, link: &str, children: Vec<HasFacets>) -> FacetResult<()> {
        let mut keys = Vec::new();
        let mut result = Ok(());
        for child in &children {
            if let Err(e) = self.register(next, child, &mut keys) {
                result = Err(e);
                break;
            }
        }
        // recorded even on failure so a later unbind releases them
        if let Some(active) = self.state.lock().active.get_mut(&key) {
            active.children.entry(link.to_string()).or_default().extend(keys);
        }
        result
    }

    fn unregister_key(&self, key: Key) {
        let entry = {
            let mut state = self.state.lock();
            let Some(active) = state.active.get_mut(&key) else {
                return;
            };
            active.refs -= 1;
            if active.refs > 0 {
                return;
            }
            state.active.remove(&key)
        };
        if let Some(entry) = entry {
            self.teardown(key, entry);
        }
    }

    fn teardown(&self, key: Key, entry: Active) {
        let object = entry.object.upgrade();
        for installed in entry.installed {
            match installed {
                Installed::Leaf(name) => self.release_leaf(object.as_ref(), key.1, name),
                Installed::Own(name, id) => {
                    if let Some(object) = &object {
                        object.remove_facet_notifier(&name, id);
                    }
                }
                Installed::Any => self.release_any(object.as_ref(), key.1),
            }
        }
        for (_, keys) in entry.children {
            for child in keys {
                self.unregister_key(child);
            }
        }
    }

    // ----- notifier bookkeeping -----

    fn record(&self, key: Key, installed: Installed) {
        if let Some(active) = self.state.lock().active.get_mut(&key) {
            active.installed.push(installed);
        }
    }

    fn install_leaf(&self, key: Key, object: &HasFacets, name: &str) -> FacetResult<()> {
        let first = {
            let mut state = self.state.lock();
            let count = state.leaves.entry((object.id(), name.to_string())).or_insert(0);
            *count += 1;
            let first = *count == 1;
            if let Some(active) = state.active.get_mut(&key) {
                active.installed.push(Installed::Leaf(name.to_string()));
            }
            first
        };
        if first {
            object.add_facet_notifier(name, self.delivery.clone(), self.options.priority)?;
        }
        Ok(())
    }

    fn release_leaf(&self, object: Option<&HasFacets>, id: ObjectId, name: String) {
        let last = {
            let mut state = self.state.lock();
            let key = (id, name.clone());
            match state.leaves.get_mut(&key) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    state.leaves.remove(&key);
                    true
                }
                None => false,
            }
        };
        if let (true, Some(object)) = (last, object) {
            object.remove_facet_notifier(&name, self.delivery.id());
        }
    }

    fn install_any(&self, key: Key, object: &HasFacets) {
        let first = {
            let mut state = self.state.lock();
            let count = state.any.entry(object.id()).or_insert(0);
            *count += 1;
            let first = *count == 1;
            if let Some(active) = state.active.get_mut(&key) {
                active.installed.push(Installed::Any);
            }
            first
        };
        if first {
            object.add_any_notifier(self.delivery.clone());
        }
    }

    fn release_any(&self, object: Option<&HasFacets>, id: ObjectId) {
        let last = {
            let mut state = self.state.lock();
            match state.any.get_mut(&id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    state.any.remove(&id);
                    true
                }
                None => false,
            }
        };
        if let (true, Some(object)) = (last, object) {
            object.remove_any_notifier(self.delivery.id());
        }
    }

    fn install_own(&self, key: Key, object: &HasFacets, name: &str, notifier: Notifier) -> FacetResult<()> {
        let id = notifier.id();
        object.add_facet_notifier(name, notifier, false)?;
        self.record(key, Installed::Own(name.to_string(), id));
        Ok(())
    }

    fn link_notifier(&self, node: NodeId) -> Notifier {
        let me = self.me.clone();
        Notifier::internal(move |event| match me.upgrade() {
            Some(binding) => binding.on_link_change(node, event),
            None => Ok(()),
        })
    }

    fn link_items_notifier(&self, node: NodeId, link: &str) -> Notifier {
        let me = self.me.clone();
        let link = link.to_string();
        Notifier::internal(move |event| match me.upgrade() {
            Some(binding) => binding.on_link_items(node, &link, event),
            None => Ok(()),
        })
    }

    fn facet_added_notifier(&self, node: NodeId) -> Notifier {
        let me = self.me.clone();
        Notifier::internal(move |event| match me.upgrade() {
            Some(binding) => binding.on_facet_added(node, event),
            None => Ok(()),
        })
    }

    // ----- change handling -----

    fn is_active(&self, key: &Key) -> bool {
        self.state.lock().active.contains_key(key)
    }

    fn on_link_change(&self, node: NodeId, event: &ChangeEvent) -> FacetResult<()> {
        let Some(item) = self.pattern.item(node) else {
            return Ok(());
        };
        let Some(next) = item.next else {
            return Ok(());
        };
        let key = (node, event.object.id());
        let previous = {
            let mut state = self.state.lock();
            match state.active.get_mut(&key) {
                Some(active) => active.children.remove(&event.name).unwrap_or_default(),
                None => return Ok(()),
            }
        };
        for child in previous {
            self.unregister_key(child);
        }
        if self.value_shaped && item.notify && is_collection(&event.new) {
            return Err(self.ambiguous(&event.name));
        }
        let rebound = self.bind_children(key, next, &event.name, event.new.objects());
        tracing::debug!(pattern = %self.pattern.text(), facet = %event.name, "listener rebound");
        rebound?;

        if item.notify {
            self.deliver_link(next, event)?;
        }
        Ok(())
    }

    fn on_link_items(&self, node: NodeId, link: &str, event: &ChangeEvent) -> FacetResult<()> {
        let Some(item) = self.pattern.item(node) else {
            return Ok(());
        };
        let Some(next) = item.next else {
            return Ok(());
        };
        let Some(items) = event.new.as_items() else {
            return Ok(());
        };
        let key = (node, event.object.id());
        if !self.is_active(&key) {
            return Ok(());
        }

        let (gone, came): (Vec<HasFacets>, Vec<HasFacets>) = match items {
            ItemsEvent::List { removed, added, .. } => (
                removed.iter().filter_map(|v| v.as_object().cloned()).collect(),
                added.iter().filter_map(|v| v.as_object().cloned()).collect(),
            ),
            ItemsEvent::Dict {
                added,
                changed,
                removed,
            } => {
                let current = event.object.get(link)?;
                let gone = removed
                    .values()
                    .chain(changed.values())
                    .filter_map(|v| v.as_object().cloned())
                    .collect();
                let mut came: Vec<HasFacets> = added.values().filter_map(|v| v.as_object().cloned()).collect();
                if let Some(map) = current.as_dict() {
                    came.extend(
                        changed
                            .keys()
                            .filter_map(|k| map.get(k))
                            .filter_map(|v| v.as_object().cloned()),
                    );
                }
                (gone, came)
            }
        };

        self.drop_children(key, link, &gone);
        self.bind_children(key, next, link, came)?;

        if item.notify && !self.value_shaped {
            self.delivery.notify(event)?;
        }
        Ok(())
    }

    /// Unregister one registration's worth of children for each object in `gone`
    fn drop_children(&self, key: Key, link: &str, gone: &[HasFacets]) {
        let taken = {
            let mut state = self.state.lock();
            let Some(kids) = state
                .active
                .get_mut(&key)
                .and_then(|active| active.children.get_mut(link))
            else {
                return;
            };
            let mut taken = Vec::new();
            for object in gone {
                let id = object.id();
                let mut seen = FxHashSet::default();
                let mut i = 0;
                while i < kids.len() {
                    if kids[i].1 == id && seen.insert(kids[i]) {
                        taken.push(kids.remove(i));
                    } else {
                        i += 1;
                    }
                }
            }
            taken
        };
        for child in taken {
            self.unregister_key(child);
        }
    }

    fn on_facet_added(&self, node: NodeId, event: &ChangeEvent) -> FacetResult<()> {
        let Some(item) = self.pattern.item(node) else {
            return Ok(());
        };
        let Some(name) = event.new.as_str() else {
            return Ok(());
        };
        let object = &event.object;
        let key = (node, object.id());
        let known = {
            let state = self.state.lock();
            match state.active.get(&key) {
                Some(active) => active
                    .installed
                    .iter()
                    .any(|i| i.facet_name() == Some(name)),
                None => return Ok(()),
            }
        };
        if known || !Self::selects(item, object, name) {
            return Ok(());
        }
        self.register_name(node, item, object, name)
    }

    /// Deliver a link reassignment
    ///
    /// Value-shaped handlers see the final facet of the chain, read from the
    /// old and new sub-objects. A chain ending in no object is an error,
    /// reported through the exception handlers.
    fn deliver_link(&self, next: NodeId, event: &ChangeEvent) -> FacetResult<()> {
        if !self.value_shaped {
            return self.delivery.notify(event);
        }

        let mut new_object = event.new.as_object().cloned();
        let mut old_object = event.old.as_object().cloned();
        let mut current = next;
        let name = loop {
            let Some(item) = self.pattern.item(current) else {
                return Err(self.ambiguous(&event.name));
            };
            let Some(following) = item.next else {
                break item.name.clone();
            };
            new_object = self.follow(new_object, &item.name)?;
            old_object = self.follow(old_object, &item.name).unwrap_or(None);
            current = following;
        };

        let Some(target) = new_object else {
            return Err(FacetError::Notification {
                name: event.name.clone(),
                message: format!(
                    "handler of '{}' cannot see the final facet while '{}' leads to no object",
                    self.pattern.text(),
                    event.name
                ),
            });
        };
        let new = target.get(&name)?;
        let old = old_object
            .and_then(|o| o.get(&name).ok())
            .unwrap_or_default();
        self.delivery.notify(&ChangeEvent::new(&target, &name, old, new))
    }

    fn follow(&self, object: Option<HasFacets>, link: &str) -> FacetResult<Option<HasFacets>> {
        let Some(object) = object else {
            return Ok(None);
        };
        let value = object.get(link)?;
        if is_collection(&value) {
            return Err(self.ambiguous(link));
        }
        Ok(value.as_object().cloned())
    }

    fn selects(item: &Item, object: &HasFacets, name: &str) -> bool {
        if !name.starts_with(&item.name) {
            return false;
        }
        let Some(facet) = object.facet(name) else {
            return false;
        };
        if facet.is_event() {
            return false;
        }
        item.metadata_name.is_empty()
            || facet.metadata().is_defined(&item.metadata_name) == item.metadata_defined
    }

    fn ambiguous(&self, name: &str) -> FacetError {
        FacetError::AmbiguousListener {
            pattern: self.pattern.text().to_string(),
            message: format!("'{}' holds a collection; use ':' to suppress its notifications", name),
        }
    }
}

fn is_collection(value: &Value) -> bool {
    matches!(value, Value::List(_) | Value::Dict(_))
}

#[cfg(test)]
mod tests {
    use crate::error::FacetError;
    use crate::facet::Facet;
    use crate::notify::Handler;
    use crate::object::HasFacets;
    use crate::schema::{ClassDecl, FacetClass};
    use crate::value::Value;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn classes() -> (Arc<FacetClass>, Arc<FacetClass>) {
        let node = FacetClass::define(
            ClassDecl::new("LbNode")
                .facet("value", Facet::int(0).with_metadata("tag", "yes"))
                .facet("b", Facet::int(0))
                .facet("name", Facet::str(""))
                .facet("children", Facet::list(None)),
        )
        .unwrap();
        let holder = FacetClass::define(
            ClassDecl::new("LbHolder")
                .facet("a", Facet::instance(Some("LbNode")))
                .facet("nodes", Facet::list(None)),
        )
        .unwrap();
        (node, holder)
    }

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let handler = Handler::no_args(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, handler)
    }

    fn recorder() -> (Arc<Mutex<Vec<(String, Value, Value)>>>, Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let handler = Handler::full(move |_: &HasFacets, name: &str, old: &Value, new: &Value| {
            sink.lock().push((name.to_string(), old.clone(), new.clone()));
        });
        (log, handler)
    }

    #[test]
    fn test_link_rebinds_on_reassignment() {
        let (node, holder) = classes();
        let first = node.instantiate().unwrap();
        let second = node.instantiate().unwrap();
        let obj = holder.instantiate_with(&[("a", Value::from(&first))]).unwrap();
        let (log, handler) = recorder();
        obj.on_facet_set("a.b", handler).unwrap();

        first.set("b", 1).unwrap();
        obj.set("a", Value::from(&second)).unwrap();
        first.set("b", 2).unwrap();
        second.set("b", 3).unwrap();

        let log = log.lock();
        let names: Vec<&str> = log.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
        assert_eq!(log[2].2, Value::Int(3));
        assert!(first.facet("b").unwrap().notifiers().is_empty());
    }

    #[test]
    fn test_colon_suppresses_link_notification() {
        let (node, holder) = classes();
        let first = node.instantiate().unwrap();
        let obj = holder.instantiate_with(&[("a", Value::from(&first))]).unwrap();
        let (hits, handler) = counter();
        obj.on_facet_set("a:b", handler).unwrap();

        obj.set("a", Value::from(&node.instantiate().unwrap())).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        obj.get("a").unwrap().as_object().unwrap().set("b", 4).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_list_link_follows_items() {
        let (node, holder) = classes();
        let obj = holder.instantiate().unwrap();
        let kept = node.instantiate().unwrap();
        let dropped = node.instantiate().unwrap();
        obj.set("nodes", Value::list([Value::from(&kept)])).unwrap();

        let (log, handler) = recorder();
        obj.on_facet_set("nodes:value", handler).unwrap();

        obj.list_append("nodes", Value::from(&dropped)).unwrap();
        dropped.set("value", 1).unwrap();
        obj.list_remove("nodes", 1).unwrap();
        dropped.set("value", 2).unwrap();
        kept.set("value", 3).unwrap();

        let news: Vec<Value> = log.lock().iter().map(|(_, _, new)| new.clone()).collect();
        assert_eq!(news, vec![Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn test_recursive_pattern_reaches_descendants() {
        let (node, _) = classes();
        let root = node.instantiate().unwrap();
        let child = node.instantiate().unwrap();
        let grandchild = node.instantiate().unwrap();
        child.set("children", Value::list([Value::from(&grandchild)])).unwrap();
        root.set("children", Value::list([Value::from(&child)])).unwrap();

        let (log, handler) = recorder();
        root.on_facet_set("children*:name", handler).unwrap();
        grandchild.set("name", "leaf").unwrap();
        root.set("name", "top").unwrap();

        let news: Vec<Value> = log.lock().iter().map(|(_, _, new)| new.clone()).collect();
        assert_eq!(news, vec![Value::from("leaf"), Value::from("top")]);
    }

    #[test]
    fn test_metadata_wildcard_picks_up_added_facets() {
        let (node, _) = classes();
        let obj = node.instantiate().unwrap();
        let (log, handler) = recorder();
        obj.on_facet_set("+tag", handler).unwrap();

        obj.set("b", 1).unwrap();
        obj.set("value", 1).unwrap();
        obj.add_facet("extra", Facet::int(0).with_metadata("tag", "yes")).unwrap();
        obj.set("extra", 5).unwrap();

        let names: Vec<String> = log.lock().iter().map(|(n, _, _)| n.clone()).collect();
        assert_eq!(names, vec!["value", "extra"]);
    }

    #[test]
    fn test_overlapping_items_deliver_once() {
        let (node, _) = classes();
        let obj = node.instantiate().unwrap();
        let (hits, handler) = counter();
        let token = obj.on_facet_set("value, +tag", handler).unwrap();
        obj.set("value", 1).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(obj.unsubscribe(token));
        obj.set("value", 2).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(obj.facet("value").unwrap().notifiers().is_empty());
    }

    #[test]
    fn test_value_shaped_handler_sees_final_facet() {
        let (node, holder) = classes();
        let first = node.instantiate().unwrap();
        let second = node.instantiate_with(&[("b", Value::Int(9))]).unwrap();
        let obj = holder.instantiate_with(&[("a", Value::from(&first))]).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        obj.on_facet_set("a.b", Handler::name_new(move |name, v| sink.lock().push((name.to_string(), v.clone()))))
            .unwrap();

        obj.set("a", Value::from(&second)).unwrap();
        assert_eq!(*seen.lock(), vec![("b".to_string(), Value::Int(9))]);

        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        crate::notify::push_exception_handler(move |f| sink.lock().push(f.name.clone()), false);
        obj.set("a", Value::None).unwrap();
        crate::notify::pop_exception_handler();
        assert_eq!(*failures.lock(), vec!["a".to_string()]);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_value_shaped_handler_rejects_collection_link() {
        let (_, holder) = classes();
        let obj = holder.instantiate().unwrap();
        let err = obj
            .on_facet_set("nodes.value", Handler::new_value(|_| {}))
            .unwrap_err();
        assert!(matches!(err, FacetError::AmbiguousListener { .. }));
        assert!(obj.facet("nodes").unwrap().notifiers().is_empty());
    }

    #[test]
    fn test_missing_names() {
        let (node, holder) = classes();
        let obj = holder.instantiate_with(&[("a", Value::from(&node.instantiate().unwrap()))]).unwrap();
        let err = obj.on_facet_set("a.nothere", Handler::no_args(|| {})).unwrap_err();
        assert!(matches!(err, FacetError::NoSuchFacet { .. }));
        assert!(obj.on_facet_set("a.nothere?", Handler::no_args(|| {})).is_ok());
    }

    #[test]
    fn test_deferred_binding_waits_for_assignment() {
        let (node, holder) = classes();
        let first = node.instantiate().unwrap();
        let obj = holder.instantiate_with(&[("a", Value::from(&first))]).unwrap();
        let (hits, handler) = counter();
        let options = crate::object::ListenOptions {
            deferred: true,
            ..Default::default()
        };
        obj.on_facet_set_with("a:b", handler, options).unwrap();
        first.set("b", 1).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let second = node.instantiate().unwrap();
        obj.set("a", Value::from(&second)).unwrap();
        second.set("b", 1).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
