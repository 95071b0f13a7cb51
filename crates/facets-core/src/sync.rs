//! Facet synchronization between objects
//!
//! A sync link mirrors one facet onto a facet of a peer object. List facets
//! forward their in-place changes as splices and dict facets as key
//! updates, so unrelated changes made on the peer survive. Each object
//! keeps a set of facet names it is currently receiving; a change that
//! arrives while its facet is in that set is not sent back, which is what
//! stops mutual links from bouncing.

use crate::error::FacetResult;
use crate::facet::CollectionKind;
use crate::id::NotifierId;
use crate::notify::{ChangeEvent, Notifier};
use crate::object::{HasFacets, WeakHasFacets};
use crate::value::{ItemsEvent, Value};

/// One outgoing mirror of a facet
#[derive(Debug)]
pub(crate) struct SyncLink {
    peer: WeakHasFacets,
    alias: String,
    notifiers: Vec<(String, NotifierId)>,
    mutual: bool,
}

impl SyncLink {
    fn targets(&self, other: &HasFacets, alias: &str) -> bool {
        self.alias == alias && self.peer.upgrade().is_some_and(|peer| peer.ptr_eq(other))
    }
}

impl HasFacets {
    /// Mirror facet `name` onto `alias` (default: the same name) of `other`
    ///
    /// The current value is copied right away. With `mutual`, changes made
    /// on `other` flow back as well.
    pub fn sync_facet(&self, name: &str, other: &HasFacets, alias: Option<&str>, mutual: bool) -> FacetResult<()> {
        let alias = alias.unwrap_or(name);
        self.install_sync(name, other, alias, mutual)?;
        let value = self.get(name)?;
        other.receive(alias, || other.set(alias, value))?;
        if mutual {
            other.install_sync(alias, self, name, true)?;
        }
        tracing::debug!(
            object = %self.class_name(),
            facet = name,
            peer = %other.class_name(),
            alias,
            mutual,
            "facet synced"
        );
        Ok(())
    }

    /// Stop mirroring `name` onto `other`; returns false if no such link exists
    pub fn unsync_facet(&self, name: &str, other: &HasFacets, alias: Option<&str>) -> bool {
        let alias = alias.unwrap_or(name);
        let link = {
            let mut state = self.lock();
            let Some(links) = state.sync.get_mut(name) else {
                return false;
            };
            let Some(index) = links.iter().position(|l| l.targets(other, alias)) else {
                return false;
            };
            let link = links.remove(index);
            if links.is_empty() {
                state.sync.remove(name);
            }
            link
        };
        for (facet, id) in &link.notifiers {
            self.remove_facet_notifier(facet, *id);
        }
        if link.mutual {
            other.unsync_facet(alias, self, Some(name));
        }
        true
    }

    fn install_sync(&self, name: &str, peer: &HasFacets, alias: &str, mutual: bool) -> FacetResult<()> {
        let mut notifiers = Vec::new();

        let forward = forward_value(name, peer.downgrade(), alias);
        notifiers.push((name.to_string(), forward.id()));
        self.add_facet_notifier(name, forward, false)?;

        if self.facet_arc(name).collection_kind().is_some() {
            let items = format!("{}_items", name);
            let forward = forward_items(name, peer.downgrade(), alias);
            notifiers.push((items.clone(), forward.id()));
            self.add_facet_notifier(&items, forward, false)?;
        }

        self.lock().sync.entry(name.to_string()).or_default().push(SyncLink {
            peer: peer.downgrade(),
            alias: alias.to_string(),
            notifiers,
            mutual,
        });
        Ok(())
    }

    /// Run `apply` with `name` marked as being received
    ///
    /// Nested calls for a name already being received do nothing.
    fn receive<F>(&self, name: &str, apply: F) -> FacetResult<()>
    where
        F: FnOnce() -> FacetResult<()>,
    {
        if !self.lock().syncing.insert(name.to_string()) {
            return Ok(());
        }
        let result = apply();
        self.lock().syncing.remove(name);
        result
    }

    fn is_receiving(&self, name: &str) -> bool {
        self.lock().syncing.contains(name)
    }
}

fn forward_value(name: &str, peer: WeakHasFacets, alias: &str) -> Notifier {
    let name = name.to_string();
    let alias = alias.to_string();
    Notifier::internal(move |event: &ChangeEvent| {
        let Some(peer) = peer.upgrade() else {
            return Ok(());
        };
        if event.object.is_receiving(&name) {
            return Ok(());
        }
        peer.receive(&alias, || peer.set(&alias, event.new.clone()))
    })
}

fn forward_items(name: &str, peer: WeakHasFacets, alias: &str) -> Notifier {
    let name = name.to_string();
    let alias = alias.to_string();
    Notifier::internal(move |event: &ChangeEvent| {
        let Some(peer) = peer.upgrade() else {
            return Ok(());
        };
        if event.object.is_receiving(&name) {
            return Ok(());
        }
        let Some(items) = event.new.as_items() else {
            return Ok(());
        };
        match (items, event.object.facet_arc(&name).collection_kind()) {
            (ItemsEvent::List { index, removed, added }, Some(CollectionKind::List)) => {
                let range = *index..index + removed.len();
                peer.receive(&alias, || peer.list_splice(&alias, range, added.clone()).map(|_| ()))
            }
            (ItemsEvent::Dict { added, changed, removed }, Some(CollectionKind::Dict)) => {
                let current = event.object.get(&name)?;
                peer.receive(&alias, || {
                    for key in removed.keys() {
                        peer.dict_remove(&alias, key)?;
                    }
                    for (key, value) in added {
                        peer.dict_insert(&alias, key, value.clone())?;
                    }
                    if let Some(map) = current.as_dict() {
                        for key in changed.keys() {
                            let value = map.get(key).cloned().unwrap_or(Value::None);
                            peer.dict_insert(&alias, key, value)?;
                        }
                    }
                    Ok(())
                })
            }
            _ => Ok(()),
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::facet::Facet;
    use crate::notify::Handler;
    use crate::schema::{ClassDecl, FacetClass};
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn class() -> Arc<FacetClass> {
        FacetClass::define(
            ClassDecl::new("SyncPeer")
                .facet("x", Facet::int(0))
                .facet("y", Facet::int(0))
                .facet("items", Facet::list(None))
                .facet("table", Facet::dict(None)),
        )
        .unwrap()
    }

    #[test]
    fn test_initial_copy_and_forward() {
        let class = class();
        let a = class.instantiate_with(&[("x", Value::Int(4))]).unwrap();
        let b = class.instantiate().unwrap();
        a.sync_facet("x", &b, Some("y"), false).unwrap();
        assert_eq!(b.get("y").unwrap(), Value::Int(4));

        a.set("x", 6).unwrap();
        assert_eq!(b.get("y").unwrap(), Value::Int(6));
        b.set("y", 1).unwrap();
        assert_eq!(a.get("x").unwrap(), Value::Int(6));
    }

    #[test]
    fn test_mutual_sync_does_not_bounce() {
        let class = class();
        let a = class.instantiate().unwrap();
        let b = class.instantiate().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        a.on_facet_set("x", Handler::no_args(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        a.sync_facet("x", &b, None, true).unwrap();

        a.set("x", 5).unwrap();
        assert_eq!(b.get("x").unwrap(), Value::Int(5));
        b.set("x", 7).unwrap();
        assert_eq!(a.get("x").unwrap(), Value::Int(7));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_list_changes_forward_as_splices() {
        let class = class();
        let a = class.instantiate().unwrap();
        let b = class.instantiate().unwrap();
        a.set("items", Value::list([Value::Int(1), Value::Int(2)])).unwrap();
        a.sync_facet("items", &b, None, false).unwrap();

        b.list_append("items", Value::Int(99)).unwrap();
        a.list_insert("items", 0, Value::Int(0)).unwrap();
        let expected = Value::list([Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(99)]);
        assert_eq!(b.get("items").unwrap(), expected);
        assert_eq!(
            a.get("items").unwrap(),
            Value::list([Value::Int(0), Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_dict_changes_forward_per_key() {
        let class = class();
        let a = class.instantiate().unwrap();
        let b = class.instantiate().unwrap();
        a.sync_facet("table", &b, None, true).unwrap();

        a.dict_insert("table", "k", Value::Int(1)).unwrap();
        b.dict_insert("table", "k", Value::Int(2)).unwrap();
        assert_eq!(a.get("table").unwrap(), Value::dict([("k", Value::Int(2))]));
        a.dict_remove("table", "k").unwrap();
        assert_eq!(b.get("table").unwrap(), Value::dict(Vec::<(String, Value)>::new()));
    }

    #[test]
    fn test_unsync_removes_both_directions() {
        let class = class();
        let a = class.instantiate().unwrap();
        let b = class.instantiate().unwrap();
        a.sync_facet("x", &b, None, true).unwrap();
        assert!(a.unsync_facet("x", &b, None));
        assert!(!a.unsync_facet("x", &b, None));

        a.set("x", 3).unwrap();
        b.set("x", 8).unwrap();
        assert_eq!(a.get("x").unwrap(), Value::Int(3));
        assert!(a.facet("x").unwrap().notifiers().is_empty());
        assert!(b.facet("x").unwrap().notifiers().is_empty());
    }
}
