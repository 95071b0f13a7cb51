//! Registered classes
//!
//! A [`FacetClass`] owns its declaration and the schema built from it. The
//! schema is swapped wholesale when the class is extended at runtime, and
//! live subclasses are rebuilt so they pick up the change.

use super::{build_schema, ClassDecl, ClassRegistry, ClassSchema, Member};
use crate::error::{FacetError, FacetResult};
use crate::facet::{Facet, MetaFilter};
use crate::notify::{Dispatch, Notifier};
use crate::object::HasFacets;
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A defined class
pub struct FacetClass {
    name: String,
    decl: RwLock<ClassDecl>,
    schema: RwLock<Arc<ClassSchema>>,
    subclasses: Mutex<Vec<Weak<FacetClass>>>,
    /// Prefix-matched names seen so far, each with its own template clone
    prefix_cache: Mutex<FxHashMap<String, Arc<Facet>>>,
    /// Categories merged so far, with the facet names each contributed
    categories: Mutex<Vec<(String, Vec<String>)>>,
    /// Bumped on every rebuild so instances can refresh their forks
    generation: AtomicU64,
}

impl FacetClass {
    /// Build, register and return a class
    pub fn define(decl: ClassDecl) -> FacetResult<Arc<FacetClass>> {
        if decl.category {
            return Err(FacetError::SchemaConflict {
                class: decl.name.clone(),
                message: "a category can only be merged into an existing class".to_string(),
            });
        }
        let schema = build_schema(&decl)?;
        let class = Arc::new(FacetClass {
            name: decl.name.clone(),
            schema: RwLock::new(Arc::new(schema)),
            decl: RwLock::new(decl),
            subclasses: Mutex::new(Vec::new()),
            prefix_cache: Mutex::new(FxHashMap::default()),
            categories: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        });
        for base in class.bases() {
            base.subclasses.lock().push(Arc::downgrade(&class));
        }
        ClassRegistry::global().register(class.clone());
        Ok(class)
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct base classes
    pub fn bases(&self) -> Vec<Arc<FacetClass>> {
        self.decl.read().bases.clone()
    }

    /// Current composed schema
    pub fn schema(&self) -> Arc<ClassSchema> {
        self.schema.read().clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether this class is `name` or inherits from it
    pub fn is_subclass_of(&self, name: &str) -> bool {
        self.name == name || self.bases().iter().any(|b| b.is_subclass_of(name))
    }

    /// Create an instance with every facet at its default
    pub fn instantiate(self: &Arc<Self>) -> FacetResult<HasFacets> {
        HasFacets::create(self, &[])
    }

    /// Create an instance and assign `values` before post-init listeners bind
    pub fn instantiate_with(self: &Arc<Self>, values: &[(&str, Value)]) -> FacetResult<HasFacets> {
        HasFacets::create(self, values)
    }

    /// Class-level facet for `name`, explicit or prefix-matched
    pub fn class_facet(&self, name: &str) -> Arc<Facet> {
        match self.schema().facet(name) {
            Some(facet) => facet.clone(),
            None => self.prefix_facet(name),
        }
    }

    /// Explicit facet names whose metadata matches `filter`
    pub fn class_facet_names(&self, filter: &MetaFilter) -> Vec<String> {
        self.schema().matching_names(filter)
    }

    /// Composition warnings of the current schema
    pub fn warnings(&self) -> Vec<String> {
        self.schema().warnings().to_vec()
    }

    /// Template for a name not explicitly declared; the first lookup of a
    /// name clones the matching prefix template and caches the clone
    pub(crate) fn prefix_facet(&self, name: &str) -> Arc<Facet> {
        let mut cache = self.prefix_cache.lock();
        if let Some(facet) = cache.get(name) {
            return facet.clone();
        }
        let schema = self.schema();
        let prefix = schema.match_prefix(name);
        let mut facet = match schema.prefix_facet(prefix) {
            Some(template) => template.as_ref().clone(),
            None => Facet::catch_all(),
        };
        for (target, handler) in &schema.static_handlers {
            if target == name {
                facet.add_notifier(Notifier::new(handler.clone(), Dispatch::Same), false);
            }
        }
        let facet = Arc::new(facet);
        cache.insert(name.to_string(), facet.clone());
        facet
    }

    /// Add a facet to the class and every live subclass
    pub fn add_class_facet(&self, name: &str, facet: Facet) -> FacetResult<()> {
        {
            let mut decl = self.decl.write();
            decl.members.retain(|(n, _)| n != name);
            decl.members.push((name.to_string(), Member::Facet(facet)));
        }
        self.rebuild()
    }

    /// Merge a category into this class
    ///
    /// A category may add facets and methods but may not redefine a facet
    /// the class (or another category) already provides.
    pub fn add_category(&self, category: ClassDecl) -> FacetResult<()> {
        let schema = self.schema();
        let mut added = Vec::new();
        for (name, member) in &category.members {
            if !matches!(member, Member::Facet(_)) {
                continue;
            }
            let existing = match name.strip_suffix('_') {
                Some(prefix) => schema.prefix_facet(prefix).is_some() && !(prefix.is_empty() && schema.implicit_catch_all),
                None => schema.facet(name).is_some(),
            };
            if existing {
                let owner = self
                    .categories
                    .lock()
                    .iter()
                    .find(|(_, names)| names.contains(name))
                    .map(|(cat, _)| format!("category '{}'", cat))
                    .unwrap_or_else(|| format!("class '{}'", self.name));
                return Err(FacetError::SchemaConflict {
                    class: self.name.clone(),
                    message: format!(
                        "category '{}' redefines '{}' already defined by {}",
                        category.name, name, owner
                    ),
                });
            }
            added.push(name.clone());
        }

        let previous = self.decl.read().clone();
        {
            let mut decl = self.decl.write();
            decl.bases.extend(category.bases.iter().cloned());
            decl.members.extend(category.members.iter().cloned());
        }
        if let Err(err) = self.rebuild() {
            *self.decl.write() = previous;
            return Err(err);
        }
        self.categories.lock().push((category.name, added));
        Ok(())
    }

    fn rebuild(&self) -> FacetResult<()> {
        let schema = build_schema(&self.decl.read())?;
        *self.schema.write() = Arc::new(schema);
        self.prefix_cache.lock().clear();
        self.generation.fetch_add(1, Ordering::AcqRel);

        let live: Vec<Arc<FacetClass>> = {
            let mut subclasses = self.subclasses.lock();
            subclasses.retain(|w| w.strong_count() > 0);
            subclasses.iter().filter_map(Weak::upgrade).collect()
        };
        for sub in live {
            sub.rebuild()?;
        }
        Ok(())
    }
}

impl fmt::Debug for FacetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacetClass")
            .field("name", &self.name)
            .field("schema", &self.schema())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_subclass_of() {
        let base = FacetClass::define(ClassDecl::new("ClsShape")).unwrap();
        let sub = FacetClass::define(ClassDecl::new("ClsSquare").base(&base)).unwrap();
        assert!(sub.is_subclass_of("ClsShape"));
        assert!(sub.is_subclass_of("ClsSquare"));
        assert!(!base.is_subclass_of("ClsSquare"));
    }

    #[test]
    fn test_prefix_clone_is_cached() {
        let class = FacetClass::define(ClassDecl::new("ClsWild").facet("tmp_", Facet::int(0))).unwrap();
        let first = class.prefix_facet("tmp_a");
        let again = class.prefix_facet("tmp_a");
        let other = class.prefix_facet("tmp_b");
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        let template = class.schema().prefix_facet("tmp").unwrap().clone();
        assert!(!Arc::ptr_eq(&first, &template));
    }

    #[test]
    fn test_add_class_facet_reaches_subclass() {
        let base = FacetClass::define(ClassDecl::new("ClsGrowBase")).unwrap();
        let sub = FacetClass::define(ClassDecl::new("ClsGrowSub").base(&base)).unwrap();
        base.add_class_facet("late", Facet::int(9)).unwrap();
        assert!(base.schema().facet("late").is_some());
        assert!(sub.schema().facet("late").is_some());
    }

    #[test]
    fn test_category_conflict() {
        let class = FacetClass::define(ClassDecl::new("ClsCat").facet("x", Facet::int(0))).unwrap();
        class
            .add_category(ClassDecl::category("Extra").facet("y", Facet::int(1)))
            .unwrap();
        assert!(class.schema().facet("y").is_some());

        let err = class
            .add_category(ClassDecl::category("Clash").facet("y", Facet::str("")))
            .unwrap_err();
        assert!(matches!(err, FacetError::SchemaConflict { ref message, .. } if message.contains("Extra")));

        let err = class
            .add_category(ClassDecl::category("Clash2").facet("x", Facet::str("")))
            .unwrap_err();
        assert!(matches!(err, FacetError::SchemaConflict { .. }));
    }

    #[test]
    fn test_define_rejects_category() {
        assert!(FacetClass::define(ClassDecl::category("Loose")).is_err());
    }
}
