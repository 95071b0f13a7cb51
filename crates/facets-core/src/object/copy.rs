//! Copying facet values between objects and cloning objects

use super::HasFacets;
use crate::error::FacetResult;
use crate::facet::{CopyPolicy, FacetKind, MetaFilter};
use crate::value::{CopyMemo, Value};

impl HasFacets {
    /// Names that copy and clone transfer by default
    ///
    /// Transient facets, shadows, constants and properties without a
    /// setter are left out.
    pub fn copyable_facet_names(&self, filter: &MetaFilter) -> Vec<String> {
        self.facets(filter)
            .into_iter()
            .filter(|(_, facet)| {
                !facet.is_transient()
                    && !facet.is_items_shadow()
                    && !facet.metadata().is_defined("shadow")
                    && facet.is_settable()
                    && !facet.is_event()
            })
            .map(|(name, _)| name)
            .collect()
    }

    /// Copy values from `other` into this object; returns the names that
    /// could not be copied
    ///
    /// Delegates and properties are copied last so the facets they depend
    /// on already hold their final values. A facet's own copy policy wins
    /// over `copy`; with neither, values are shared.
    pub fn copy_facets(&self, other: &HasFacets, names: Option<&[&str]>, copy: Option<CopyPolicy>) -> Vec<String> {
        let mut memo = CopyMemo::default();
        self.copy_facets_with(other, names, copy, &mut memo)
    }

    fn copy_facets_with(
        &self,
        other: &HasFacets,
        names: Option<&[&str]>,
        copy: Option<CopyPolicy>,
        memo: &mut CopyMemo,
    ) -> Vec<String> {
        let names: Vec<String> = match names {
            Some(names) => names.iter().map(|n| n.to_string()).collect(),
            None => other.copyable_facet_names(&MetaFilter::new()),
        };
        let (deferred, direct): (Vec<String>, Vec<String>) = names.into_iter().partition(|name| {
            matches!(
                self.facet_arc(name).kind(),
                FacetKind::Delegate(_) | FacetKind::Property(_)
            )
        });

        let mut failed = Vec::new();
        for name in direct.into_iter().chain(deferred) {
            if let Err(err) = self.copy_one(other, &name, copy, memo) {
                tracing::debug!(object = %self.class_name(), facet = %name, error = %err, "copy failed");
                failed.push(name);
            }
        }
        failed
    }

    fn copy_one(&self, other: &HasFacets, name: &str, copy: Option<CopyPolicy>, memo: &mut CopyMemo) -> FacetResult<()> {
        let facet = self.facet_arc(name);
        let value = other.get(name)?;
        let value = match facet.copy_policy().or(copy).unwrap_or(CopyPolicy::Ref) {
            CopyPolicy::Ref => value,
            CopyPolicy::Shallow => value.shallow_copy()?,
            CopyPolicy::Deep => value.deep_copy(memo)?,
        };
        self.set(name, value)
    }

    /// New instance of the same class holding copies of this object's values
    pub fn clone_facets(&self, names: Option<&[&str]>, copy: Option<CopyPolicy>) -> FacetResult<HasFacets> {
        let mut memo = CopyMemo::default();
        self.clone_with(names, copy, &mut memo)
    }

    fn clone_with(&self, names: Option<&[&str]>, copy: Option<CopyPolicy>, memo: &mut CopyMemo) -> FacetResult<HasFacets> {
        let clone = self.class().instantiate()?;
        memo.insert(self.id(), clone.clone());
        let failed = clone.copy_facets_with(self, names, copy, memo);
        if !failed.is_empty() {
            tracing::debug!(object = %self.class_name(), failed = ?failed, "clone skipped facets");
        }
        Ok(clone)
    }

    /// New instance sharing this object's values
    pub fn shallow_clone(&self) -> FacetResult<HasFacets> {
        self.clone_facets(None, Some(CopyPolicy::Ref))
    }

    /// New instance holding deep copies of this object's values
    pub fn deep_clone(&self, memo: &mut CopyMemo) -> FacetResult<HasFacets> {
        self.clone_with(None, Some(CopyPolicy::Deep), memo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::Facet;
    use crate::schema::{ClassDecl, FacetClass};
    use std::sync::Arc;

    fn holder() -> Arc<FacetClass> {
        FacetClass::define(
            ClassDecl::new("CopyHolder")
                .facet("items", Facet::list(None))
                .facet("shared", Facet::list(None).with_copy(CopyPolicy::Ref))
                .facet("label", Facet::str(""))
                .facet("scratch", Facet::int(0).transient())
                .facet("child", Facet::instance(None)),
        )
        .unwrap()
    }

    #[test]
    fn test_copyable_names() {
        let obj = holder().instantiate().unwrap();
        assert_eq!(
            obj.copyable_facet_names(&MetaFilter::new()),
            vec!["child", "items", "label", "shared"]
        );
    }

    #[test]
    fn test_deep_copy_policy() {
        let class = holder();
        let src = class.instantiate().unwrap();
        src.set("items", Value::list(vec![Value::list(vec![Value::Int(1)])])).unwrap();
        src.set("shared", Value::list(vec![Value::Int(2)])).unwrap();

        let dst = class.instantiate().unwrap();
        let failed = dst.copy_facets(&src, None, Some(CopyPolicy::Deep));
        assert!(failed.is_empty());

        let a = src.get("items").unwrap();
        let b = dst.get("items").unwrap();
        assert_eq!(a, b);
        assert!(!a.is_identical(&b));
        assert!(src.get("shared").unwrap().is_identical(&dst.get("shared").unwrap()));
    }

    #[test]
    fn test_deep_clone_preserves_cycles() {
        let class = holder();
        let a = class.instantiate().unwrap();
        let b = class.instantiate().unwrap();
        a.set("child", &b).unwrap();
        b.set("child", &a).unwrap();

        let mut memo = CopyMemo::default();
        let a2 = a.deep_clone(&mut memo).unwrap();
        let b2 = a2.get("child").unwrap().as_object().cloned().unwrap();
        assert!(!b2.ptr_eq(&b));
        let back = b2.get("child").unwrap().as_object().cloned().unwrap();
        assert!(back.ptr_eq(&a2));

        // break the reference cycles so the objects can be freed
        a.set("child", Value::None).unwrap();
        a2.set("child", Value::None).unwrap();
    }

    #[test]
    fn test_copy_reports_failures() {
        let class = holder();
        let src = class.instantiate().unwrap();
        let dst = class.instantiate().unwrap();
        let failed = dst.copy_facets(&src, Some(&["label", "nothing"]), None);
        assert_eq!(failed, vec!["nothing"]);
    }
}
