//! Class schema composition
//!
//! [`build_schema`] is a pure function of a declaration and the already
//! built schemas of its bases. It never touches live instances.

use super::{ClassDecl, ClassSchema, ListenerKind, ListenerSpec, Member, Method};
use crate::error::{FacetError, FacetResult};
use crate::facet::{DefaultValue, Facet, FacetKind, Validator};
use crate::notify::{Dispatch, Handler, Notifier};
use crate::value::Value;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::sync::Arc;

const ANY_FACET_SET: &str = "_anyfacet_set";

/// Compose the schema for `decl`
pub fn build_schema(decl: &ClassDecl) -> FacetResult<ClassSchema> {
    check_duplicates(decl)?;

    let mut schema = inherit(decl);
    let mut methods = Vec::new();

    for (name, member) in &decl.members {
        match member {
            Member::Facet(facet) => add_own_facet(&mut schema, name, facet.clone()),
            Member::Method(method) => methods.push((name.as_str(), method)),
            Member::View => {
                if !schema.view_elements.contains(name) {
                    schema.view_elements.push(name.clone());
                }
            }
            Member::TypedMethod(method) => {
                method.check_signature()?;
                schema.methods.insert(name.clone(), method.clone());
            }
        }
    }

    synthesize_shadows(&mut schema);

    for (name, method) in methods {
        resolve_method(&mut schema, name, method);
    }

    compute_delegate_patterns(&mut schema);
    compute_property_listeners(&mut schema);

    if !schema.prefix_facets.contains_key("") {
        schema.prefix_facets.insert(String::new(), Arc::new(Facet::catch_all()));
        schema.implicit_catch_all = true;
    }
    schema.prefix_list = schema.prefix_facets.keys().cloned().collect();
    sort_prefixes(&mut schema.prefix_list);

    for warning in &schema.warnings {
        tracing::warn!(class = %schema.name, "{}", warning);
    }
    Ok(schema)
}

fn check_duplicates(decl: &ClassDecl) -> FacetResult<()> {
    let mut seen = FxHashSet::default();
    for (name, _) in &decl.members {
        if !seen.insert(name.as_str()) {
            return Err(FacetError::DuplicateDefinition {
                class: decl.name.clone(),
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// Longest first; ties broken alphabetically so the order is stable
pub(crate) fn sort_prefixes(prefixes: &mut [String]) {
    prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
}

fn inherit(decl: &ClassDecl) -> ClassSchema {
    let mut schema = ClassSchema {
        name: decl.name.clone(),
        facets: BTreeMap::new(),
        prefix_facets: FxHashMap::default(),
        prefix_list: Vec::new(),
        implicit_catch_all: false,
        any_notifiers: Vec::new(),
        static_handlers: Vec::new(),
        listeners: Vec::new(),
        delegate_patterns: FxHashMap::default(),
        defaults: FxHashMap::default(),
        validate_hooks: FxHashMap::default(),
        methods: FxHashMap::default(),
        view_elements: Vec::new(),
        delegate_prefix: decl.delegate_prefix.clone().unwrap_or_default(),
        warnings: Vec::new(),
    };

    // Earlier bases shadow later ones
    for base in &decl.bases {
        let parent = base.schema();
        for (name, facet) in &parent.facets {
            schema.facets.entry(name.clone()).or_insert_with(|| facet.clone());
        }
        for (prefix, facet) in &parent.prefix_facets {
            if prefix.is_empty() && parent.implicit_catch_all {
                continue;
            }
            schema
                .prefix_facets
                .entry(prefix.clone())
                .or_insert_with(|| facet.clone());
        }
        for notifier in &parent.any_notifiers {
            if !schema.any_notifiers.iter().any(|n| n.id() == notifier.id()) {
                schema.any_notifiers.push(notifier.clone());
            }
        }
        for (name, handler) in &parent.static_handlers {
            let known = schema
                .static_handlers
                .iter()
                .any(|(n, h)| n == name && h.same_as(handler));
            if !known {
                schema.static_handlers.push((name.clone(), handler.clone()));
            }
        }
        for spec in &parent.listeners {
            if let ListenerKind::Method(factory) = &spec.kind {
                let known = schema.listeners.iter().any(|s| match &s.kind {
                    ListenerKind::Method(f) => Arc::ptr_eq(f, factory) && s.pattern == spec.pattern,
                    _ => false,
                });
                if !known {
                    schema.listeners.push(spec.clone());
                }
            }
        }
        for (name, f) in &parent.defaults {
            schema.defaults.entry(name.clone()).or_insert_with(|| f.clone());
        }
        for (name, f) in &parent.validate_hooks {
            schema.validate_hooks.entry(name.clone()).or_insert_with(|| f.clone());
        }
        for (name, m) in &parent.methods {
            schema.methods.entry(name.clone()).or_insert_with(|| m.clone());
        }
        for view in &parent.view_elements {
            if !schema.view_elements.contains(view) {
                schema.view_elements.push(view.clone());
            }
        }
        if schema.delegate_prefix.is_empty() {
            schema.delegate_prefix = parent.delegate_prefix.clone();
        }
    }
    schema
}

fn add_own_facet(schema: &mut ClassSchema, name: &str, facet: Facet) {
    if let Some(prefix) = name.strip_suffix('_') {
        schema.prefix_facets.insert(prefix.to_string(), Arc::new(facet));
        if prefix.is_empty() {
            schema.implicit_catch_all = false;
        }
        return;
    }

    // An override keeps the static handlers its bases declared for the name
    let mut facet = facet;
    for (target, handler) in &schema.static_handlers {
        if target == name {
            facet.add_notifier(Notifier::new(handler.clone(), Dispatch::Same), false);
        }
    }
    schema.facets.insert(name.to_string(), Arc::new(facet));
}

fn synthesize_shadows(schema: &mut ClassSchema) {
    let mut extra: Vec<(String, Facet)> = Vec::new();
    for (name, facet) in &schema.facets {
        if facet.collection_kind().is_some() && !facet.is_items_shadow() {
            let shadow = format!("{}_items", name);
            if !schema.facets.contains_key(&shadow) {
                extra.push((shadow, Facet::items_event()));
            }
        }
        if let FacetKind::Mapped(map) = &facet.kind {
            let shadow = format!("{}_", name);
            if !schema.facets.contains_key(&shadow) {
                let mapped = match &facet.default {
                    DefaultValue::Constant(key) => lookup_mapped(map, key),
                    _ => Value::Undefined,
                };
                let shadow_facet = Facet::new(
                    FacetKind::Plain,
                    Validator::Any,
                    DefaultValue::Constant(mapped),
                )
                .transient()
                .with_metadata("shadow", true);
                extra.push((shadow, shadow_facet));
            }
        }
        if let Some(event) = facet.metadata.get_str("event") {
            if !schema.facets.contains_key(event) {
                extra.push((event.to_string(), Facet::event()));
            }
        }
    }
    if !schema.facets.contains_key("facet_added") {
        extra.push((
            "facet_added".to_string(),
            Facet::event().with_validator(Validator::Str),
        ));
    }
    for (name, facet) in extra {
        schema.facets.entry(name).or_insert_with(|| Arc::new(facet));
    }
}

pub(crate) fn lookup_mapped(map: &[(Value, Value)], key: &Value) -> Value {
    map.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .unwrap_or(Value::Undefined)
}

fn attach_static(schema: &mut ClassSchema, target: &str, handler: &Handler) -> bool {
    if let Some(facet) = schema.facets.get_mut(target) {
        Arc::make_mut(facet).add_notifier(Notifier::new(handler.clone(), Dispatch::Same), false);
    } else if !matches_prefix(schema, target) {
        return false;
    }
    // otherwise attached when the prefix template is first cloned for `target`
    schema
        .static_handlers
        .push((target.to_string(), handler.clone()));
    true
}

/// Whether a declared, assignable prefix covers `name`
fn matches_prefix(schema: &ClassSchema, name: &str) -> bool {
    schema
        .prefix_facets
        .iter()
        .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .is_some_and(|(_, facet)| !matches!(facet.kind, FacetKind::Disallow))
}

fn resolve_method(schema: &mut ClassSchema, name: &str, method: &Method) {
    let matched = match method {
        Method::Handler(handler) if name == ANY_FACET_SET => {
            schema
                .any_notifiers
                .push(Notifier::new(handler.clone(), Dispatch::Same));
            true
        }
        Method::Handler(handler) => match name
            .strip_prefix('_')
            .and_then(|n| n.strip_suffix("_set"))
        {
            Some(target) => {
                let found = attach_static(schema, target, handler);
                if found && handler.arity() == 0 {
                    attach_static(schema, &format!("{}_items", target), handler);
                }
                found
            }
            None => false,
        },
        Method::Getter(getter) => match name.strip_prefix("_get_") {
            Some(target) => with_property(schema, target, |spec| spec.getter = Some(getter.clone())),
            None => false,
        },
        Method::Setter(setter) => match name.strip_prefix("_set_") {
            Some(target) => with_property(schema, target, |spec| spec.setter = Some(setter.clone())),
            None => false,
        },
        Method::Validate(hook) => match name.strip_prefix("_validate_") {
            Some(target) if schema.facets.contains_key(target) => {
                schema.validate_hooks.insert(target.to_string(), hook.clone());
                true
            }
            _ => false,
        },
        Method::Default(factory) => match name
            .strip_prefix('_')
            .and_then(|n| n.strip_suffix("_default"))
        {
            Some(target) if schema.facets.contains_key(target) => {
                schema.defaults.insert(target.to_string(), factory.clone());
                true
            }
            _ => false,
        },
        Method::Listener {
            pattern,
            factory,
            dispatch,
            post_init,
        } => {
            schema.listeners.push(ListenerSpec {
                pattern: pattern.clone(),
                kind: ListenerKind::Method(factory.clone()),
                dispatch: dispatch.clone(),
                post_init: *post_init,
            });
            true
        }
    };
    if !matched {
        schema.warnings.push(format!(
            "method '{}' does not match any facet of class '{}'",
            name, schema.name
        ));
    }
}

fn with_property<F>(schema: &mut ClassSchema, target: &str, edit: F) -> bool
where
    F: FnOnce(&mut crate::facet::PropertySpec),
{
    let Some(facet) = schema.facets.get_mut(target) else {
        return false;
    };
    if !matches!(facet.kind, FacetKind::Property(_)) {
        return false;
    }
    if let FacetKind::Property(spec) = &mut Arc::make_mut(facet).kind {
        edit(spec);
    }
    true
}

fn compute_delegate_patterns(schema: &mut ClassSchema) {
    schema.delegate_patterns.clear();
    for (name, facet) in &schema.facets {
        if let FacetKind::Delegate(spec) = &facet.kind {
            let target = spec.target_name(name, &schema.delegate_prefix);
            schema
                .delegate_patterns
                .insert(name.clone(), format!("{}:{}", spec.delegate, target));
        }
    }
}

fn compute_property_listeners(schema: &mut ClassSchema) {
    schema
        .listeners
        .retain(|spec| matches!(spec.kind, ListenerKind::Method(_)));

    let mut specs = Vec::new();
    for (name, facet) in &schema.facets {
        let FacetKind::Property(spec) = &facet.kind else {
            continue;
        };
        if spec.getter.is_none() {
            schema
                .warnings
                .push(format!("property '{}' has no getter", name));
        }
        let Some(pattern) = &spec.depends_on else {
            continue;
        };
        if spec.cached {
            specs.push(ListenerSpec {
                pattern: pattern.clone(),
                kind: ListenerKind::PropertyPre(name.clone()),
                dispatch: Dispatch::Same,
                post_init: false,
            });
        }
        specs.push(ListenerSpec {
            pattern: pattern.clone(),
            kind: ListenerKind::PropertyPost(name.clone()),
            dispatch: Dispatch::Same,
            post_init: false,
        });
    }
    schema.listeners.extend(specs);
}
