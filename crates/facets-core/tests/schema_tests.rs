//! Class Composition Integration Tests
//!
//! Tests for how class declarations become per-class schemas and how
//! instances behave under them:
//! - Inheritance and overriding
//! - Prefix (wildcard) facets and the catch-all
//! - Categories and conflicts
//! - Properties, events and mapped facets
//! - Typed methods and signature checks
//!
//! # Running Tests
//! ```bash
//! cargo test --test schema_tests
//! ```

use facets_core::{
    ClassDecl, ClassRegistry, Facet, FacetClass, FacetError, Handler, HasFacets, ItemsEvent, Method, TypedMethod,
    Validator, Value,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn counter() -> (Arc<AtomicUsize>, Handler) {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = hits.clone();
    let handler = Handler::no_args(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (hits, handler)
}

// ===== Inheritance Tests =====

#[test]
fn test_override_keeps_inherited_handler() {
    let (hits, handler) = counter();
    let base = FacetClass::define(
        ClassDecl::new("Shape")
            .facet("size", Facet::int(1))
            .method("_size_set", Method::handler(handler)),
    )
    .unwrap();
    let square = FacetClass::define(ClassDecl::new("Square").base(&base).facet("size", Facet::int(5))).unwrap();

    let s = square.instantiate().unwrap();
    assert_eq!(s.get("size").unwrap(), Value::Int(5));
    s.set("size", 6).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(square.is_subclass_of("Shape"));
    assert!(!base.is_subclass_of("Square"));
}

#[test]
fn test_class_facet_added_later_reaches_instances() {
    let base = FacetClass::define(ClassDecl::new("Growing").facet("a", Facet::int(0))).unwrap();
    let derived = FacetClass::define(ClassDecl::new("GrowingChild").base(&base)).unwrap();
    base.add_class_facet("b", Facet::str("new")).unwrap();

    let obj = derived.instantiate().unwrap();
    assert_eq!(obj.get("b").unwrap(), Value::from("new"));
    assert!(obj.has_facet("b"));
}

#[test]
fn test_redefined_class_facet_reaches_forked_instances() {
    let class = FacetClass::define(ClassDecl::new("Reshaped").facet("a", Facet::int(0))).unwrap();
    let obj = class.instantiate().unwrap();
    let (hits, handler) = counter();
    obj.on_facet_set("a", handler).unwrap();

    class.add_class_facet("a", Facet::str("fresh")).unwrap();
    assert_eq!(obj.get("a").unwrap(), Value::from("fresh"));
    obj.set("a", "changed").unwrap();
    assert!(obj.set("a", 3).is_err());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_defined_classes_are_registered() {
    FacetClass::define(ClassDecl::new("Registered").facet("v", Facet::any())).unwrap();
    let found = ClassRegistry::global().get_by_name("Registered").unwrap();
    assert_eq!(found.name(), "Registered");
}

#[test]
fn test_duplicate_member_is_rejected() {
    let err = FacetClass::define(
        ClassDecl::new("Twice")
            .facet("x", Facet::int(0))
            .facet("x", Facet::int(1)),
    )
    .unwrap_err();
    assert!(matches!(err, FacetError::DuplicateDefinition { ref name, .. } if name == "x"));
}

#[test]
fn test_unmatched_method_is_a_warning() {
    let class = FacetClass::define(
        ClassDecl::new("Sloppy")
            .facet("x", Facet::int(0))
            .method("_nothing_set", Method::handler(Handler::no_args(|| {}))),
    )
    .unwrap();
    assert_eq!(class.warnings().len(), 1);
    assert!(class.warnings()[0].contains("_nothing_set"));
}

// ===== Prefix Facet Tests =====

#[test]
fn test_longest_prefix_wins() {
    let class = FacetClass::define(
        ClassDecl::new("Sensors")
            .facet("t_", Facet::str(""))
            .facet("temp_", Facet::float(0.0)),
    )
    .unwrap();
    let obj = class.instantiate().unwrap();

    assert_eq!(obj.get("temp_inside").unwrap(), Value::Float(0.0));
    assert_eq!(obj.get("t_label").unwrap(), Value::from(""));
    assert!(obj.set("temp_inside", "hot").is_err());
    assert!(obj.set("temp_inside", 21.5).is_ok());
    assert!(!obj.has_facet("humidity"));
}

#[test]
fn test_first_dynamic_assignment_announces_facet() {
    let class = FacetClass::define(ClassDecl::new("Open").facet("x_", Facet::int(0))).unwrap();
    let obj = class.instantiate().unwrap();
    let added = Arc::new(Mutex::new(Vec::new()));
    let sink = added.clone();
    obj.on_facet_set("facet_added", Handler::new_value(move |v| sink.lock().push(v.clone())))
        .unwrap();

    obj.set("x_one", 1).unwrap();
    obj.set("x_one", 2).unwrap();
    obj.set("x_two", 1).unwrap();
    assert_eq!(*added.lock(), vec![Value::from("x_one"), Value::from("x_two")]);
    assert!(obj.all_facet_names().contains(&"x_one".to_string()));
}

#[test]
fn test_static_handlers_reach_prefix_names() {
    let (hits, handler) = counter();
    let any = Arc::new(Mutex::new(Vec::new()));
    let sink = any.clone();
    let base = FacetClass::define(
        ClassDecl::new("Wild")
            .facet("tmp_", Facet::int(0))
            .method("_tmp_a_set", Method::handler(handler))
            .method(
                "_anyfacet_set",
                Method::handler(Handler::name_new(move |name, _| sink.lock().push(name.to_string()))),
            ),
    )
    .unwrap();
    assert!(base.warnings().is_empty());

    let obj = base.instantiate().unwrap();
    obj.set("tmp_a", 5).unwrap();
    obj.set("tmp_b", 6).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(*any.lock(), vec!["facet_added", "tmp_a", "facet_added", "tmp_b"]);

    let derived = FacetClass::define(ClassDecl::new("WildChild").base(&base)).unwrap();
    derived.instantiate().unwrap().set("tmp_a", 7).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_explicit_catch_all_disallows_unknown_names() {
    let class = FacetClass::define(
        ClassDecl::new("Closed")
            .facet("x", Facet::int(0))
            .facet("_", Facet::disallow()),
    )
    .unwrap();
    let obj = class.instantiate().unwrap();
    assert!(matches!(obj.set("y", 1), Err(FacetError::ReadOnly { .. })));
    assert!(obj.set("x", 1).is_ok());
}

// ===== Category Tests =====

#[test]
fn test_category_adds_facets() {
    let class = FacetClass::define(ClassDecl::new("Extended").facet("x", Facet::int(0))).unwrap();
    class
        .add_category(ClassDecl::category("Extra").facet("z", Facet::int(3)))
        .unwrap();
    let obj = class.instantiate().unwrap();
    assert_eq!(obj.get("z").unwrap(), Value::Int(3));

    let err = class
        .add_category(ClassDecl::category("Clash").facet("z", Facet::int(4)))
        .unwrap_err();
    match err {
        FacetError::SchemaConflict { message, .. } => assert!(message.contains("category 'Extra'")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(class.instantiate().unwrap().get("z").unwrap(), Value::Int(3));
}

#[test]
fn test_category_cannot_be_defined_as_class() {
    let err = FacetClass::define(ClassDecl::category("Loose")).unwrap_err();
    assert!(matches!(err, FacetError::SchemaConflict { .. }));
}

// ===== Property Tests =====

fn rect() -> Arc<FacetClass> {
    FacetClass::define(
        ClassDecl::new("Rect")
            .facet("width", Facet::int(1))
            .facet("height", Facet::int(2))
            .facet(
                "area",
                Facet::property()
                    .getter(|r: &HasFacets| {
                        let w = r.get("width")?.as_int().unwrap_or(0);
                        let h = r.get("height")?.as_int().unwrap_or(0);
                        Ok(Value::Int(w * h))
                    })
                    .depends_on("width, height")
                    .cached(),
            ),
    )
    .unwrap()
}

#[test]
fn test_cached_property_announces_recomputed_value() {
    let r = rect().instantiate().unwrap();
    assert_eq!(r.get("area").unwrap(), Value::Int(2));

    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    r.on_facet_set(
        "area",
        Handler::full(move |_: &HasFacets, _: &str, old: &Value, new: &Value| {
            sink.lock().push((old.clone(), new.clone()))
        }),
    )
    .unwrap();

    r.set("width", 3).unwrap();
    assert_eq!(*log.lock(), vec![(Value::Int(2), Value::Int(6))]);
    assert_eq!(r.get("area").unwrap(), Value::Int(6));
}

#[test]
fn test_property_without_setter_is_read_only() {
    let r = rect().instantiate().unwrap();
    assert!(matches!(r.set("area", 10), Err(FacetError::ReadOnly { .. })));
}

// ===== Event and Mapped Facet Tests =====

#[test]
fn test_event_facet_fires_without_storing() {
    let class = FacetClass::define(
        ClassDecl::new("Button")
            .facet("clicked", Facet::event())
            .facet("label", Facet::str("").with_metadata("event", "changed"))
            .facet("changed", Facet::event()),
    )
    .unwrap();
    let button = class.instantiate().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    button
        .on_facet_set("clicked, changed", Handler::name_new(move |name, v| sink.lock().push((name.to_string(), v.clone()))))
        .unwrap();

    button.set("clicked", true).unwrap();
    button.set("clicked", true).unwrap();
    button.set("label", "OK").unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            ("clicked".to_string(), Value::Bool(true)),
            ("clicked".to_string(), Value::Bool(true)),
            ("changed".to_string(), Value::from("label")),
        ]
    );
    assert_eq!(button.get("clicked").unwrap(), Value::Undefined);
}

#[test]
fn test_mapped_facet_maintains_shadow() {
    let class = FacetClass::define(ClassDecl::new("Answer").facet(
        "reply",
        Facet::mapped(
            vec![(Value::from("yes"), Value::Bool(true)), (Value::from("no"), Value::Bool(false))],
            "yes",
        ),
    ))
    .unwrap();
    let obj = class.instantiate().unwrap();
    assert_eq!(obj.get("reply_").unwrap(), Value::Bool(true));
    obj.set("reply", "no").unwrap();
    assert_eq!(obj.get("reply_").unwrap(), Value::Bool(false));
    assert!(obj.copyable_facet_names(&Default::default()).contains(&"reply".to_string()));
    assert!(!obj.copyable_facet_names(&Default::default()).contains(&"reply_".to_string()));
}

// ===== Collection Event Tests =====

#[test]
fn test_in_place_list_change_fires_items_event() {
    let class = FacetClass::define(ClassDecl::new("Queue").facet("jobs", Facet::list(Some(Validator::Int)))).unwrap();
    let q = class.instantiate().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    q.on_facet_set(
        "jobs_items",
        Handler::new_value(move |v| {
            if let Some(items) = v.as_items() {
                sink.lock().push(items.clone());
            }
        }),
    )
    .unwrap();

    q.list_append("jobs", Value::Int(1)).unwrap();
    q.list_insert("jobs", 0, Value::Int(0)).unwrap();
    assert!(q.list_append("jobs", Value::from("x")).is_err());

    assert_eq!(
        *events.lock(),
        vec![
            ItemsEvent::List {
                index: 0,
                removed: vec![],
                added: vec![Value::Int(1)],
            },
            ItemsEvent::List {
                index: 0,
                removed: vec![],
                added: vec![Value::Int(0)],
            },
        ]
    );
}

// ===== Typed Method Tests =====

fn scaler() -> Arc<FacetClass> {
    FacetClass::define(
        ClassDecl::new("Scaler").facet("x", Facet::int(2)).typed_method(
            TypedMethod::new("scale", 1, |obj: &HasFacets, args: &[Value]| {
                let x = obj.get("x")?.as_int().unwrap_or(0);
                Ok(Value::Int(x * args[0].as_int().unwrap_or(0)))
            })
            .param("by", Validator::Int)
            .returns(Validator::Int),
        ),
    )
    .unwrap()
}

#[test]
fn test_typed_method_checks_arguments() {
    let obj = scaler().instantiate().unwrap();
    assert_eq!(obj.call("scale", &[Value::Int(3)]).unwrap(), Value::Int(6));
    assert!(obj.call("scale", &[Value::from("3")]).unwrap_err().is_validation());
    assert!(matches!(
        obj.call("missing", &[]),
        Err(FacetError::NoSuchFacet { .. })
    ));
}

#[test]
fn test_mismatched_signature_fails_class_build() {
    let err = FacetClass::define(
        ClassDecl::new("BadSig")
            .typed_method(TypedMethod::new("pair", 2, |_: &HasFacets, _: &[Value]| Ok(Value::None)).param("a", Validator::Int)),
    )
    .unwrap_err();
    assert!(matches!(err, FacetError::Signature { ref name, .. } if name == "pair"));
}

// ===== Reset Tests =====

#[test]
fn test_reset_restores_defaults() {
    let class = FacetClass::define(
        ClassDecl::new("Resettable")
            .facet("a", Facet::int(1))
            .facet("b", Facet::str("b")),
    )
    .unwrap();
    let obj = class.instantiate_with(&[("a", Value::Int(5)), ("b", Value::from("z"))]).unwrap();
    let failed = obj.reset_facets(Some(&["a"]));
    assert!(failed.is_empty());
    assert_eq!(obj.get("a").unwrap(), Value::Int(1));
    assert_eq!(obj.get("b").unwrap(), Value::from("z"));
}
