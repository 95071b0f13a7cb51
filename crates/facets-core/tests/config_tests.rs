//! Configuration and Persistence Integration Tests
//!
//! Both the configuration and the facet store are process-wide, so the
//! tests touching them share this binary and run serially through a lock.
//!
//! # Running Tests
//! ```bash
//! cargo test --test config_tests
//! ```

use facets_core::config::{self, FacetsConfig};
use facets_core::store::{self, MemoryStore};
use facets_core::{ClassDecl, Dispatch, Facet, FacetClass, FacetError, ListenOptions, Value};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

static SERIAL: Mutex<()> = Mutex::new(());

// ===== Configuration Tests =====

#[test]
fn test_config_file_sets_default_dispatch() {
    let _serial = SERIAL.lock();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "default_dispatch = \"new\"").unwrap();
    writeln!(file, "ui_thread_name = \"gui\"").unwrap();

    let previous = config::current();
    config::install(FacetsConfig::from_file(file.path()).unwrap());
    assert_eq!(ListenOptions::default().dispatch, Dispatch::New);
    assert_eq!(config::current().ui_thread_name, "gui");

    config::install(previous);
    assert_eq!(ListenOptions::default().dispatch, Dispatch::Same);
}

#[test]
fn test_unknown_default_dispatch_falls_back_to_same() {
    let _serial = SERIAL.lock();
    let previous = config::current();
    config::install(FacetsConfig {
        default_dispatch: "nowhere".to_string(),
        ..FacetsConfig::default()
    });
    assert_eq!(ListenOptions::default().dispatch, Dispatch::Same);
    config::install(previous);
}

#[test]
fn test_toolkit_is_chosen_once() {
    let _serial = SERIAL.lock();
    let previous = config::current();
    config::install(FacetsConfig::default());

    config::set_toolkit("null").unwrap();
    config::set_toolkit("null").unwrap();
    assert!(matches!(config::set_toolkit("other"), Err(FacetError::Config(_))));

    config::install(previous);
}

#[test]
fn test_missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = FacetsConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, FacetError::Io(_)));
}

// ===== Persistence Tests =====

#[test]
fn test_stored_default_reads_installed_store() {
    let _serial = SERIAL.lock();
    let memory = Arc::new(MemoryStore::new());
    store::install(memory.clone());

    let class = FacetClass::define(
        ClassDecl::new("Prefs")
            .facet("theme", Facet::str("").stored_default("light"))
            .facet("volume", Facet::int(0).stored_default(5)),
    )
    .unwrap();

    let first = class.instantiate().unwrap();
    first.facet_db_set("theme", Some(Value::from("dark")));
    assert_eq!(memory.len(), 1);

    let second = class.instantiate().unwrap();
    assert_eq!(second.get("theme").unwrap(), Value::from("dark"));
    assert_eq!(second.get("volume").unwrap(), Value::Int(5));
    assert_eq!(second.facet_db_get("theme"), Some(Value::from("dark")));

    second.facet_db_set("theme", None);
    assert!(memory.is_empty());
    assert_eq!(class.instantiate().unwrap().get("theme").unwrap(), Value::from("light"));

    store::install(Arc::new(MemoryStore::new()));
}
