//! Facets: observable typed attributes
//!
//! This crate provides the attribute and notification engine:
//! - **Schema**: class declarations composed across bases and categories
//!   into per-class schemas (`schema` module)
//! - **Facets**: typed attribute definitions with validators, defaults,
//!   metadata and notifier lists (`facet` module)
//! - **Objects**: instances with per-instance facet forks, properties,
//!   delegation and collections (`object` module)
//! - **Listeners**: a small pattern language binding handlers across
//!   object graphs (`listener` module)
//! - **Notification**: dispatch modes, the UI thread and exception
//!   handling (`notify` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use facets_core::{ClassDecl, Facet, FacetClass, Handler};
//!
//! let point = FacetClass::define(
//!     ClassDecl::new("Point")
//!         .facet("x", Facet::int(0))
//!         .facet("y", Facet::int(0)),
//! )?;
//! let p = point.instantiate()?;
//! p.on_facet_set("x, y", Handler::name_new(|name, new| println!("{name} = {new:?}")))?;
//! p.set("x", 3)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod facet;
pub mod id;
pub mod listener;
pub mod method;
pub mod notify;
pub mod object;
pub mod schema;
pub mod store;
mod sync;
pub mod value;

pub use config::FacetsConfig;
pub use error::{FacetError, FacetResult};
pub use facet::{
    CollectionKind, ComparisonMode, CopyPolicy, DefaultValue, DelegateSpec, Facet, FacetKind, MetaFilter, Metadata,
    PropertySpec, Validator,
};
pub use id::{ListenerToken, NotifierId, ObjectId};
pub use listener::Pattern;
pub use method::TypedMethod;
pub use notify::{ChangeEvent, Dispatch, Handler, NotificationFailure, Notifier};
pub use object::{FacetSource, HasFacets, ListenOptions, NotifyGuard, WeakHasFacets};
pub use schema::{ClassDecl, ClassRegistry, ClassSchema, FacetClass, Member, Method};
pub use store::{FacetStore, MemoryStore};
pub use value::{CopyMemo, ItemsEvent, Value};
