//! Class declarations and composed class schemas
//!
//! A [`ClassDecl`] lists a class's own members in declaration order. The
//! builder in [`builder`] merges it with the schemas of its bases into an
//! immutable [`ClassSchema`], which [`FacetClass`] publishes to instances.

pub mod builder;
pub mod class;
pub mod registry;

pub use builder::build_schema;
pub use class::FacetClass;
pub use registry::ClassRegistry;

use crate::facet::{DefaultFn, Facet, GetterFn, MetaFilter, SetterFn};
use crate::error::FacetResult;
use crate::method::TypedMethod;
use crate::notify::{Dispatch, Handler, Notifier};
use crate::object::HasFacets;
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Produces a per-instance handler for a class-level listener
pub type HandlerFactory = Arc<dyn Fn(&HasFacets) -> Handler + Send + Sync>;

/// Extra validation applied after a facet's validator
pub type ValidateHook = Arc<dyn Fn(&HasFacets, Value) -> FacetResult<Value> + Send + Sync>;

/// A method declared on a class; naming conventions decide what it attaches to
#[derive(Clone)]
pub enum Method {
    /// `_<facet>_set` or `_anyfacet_set`
    Handler(Handler),
    /// `_get_<property>`
    Getter(GetterFn),
    /// `_set_<property>`
    Setter(SetterFn),
    /// `_validate_<facet>`
    Validate(ValidateHook),
    /// `_<facet>_default`
    Default(DefaultFn),
    /// Listener bound on every new instance
    Listener {
        /// Listener pattern
        pattern: String,
        /// Builds the handler for one instance
        factory: HandlerFactory,
        /// Dispatch mode
        dispatch: Dispatch,
        /// Bind after construction-time values are assigned
        post_init: bool,
    },
}

impl Method {
    /// Static change handler
    pub fn handler(handler: Handler) -> Self {
        Method::Handler(handler)
    }

    /// Property getter
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn(&HasFacets) -> FacetResult<Value> + Send + Sync + 'static,
    {
        Method::Getter(Arc::new(f))
    }

    /// Property setter
    pub fn setter<F>(f: F) -> Self
    where
        F: Fn(&HasFacets, Value) -> FacetResult<()> + Send + Sync + 'static,
    {
        Method::Setter(Arc::new(f))
    }

    /// Validation hook
    pub fn validate<F>(f: F) -> Self
    where
        F: Fn(&HasFacets, Value) -> FacetResult<Value> + Send + Sync + 'static,
    {
        Method::Validate(Arc::new(f))
    }

    /// Default value factory
    pub fn default<F>(f: F) -> Self
    where
        F: Fn(&HasFacets) -> Value + Send + Sync + 'static,
    {
        Method::Default(Arc::new(f))
    }

    /// Per-instance listener built from a factory
    pub fn listener<F>(pattern: &str, factory: F) -> Self
    where
        F: Fn(&HasFacets) -> Handler + Send + Sync + 'static,
    {
        Method::Listener {
            pattern: pattern.to_string(),
            factory: Arc::new(factory),
            dispatch: Dispatch::Same,
            post_init: false,
        }
    }

    /// Per-instance listener sharing one handler
    pub fn on_facet_set(pattern: &str, handler: Handler) -> Self {
        Self::listener(pattern, move |_| handler.clone())
    }

    /// Set the dispatch mode of a listener
    pub fn dispatch(mut self, mode: Dispatch) -> Self {
        if let Method::Listener { dispatch, .. } = &mut self {
            *dispatch = mode;
        }
        self
    }

    /// Bind a listener after construction-time values are assigned
    pub fn post_init(mut self) -> Self {
        if let Method::Listener { post_init, .. } = &mut self {
            *post_init = true;
        }
        self
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Handler(h) => write!(f, "Handler({:?})", h),
            Method::Getter(_) => write!(f, "Getter"),
            Method::Setter(_) => write!(f, "Setter"),
            Method::Validate(_) => write!(f, "Validate"),
            Method::Default(_) => write!(f, "Default"),
            Method::Listener { pattern, dispatch, post_init, .. } => f
                .debug_struct("Listener")
                .field("pattern", pattern)
                .field("dispatch", dispatch)
                .field("post_init", post_init)
                .finish(),
        }
    }
}

/// A member of a class declaration
#[derive(Clone, Debug)]
pub enum Member {
    /// Facet; a trailing `_` in the name makes it a prefix facet
    Facet(Facet),
    /// Method attached by naming convention
    Method(Method),
    /// Named view (presentation) element
    View,
    /// Method with validated arguments
    TypedMethod(TypedMethod),
}

/// A class's own declarations
#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub(crate) name: String,
    pub(crate) bases: Vec<Arc<FacetClass>>,
    pub(crate) members: Vec<(String, Member)>,
    pub(crate) category: bool,
    pub(crate) delegate_prefix: Option<String>,
}

impl ClassDecl {
    /// Start a class declaration
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bases: Vec::new(),
            members: Vec::new(),
            category: false,
            delegate_prefix: None,
        }
    }

    /// Start a category: a set of members merged into an existing class
    pub fn category(name: &str) -> Self {
        let mut decl = Self::new(name);
        decl.category = true;
        decl
    }

    /// Add a base class; earlier bases take precedence
    pub fn base(mut self, base: &Arc<FacetClass>) -> Self {
        self.bases.push(base.clone());
        self
    }

    /// Declare a facet
    pub fn facet(mut self, name: &str, facet: Facet) -> Self {
        self.members.push((name.to_string(), Member::Facet(facet)));
        self
    }

    /// Declare a method
    pub fn method(mut self, name: &str, method: Method) -> Self {
        self.members.push((name.to_string(), Member::Method(method)));
        self
    }

    /// Declare a dynamic listener (shorthand for a listener method)
    pub fn on_facet_set(self, pattern: &str, handler: Handler) -> Self {
        let name = format!("_on_{}", self.members.len());
        self.method(&name, Method::on_facet_set(pattern, handler))
    }

    /// Declare a view element
    pub fn view(mut self, name: &str) -> Self {
        self.members.push((name.to_string(), Member::View));
        self
    }

    /// Declare a typed method
    pub fn typed_method(mut self, method: TypedMethod) -> Self {
        self.members.push((method.name().to_string(), Member::TypedMethod(method)));
        self
    }

    /// Prefix used by delegates declared with the `"*"` rule
    pub fn delegate_prefix(mut self, prefix: &str) -> Self {
        self.delegate_prefix = Some(prefix.to_string());
        self
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this declares a category
    pub fn is_category(&self) -> bool {
        self.category
    }
}

/// What a per-instance listener does when it fires
#[derive(Clone)]
pub(crate) enum ListenerKind {
    /// User listener method
    Method(HandlerFactory),
    /// Stash the cached property value before it goes stale
    PropertyPre(String),
    /// Recompute and announce the property value
    PropertyPost(String),
}

/// A listener bound on every instance of a class
#[derive(Clone)]
pub(crate) struct ListenerSpec {
    pub pattern: String,
    pub kind: ListenerKind,
    pub dispatch: Dispatch,
    pub post_init: bool,
}

impl fmt::Debug for ListenerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            ListenerKind::Method(_) => "method".to_string(),
            ListenerKind::PropertyPre(p) => format!("pre({})", p),
            ListenerKind::PropertyPost(p) => format!("post({})", p),
        };
        f.debug_struct("ListenerSpec")
            .field("pattern", &self.pattern)
            .field("kind", &kind)
            .finish()
    }
}

/// The composed, immutable schema of a class
#[derive(Clone)]
pub struct ClassSchema {
    pub(crate) name: String,
    /// Explicit facets, inherited and own
    pub(crate) facets: BTreeMap<String, Arc<Facet>>,
    /// Prefix facets keyed by prefix
    pub(crate) prefix_facets: FxHashMap<String, Arc<Facet>>,
    /// Prefixes, longest first
    pub(crate) prefix_list: Vec<String>,
    /// True when the `""` catch-all was synthesized
    pub(crate) implicit_catch_all: bool,
    /// Object-wide static handlers
    pub(crate) any_notifiers: Vec<Notifier>,
    /// Static `_<facet>_set` handlers, kept so overriding subclasses re-attach them
    pub(crate) static_handlers: Vec<(String, Handler)>,
    /// Listeners bound on every instance
    pub(crate) listeners: Vec<ListenerSpec>,
    /// Delegate facet name to its listener pattern
    pub(crate) delegate_patterns: FxHashMap<String, String>,
    pub(crate) defaults: FxHashMap<String, DefaultFn>,
    pub(crate) validate_hooks: FxHashMap<String, ValidateHook>,
    pub(crate) methods: FxHashMap<String, TypedMethod>,
    pub(crate) view_elements: Vec<String>,
    pub(crate) delegate_prefix: String,
    pub(crate) warnings: Vec<String>,
}

impl fmt::Debug for ClassSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSchema")
            .field("name", &self.name)
            .field("facets", &self.facets.keys().collect::<Vec<_>>())
            .field("prefixes", &self.prefix_list)
            .field("listeners", &self.listeners)
            .field("warnings", &self.warnings)
            .finish()
    }
}

impl ClassSchema {
    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit facet by name
    pub fn facet(&self, name: &str) -> Option<&Arc<Facet>> {
        self.facets.get(name)
    }

    /// Explicit facet names in sorted order
    pub fn facet_names(&self) -> Vec<String> {
        self.facets.keys().cloned().collect()
    }

    /// Explicit facet names whose metadata matches `filter`
    ///
    /// Events are excluded unless the filter tests `type`.
    pub fn matching_names(&self, filter: &MetaFilter) -> Vec<String> {
        let skip_events = !filter.mentions("type");
        self.facets
            .iter()
            .filter(|(_, f)| !(skip_events && f.is_event()))
            .filter(|(_, f)| filter.matches(f.metadata()))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Prefix facet by prefix
    pub fn prefix_facet(&self, prefix: &str) -> Option<&Arc<Facet>> {
        self.prefix_facets.get(prefix)
    }

    /// Prefixes in lookup order (longest first; `""` last)
    pub fn prefix_list(&self) -> &[String] {
        &self.prefix_list
    }

    /// First prefix matching `name`
    pub fn match_prefix(&self, name: &str) -> &str {
        self.prefix_list
            .iter()
            .find(|p| name.starts_with(p.as_str()))
            .map(|p| p.as_str())
            .unwrap_or("")
    }

    /// View elements in declaration order
    pub fn view_elements(&self) -> &[String] {
        &self.view_elements
    }

    /// Typed method by name
    pub fn method(&self, name: &str) -> Option<&TypedMethod> {
        self.methods.get(name)
    }

    /// Non-fatal composition warnings
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Delegate prefix used by the `"*"` rule
    pub fn delegate_prefix(&self) -> &str {
        &self.delegate_prefix
    }
}
