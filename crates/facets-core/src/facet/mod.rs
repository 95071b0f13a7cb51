//! Facet descriptors
//!
//! A [`Facet`] is the name-independent template behind an attribute: its
//! validator, default-value strategy, metadata, kind and static notifiers.
//! Classes share descriptors through `Arc<Facet>`; an instance that needs
//! its own notifiers forks a private copy with `Arc::make_mut`, leaving the
//! class template and sibling instances untouched.

pub mod metadata;
pub mod validate;

pub use metadata::{MetaFilter, MetaTest, Metadata};
pub use validate::{CollectionKind, Validator};

use crate::error::FacetResult;
use crate::id::NotifierId;
use crate::notify::{Handler, Notifier};
use crate::object::HasFacets;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Property getter
pub type GetterFn = Arc<dyn Fn(&HasFacets) -> FacetResult<Value> + Send + Sync>;
/// Property setter
pub type SetterFn = Arc<dyn Fn(&HasFacets, Value) -> FacetResult<()> + Send + Sync>;
/// Default value factory
pub type DefaultFn = Arc<dyn Fn(&HasFacets) -> Value + Send + Sync>;

/// How a delegate facet finds its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateSpec {
    /// Name of the local facet holding the target object
    pub delegate: String,
    /// Target name rule: `""`, a name, `"pre*"` or `"*"`
    pub prefix: String,
    /// Whether assignments write through to the target
    pub modify: bool,
    /// Whether target changes are re-announced locally
    pub listenable: bool,
}

impl DelegateSpec {
    fn parse(delegate: &str, modify: bool) -> Self {
        let (delegate, prefix) = match delegate.split_once('.') {
            Some((d, p)) => (d.to_string(), p.to_string()),
            None => (delegate.to_string(), String::new()),
        };
        Self {
            delegate,
            prefix,
            modify,
            listenable: true,
        }
    }

    /// Name of the target facet for local facet `name`
    pub fn target_name(&self, name: &str, class_prefix: &str) -> String {
        match self.prefix.as_str() {
            "" => name.to_string(),
            "*" => format!("{}{}", class_prefix, name),
            p => match p.strip_suffix('*') {
                Some(stem) => format!("{}{}", stem, name),
                None => p.to_string(),
            },
        }
    }
}

/// Computed facet configuration
#[derive(Clone, Default)]
pub struct PropertySpec {
    /// Computes the value
    pub getter: Option<GetterFn>,
    /// Accepts assignments
    pub setter: Option<SetterFn>,
    /// Listener pattern of the facets the value depends on
    pub depends_on: Option<String>,
    /// Whether the computed value is cached until a dependency changes
    pub cached: bool,
}

/// Behavior tag of a facet
#[derive(Clone)]
pub enum FacetKind {
    /// Stored value
    Plain,
    /// Write-only, nothing is stored
    Event,
    /// Forwards to another object's facet until overridden
    Delegate(DelegateSpec),
    /// Computed by a getter
    Property(PropertySpec),
    /// Stores a key and maintains a shadow `name_` holding the mapped value
    Mapped(Arc<Vec<(Value, Value)>>),
    /// Assignable once
    ReadOnly,
    /// Never assignable
    Constant,
    /// Rejects every assignment
    Disallow,
}

impl FacetKind {
    /// Value of the implicit `type` metadata
    pub fn type_name(&self) -> &'static str {
        match self {
            FacetKind::Plain => "plain",
            FacetKind::Event => "event",
            FacetKind::Delegate(_) => "delegate",
            FacetKind::Property(_) => "property",
            FacetKind::Mapped(_) => "mapped",
            FacetKind::ReadOnly => "read_only",
            FacetKind::Constant => "constant",
            FacetKind::Disallow => "disallow",
        }
    }
}

/// Where a facet's initial value comes from
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed value
    Constant(Value),
    /// Computed once per instance, on first access
    Factory(DefaultFn),
    /// Read from the installed facet store under `"Class:name"`
    Stored {
        /// Used when the store has no entry
        fallback: Value,
    },
    /// No default; reading before assigning fails
    Missing,
}

/// How values are transferred by `copy_facets` / `clone_facets`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPolicy {
    /// Share the value
    Ref,
    /// Copy the outer container
    Shallow,
    /// Copy recursively
    Deep,
}

/// When an assignment counts as a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparisonMode {
    /// Every assignment notifies
    Always,
    /// Notify unless the new value is identical to the old one
    Identity,
    /// Notify unless the new value equals the old one
    #[default]
    Equality,
}

impl ComparisonMode {
    /// Whether `old -> new` is a change under this mode
    pub fn changed(self, old: &Value, new: &Value) -> bool {
        match self {
            ComparisonMode::Always => true,
            ComparisonMode::Identity => !old.is_identical(new),
            ComparisonMode::Equality => old != new,
        }
    }
}

/// An attribute descriptor
#[derive(Clone)]
pub struct Facet {
    pub(crate) kind: FacetKind,
    pub(crate) validator: Validator,
    pub(crate) default: DefaultValue,
    pub(crate) metadata: Metadata,
    pub(crate) copy: Option<CopyPolicy>,
    pub(crate) comparison: ComparisonMode,
    pub(crate) notifiers: Vec<Notifier>,
}

impl Facet {
    /// Build a facet from its parts
    pub fn new(kind: FacetKind, validator: Validator, default: DefaultValue) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("type", Value::from(kind.type_name()));
        let transient = matches!(kind, FacetKind::Event | FacetKind::Property(_));
        metadata.insert("transient", Value::Bool(transient));
        Self {
            kind,
            validator,
            default,
            metadata,
            copy: None,
            comparison: ComparisonMode::default(),
            notifiers: Vec::new(),
        }
    }

    fn plain(validator: Validator, value: Value) -> Self {
        Self::new(FacetKind::Plain, validator, DefaultValue::Constant(value))
    }

    /// Any value, default `None`
    pub fn any() -> Self {
        Self::plain(Validator::Any, Value::None)
    }

    /// Integer
    pub fn int(value: i64) -> Self {
        Self::plain(Validator::Int, Value::Int(value))
    }

    /// Float
    pub fn float(value: f64) -> Self {
        Self::plain(Validator::Float, Value::Float(value))
    }

    /// String
    pub fn str(value: impl Into<String>) -> Self {
        Self::plain(Validator::Str, Value::Str(value.into()))
    }

    /// Boolean
    pub fn bool(value: bool) -> Self {
        Self::plain(Validator::Bool, Value::Bool(value))
    }

    /// Number in `[low, high]`; integer-only when `value` is an integer
    pub fn range(low: f64, high: f64, value: impl Into<Value>) -> Self {
        let value = value.into();
        let integer = matches!(value, Value::Int(_));
        Self::plain(Validator::Range { low, high, integer }, value)
    }

    /// One of `values`
    pub fn enum_of(values: Vec<Value>, default: impl Into<Value>) -> Self {
        Self::plain(Validator::Enum(values), default.into())
    }

    /// Object reference (or `None`), optionally restricted to a class
    pub fn instance(class: Option<&str>) -> Self {
        Self::plain(
            Validator::Instance {
                class: class.map(str::to_string),
                allow_none: true,
            },
            Value::None,
        )
    }

    /// List, default empty
    pub fn list(item: Option<Validator>) -> Self {
        Self::plain(Validator::List(item.map(Box::new)), Value::list(Vec::new()))
    }

    /// Dict, default empty
    pub fn dict(item: Option<Validator>) -> Self {
        Self::plain(Validator::Dict(item.map(Box::new)), Value::dict(Vec::<(String, Value)>::new()))
    }

    /// Write-only event
    pub fn event() -> Self {
        Self::new(FacetKind::Event, Validator::Any, DefaultValue::Constant(Value::Undefined))
    }

    /// Delegate whose assignments write through to the target
    ///
    /// `delegate` may be `"holder"` or `"holder.target"`.
    pub fn delegates_to(delegate: &str) -> Self {
        Self::new(
            FacetKind::Delegate(DelegateSpec::parse(delegate, true)),
            Validator::Any,
            DefaultValue::Missing,
        )
    }

    /// Delegate that is overridden by local assignment
    pub fn prototyped_from(delegate: &str) -> Self {
        Self::new(
            FacetKind::Delegate(DelegateSpec::parse(delegate, false)),
            Validator::Any,
            DefaultValue::Missing,
        )
    }

    /// Computed property; configure with `getter`, `setter`, `depends_on`, `cached`
    pub fn property() -> Self {
        Self::new(
            FacetKind::Property(PropertySpec::default()),
            Validator::Any,
            DefaultValue::Missing,
        )
    }

    /// Mapped facet: assigning a key also sets `name_` to the mapped value
    pub fn mapped(map: Vec<(Value, Value)>, default: impl Into<Value>) -> Self {
        let keys = map.iter().map(|(k, _)| k.clone()).collect();
        Self::new(
            FacetKind::Mapped(Arc::new(map)),
            Validator::Enum(keys),
            DefaultValue::Constant(default.into()),
        )
    }

    /// Assignable once
    pub fn read_only() -> Self {
        Self::new(FacetKind::ReadOnly, Validator::Any, DefaultValue::Constant(Value::Undefined))
    }

    /// Fixed value
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::new(FacetKind::Constant, Validator::Any, DefaultValue::Constant(value.into()))
    }

    /// Rejects all assignments
    pub fn disallow() -> Self {
        Self::new(FacetKind::Disallow, Validator::Any, DefaultValue::Missing)
    }

    pub(crate) fn catch_all() -> Self {
        Self::new(FacetKind::Plain, Validator::Any, DefaultValue::Missing)
    }

    pub(crate) fn items_event() -> Self {
        let mut facet = Self::event();
        facet.metadata.insert("items", Value::Bool(true));
        facet
    }

    // ----- modifiers -----

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key, value.into());
        self
    }

    /// Set the copy policy
    pub fn with_copy(mut self, policy: CopyPolicy) -> Self {
        self.copy = Some(policy);
        self
    }

    /// Set the comparison mode
    pub fn with_comparison(mut self, mode: ComparisonMode) -> Self {
        self.comparison = mode;
        self
    }

    /// Exclude from copying by default
    pub fn transient(mut self) -> Self {
        self.metadata.insert("transient", Value::Bool(true));
        self
    }

    /// Replace the default strategy
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    /// Compute the default on first access
    pub fn default_factory<F>(self, f: F) -> Self
    where
        F: Fn(&HasFacets) -> Value + Send + Sync + 'static,
    {
        self.with_default(DefaultValue::Factory(Arc::new(f)))
    }

    /// Read the default from the facet store
    pub fn stored_default(self, fallback: impl Into<Value>) -> Self {
        self.with_default(DefaultValue::Stored {
            fallback: fallback.into(),
        })
    }

    /// Replace the validator
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Property getter (ignored for non-properties)
    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&HasFacets) -> FacetResult<Value> + Send + Sync + 'static,
    {
        if let FacetKind::Property(spec) = &mut self.kind {
            spec.getter = Some(Arc::new(f));
        }
        self
    }

    /// Property setter (ignored for non-properties)
    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(&HasFacets, Value) -> FacetResult<()> + Send + Sync + 'static,
    {
        if let FacetKind::Property(spec) = &mut self.kind {
            spec.setter = Some(Arc::new(f));
        }
        self
    }

    /// Dependency pattern of a property
    pub fn depends_on(mut self, pattern: &str) -> Self {
        if let FacetKind::Property(spec) = &mut self.kind {
            spec.depends_on = Some(pattern.to_string());
        }
        self
    }

    /// Cache a property's value until a dependency changes
    pub fn cached(mut self) -> Self {
        if let FacetKind::Property(spec) = &mut self.kind {
            spec.cached = true;
        }
        self
    }

    /// Delegate target prefix rule
    pub fn prefix(mut self, prefix: &str) -> Self {
        if let FacetKind::Delegate(spec) = &mut self.kind {
            spec.prefix = prefix.to_string();
        }
        self
    }

    /// Whether a delegate re-announces target changes
    pub fn listenable(mut self, listenable: bool) -> Self {
        if let FacetKind::Delegate(spec) = &mut self.kind {
            spec.listenable = listenable;
        }
        self
    }

    /// Add a static change handler
    pub fn on_set(mut self, handler: Handler) -> Self {
        self.notifiers.push(Notifier::new(handler, Default::default()));
        self
    }

    // ----- accessors -----

    /// Behavior tag
    pub fn kind(&self) -> &FacetKind {
        &self.kind
    }

    /// Validator
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Default strategy
    pub fn default_value(&self) -> &DefaultValue {
        &self.default
    }

    /// Metadata bag, including the implicit `type` and `transient` keys
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Explicit copy policy
    pub fn copy_policy(&self) -> Option<CopyPolicy> {
        self.copy
    }

    /// Comparison mode
    pub fn comparison_mode(&self) -> ComparisonMode {
        self.comparison
    }

    /// Whether the facet is excluded from copies by default
    pub fn is_transient(&self) -> bool {
        self.metadata.get("transient") == Some(&Value::Bool(true))
    }

    /// Value of the `type` metadata
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Whether this is an event
    pub fn is_event(&self) -> bool {
        matches!(self.kind, FacetKind::Event)
    }

    /// Whether this is a `<name>_items` shadow
    pub fn is_items_shadow(&self) -> bool {
        self.metadata.get("items") == Some(&Value::Bool(true))
    }

    /// Collection shape of the stored value
    pub fn collection_kind(&self) -> Option<CollectionKind> {
        self.validator.collection_kind()
    }

    /// Installed notifiers, in delivery order
    pub fn notifiers(&self) -> &[Notifier] {
        &self.notifiers
    }

    /// Whether the facet can be assigned through `set`
    pub fn is_settable(&self) -> bool {
        match &self.kind {
            FacetKind::Constant | FacetKind::Disallow => false,
            FacetKind::Property(spec) => spec.setter.is_some(),
            _ => true,
        }
    }

    pub(crate) fn add_notifier(&mut self, notifier: Notifier, priority: bool) {
        if priority {
            self.notifiers.insert(0, notifier);
        } else {
            self.notifiers.push(notifier);
        }
    }

    pub(crate) fn has_notifier(&self, id: NotifierId) -> bool {
        self.notifiers.iter().any(|n| n.id() == id)
    }

    /// Detach a notifier; the caller drops it once no lock is held
    pub(crate) fn take_notifier(&mut self, id: NotifierId) -> Option<Notifier> {
        let index = self.notifiers.iter().position(|n| n.id() == id)?;
        Some(self.notifiers.remove(index))
    }
}

impl fmt::Debug for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facet")
            .field("type", &self.type_name())
            .field("validator", &self.validator)
            .field("metadata", &self.metadata)
            .field("copy", &self.copy)
            .field("comparison", &self.comparison)
            .field("notifiers", &self.notifiers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_metadata() {
        let f = Facet::int(3);
        assert_eq!(f.metadata().get_str("type"), Some("plain"));
        assert!(!f.is_transient());
        assert!(Facet::event().is_transient());
        assert!(Facet::int(0).transient().is_transient());
    }

    #[test]
    fn test_delegate_prefix_rules() {
        let spec = DelegateSpec::parse("parent", false);
        assert_eq!(spec.target_name("color", "my_"), "color");

        let spec = DelegateSpec::parse("parent.shade", false);
        assert_eq!(spec.delegate, "parent");
        assert_eq!(spec.target_name("color", "my_"), "shade");

        let mut spec = DelegateSpec::parse("parent", true);
        spec.prefix = "default_*".to_string();
        assert_eq!(spec.target_name("color", "my_"), "default_color");

        spec.prefix = "*".to_string();
        assert_eq!(spec.target_name("color", "my_"), "my_color");
    }

    #[test]
    fn test_comparison_modes() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = Value::list(vec![Value::Int(1)]);
        assert!(!ComparisonMode::Equality.changed(&a, &b));
        assert!(ComparisonMode::Identity.changed(&a, &b));
        assert!(ComparisonMode::Always.changed(&a, &a));
    }

    #[test]
    fn test_priority_notifier_goes_first() {
        let mut f = Facet::int(0);
        let first = Notifier::new(Handler::no_args(|| {}), Default::default());
        let urgent = Notifier::new(Handler::no_args(|| {}), Default::default());
        let urgent_id = urgent.id();
        f.add_notifier(first, false);
        f.add_notifier(urgent, true);
        assert_eq!(f.notifiers()[0].id(), urgent_id);
        assert!(f.has_notifier(urgent_id));
        assert!(f.take_notifier(urgent_id).is_some());
        assert!(f.take_notifier(urgent_id).is_none());
        assert_eq!(f.notifiers().len(), 1);
    }

    #[test]
    fn test_settable() {
        assert!(Facet::int(0).is_settable());
        assert!(!Facet::constant(1).is_settable());
        assert!(!Facet::property().is_settable());
        assert!(Facet::property().setter(|_, _| Ok(())).is_settable());
    }
}
