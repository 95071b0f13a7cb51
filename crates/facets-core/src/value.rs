//! Dynamically-typed facet values
//!
//! Collections are reference counted and copy-on-write: every mutation made
//! through an object's collection API produces a new container, so a value
//! handed to a change handler is a stable snapshot.

use crate::error::FacetResult;
use crate::id::ObjectId;
use crate::object::HasFacets;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Objects already copied during a deep copy, keyed by the source identity
pub type CopyMemo = FxHashMap<ObjectId, HasFacets>;

/// A value stored in (or assigned to) a facet
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Never assigned
    #[default]
    Undefined,
    /// Explicit null
    None,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Ordered sequence
    List(Arc<Vec<Value>>),
    /// String-keyed mapping
    Dict(Arc<BTreeMap<String, Value>>),
    /// Reference to another facet-bearing object
    Object(HasFacets),
    /// Payload of a `<name>_items` collection event
    Items(Arc<ItemsEvent>),
}

/// Describes an in-place change to a collection facet
#[derive(Clone, Debug, PartialEq)]
pub enum ItemsEvent {
    /// Elements replaced starting at `index`
    List {
        /// First affected index
        index: usize,
        /// Elements taken out
        removed: Vec<Value>,
        /// Elements put in
        added: Vec<Value>,
    },
    /// Keys added, changed or removed
    Dict {
        /// New keys with their values
        added: BTreeMap<String, Value>,
        /// Existing keys with their previous values
        changed: BTreeMap<String, Value>,
        /// Removed keys with their previous values
        removed: BTreeMap<String, Value>,
    },
}

impl Value {
    /// Build a list value
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    /// Build a dict value
    pub fn dict<K: Into<String>, I: IntoIterator<Item = (K, Value)>>(items: I) -> Value {
        Value::Dict(Arc::new(
            items.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Short type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Object(_) => "object",
            Value::Items(_) => "items",
        }
    }

    /// True for `Undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True for `None` or `Undefined`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::None | Value::Undefined)
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric payload, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// List elements
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Dict entries
    pub fn as_dict(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Referenced object
    pub fn as_object(&self) -> Option<&HasFacets> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Collection event payload
    pub fn as_items(&self) -> Option<&ItemsEvent> {
        match self {
            Value::Items(ev) => Some(ev),
            _ => None,
        }
    }

    /// Objects directly reachable from this value: the object itself, or the
    /// object elements of a list or the object values of a dict
    pub fn objects(&self) -> Vec<HasFacets> {
        match self {
            Value::Object(obj) => vec![obj.clone()],
            Value::List(items) => items.iter().filter_map(|v| v.as_object().cloned()).collect(),
            Value::Dict(map) => map.values().filter_map(|v| v.as_object().cloned()).collect(),
            _ => Vec::new(),
        }
    }

    /// Identity comparison: containers and objects by reference, scalars by value
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b),
            (Value::Items(a), Value::Items(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    /// Copy containers one level deep; objects become new instances holding
    /// the same values
    pub fn shallow_copy(&self) -> FacetResult<Value> {
        Ok(match self {
            Value::List(items) => Value::List(Arc::new(items.as_ref().clone())),
            Value::Dict(map) => Value::Dict(Arc::new(map.as_ref().clone())),
            Value::Object(obj) => Value::Object(obj.shallow_clone()?),
            other => other.clone(),
        })
    }

    /// Copy recursively, cloning nested objects through `clone_facets`
    ///
    /// `memo` maps already-copied source objects to their copies so shared
    /// and cyclic references are preserved.
    pub fn deep_copy(&self, memo: &mut CopyMemo) -> FacetResult<Value> {
        Ok(match self {
            Value::List(items) => {
                let mut copied = Vec::with_capacity(items.len());
                for item in items.iter() {
                    copied.push(item.deep_copy(memo)?);
                }
                Value::List(Arc::new(copied))
            }
            Value::Dict(map) => {
                let mut copied = BTreeMap::new();
                for (key, item) in map.iter() {
                    copied.insert(key.clone(), item.deep_copy(memo)?);
                }
                Value::Dict(Arc::new(copied))
            }
            Value::Object(obj) => match memo.get(&obj.id()) {
                Some(done) => Value::Object(done.clone()),
                None => Value::Object(obj.deep_clone(memo)?),
            },
            other => other.clone(),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Items(a), Value::Items(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "<undefined>"),
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Dict(map) => {
                write!(f, "{{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}': {}", key, item)?;
                }
                write!(f, "}}")
            }
            Value::Object(obj) => write!(f, "<{} object #{}>", obj.class_name(), obj.id().as_u64()),
            Value::Items(_) => write!(f, "<items event>"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<HasFacets> for Value {
    fn from(obj: HasFacets) -> Self {
        Value::Object(obj)
    }
}

impl From<&HasFacets> for Value {
    fn from(obj: &HasFacets) -> Self {
        Value::Object(obj.clone())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }
}

impl From<ItemsEvent> for Value {
    fn from(ev: ItemsEvent) -> Self {
        Value::Items(Arc::new(ev))
    }
}
