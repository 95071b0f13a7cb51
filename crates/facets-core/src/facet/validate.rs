//! Value validators

use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Custom validation function: returns the accepted (possibly coerced)
/// value, or `None` to reject
pub type ValidateFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Collection shape of a facet, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Ordered sequence
    List,
    /// String-keyed mapping
    Dict,
}

/// Checks (and possibly coerces) values assigned to a facet
#[derive(Clone)]
pub enum Validator {
    /// Accepts everything
    Any,
    /// Booleans only
    Bool,
    /// Integers only
    Int,
    /// Floats; integers are widened
    Float,
    /// Strings only
    Str,
    /// Numbers within an inclusive range
    Range {
        /// Lower bound
        low: f64,
        /// Upper bound
        high: f64,
        /// Whether only integers are accepted
        integer: bool,
    },
    /// One of a fixed set of values
    Enum(Vec<Value>),
    /// Objects, optionally restricted to a class (or its subclasses)
    Instance {
        /// Required class name
        class: Option<String>,
        /// Whether `None` is accepted
        allow_none: bool,
    },
    /// Lists, with an optional element validator
    List(Option<Box<Validator>>),
    /// Dicts, with an optional value validator
    Dict(Option<Box<Validator>>),
    /// First matching alternative wins
    Either(Vec<Validator>),
    /// User supplied check
    Custom {
        /// Description of accepted values
        info: String,
        /// The check
        func: ValidateFn,
    },
}

impl Validator {
    /// Build a custom validator
    pub fn custom<F>(info: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Validator::Custom {
            info: info.into(),
            func: Arc::new(func),
        }
    }

    /// Validate `value`, returning the value to store or the description of
    /// what was expected
    pub fn validate(&self, value: Value) -> Result<Value, String> {
        match self.check(value) {
            Some(v) => Ok(v),
            None => Err(self.info()),
        }
    }

    fn check(&self, value: Value) -> Option<Value> {
        match self {
            Validator::Any => Some(value),
            Validator::Bool => matches!(value, Value::Bool(_)).then_some(value),
            Validator::Int => matches!(value, Value::Int(_)).then_some(value),
            Validator::Float => match value {
                Value::Float(_) => Some(value),
                Value::Int(i) => Some(Value::Float(i as f64)),
                _ => None,
            },
            Validator::Str => matches!(value, Value::Str(_)).then_some(value),
            Validator::Range { low, high, integer } => match value {
                Value::Int(i) => {
                    let x = i as f64;
                    if x < *low || x > *high {
                        None
                    } else if *integer {
                        Some(Value::Int(i))
                    } else {
                        Some(Value::Float(x))
                    }
                }
                Value::Float(x) if !*integer && x >= *low && x <= *high => Some(Value::Float(x)),
                _ => None,
            },
            Validator::Enum(values) => values.contains(&value).then_some(value),
            Validator::Instance { class, allow_none } => match &value {
                Value::None | Value::Undefined if *allow_none => Some(Value::None),
                Value::Object(obj) => match class {
                    Some(name) if !obj.class().is_subclass_of(name) => None,
                    _ => Some(value),
                },
                _ => None,
            },
            Validator::List(item) => {
                let items = match &value {
                    Value::List(items) => items,
                    _ => return None,
                };
                let Some(item) = item else {
                    return Some(value);
                };
                let mut changed = false;
                let mut checked = Vec::with_capacity(items.len());
                for element in items.iter() {
                    let v = item.check(element.clone())?;
                    changed |= !v.is_identical(element);
                    checked.push(v);
                }
                if changed {
                    Some(Value::from(checked))
                } else {
                    Some(value)
                }
            }
            Validator::Dict(item) => {
                let map = match &value {
                    Value::Dict(map) => map,
                    _ => return None,
                };
                let Some(item) = item else {
                    return Some(value);
                };
                let mut changed = false;
                let mut checked = std::collections::BTreeMap::new();
                for (key, element) in map.iter() {
                    let v = item.check(element.clone())?;
                    changed |= !v.is_identical(element);
                    checked.insert(key.clone(), v);
                }
                if changed {
                    Some(Value::Dict(Arc::new(checked)))
                } else {
                    Some(value)
                }
            }
            Validator::Either(alternatives) => alternatives
                .iter()
                .find_map(|alt| alt.check(value.clone())),
            Validator::Custom { func, .. } => func(&value),
        }
    }

    /// Validate one element added to a collection facet
    pub fn validate_item(&self, value: Value) -> Result<Value, String> {
        match self {
            Validator::List(Some(item)) | Validator::Dict(Some(item)) => item.validate(value),
            _ => Ok(value),
        }
    }

    /// Collection shape accepted by this validator
    pub fn collection_kind(&self) -> Option<CollectionKind> {
        match self {
            Validator::List(_) => Some(CollectionKind::List),
            Validator::Dict(_) => Some(CollectionKind::Dict),
            _ => None,
        }
    }

    /// Human readable description of accepted values
    pub fn info(&self) -> String {
        match self {
            Validator::Any => "any value".to_string(),
            Validator::Bool => "a boolean".to_string(),
            Validator::Int => "an integer".to_string(),
            Validator::Float => "a float".to_string(),
            Validator::Str => "a string".to_string(),
            Validator::Range { low, high, integer } => {
                if *integer {
                    format!("an integer in the range {} to {}", *low as i64, *high as i64)
                } else {
                    format!("a number in the range {:?} to {:?}", low, high)
                }
            }
            Validator::Enum(values) => {
                let shown: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                format!("one of [{}]", shown.join(", "))
            }
            Validator::Instance { class, allow_none } => {
                let base = match class {
                    Some(name) => format!("an instance of {}", name),
                    None => "an object".to_string(),
                };
                if *allow_none {
                    format!("{} or None", base)
                } else {
                    base
                }
            }
            Validator::List(Some(item)) => format!("a list of items which are {}", item.info()),
            Validator::List(None) => "a list".to_string(),
            Validator::Dict(Some(item)) => format!("a dict with values which are {}", item.info()),
            Validator::Dict(None) => "a dict".to_string(),
            Validator::Either(alternatives) => {
                let shown: Vec<String> = alternatives.iter().map(|v| v.info()).collect();
                shown.join(" or ")
            }
            Validator::Custom { info, .. } => info.clone(),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validator({})", self.info())
    }
}
