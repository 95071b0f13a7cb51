//! Typed methods
//!
//! A typed method declares a validator for each parameter and for its
//! result. The declared parameter list must match the arity of the wrapped
//! callable; a mismatch is reported when the class is built.

use crate::error::{FacetError, FacetResult};
use crate::facet::Validator;
use crate::object::HasFacets;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Method body
pub type MethodFn = Arc<dyn Fn(&HasFacets, &[Value]) -> FacetResult<Value> + Send + Sync>;

/// A method with validated arguments and result
#[derive(Clone)]
pub struct TypedMethod {
    name: String,
    params: Vec<(String, Validator)>,
    returns: Validator,
    arity: usize,
    func: MethodFn,
}

impl TypedMethod {
    /// Wrap a callable taking `arity` arguments
    pub fn new<F>(name: &str, arity: usize, func: F) -> Self
    where
        F: Fn(&HasFacets, &[Value]) -> FacetResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            returns: Validator::Any,
            arity,
            func: Arc::new(func),
        }
    }

    /// Declare the next parameter
    pub fn param(mut self, name: &str, validator: Validator) -> Self {
        self.params.push((name.to_string(), validator));
        self
    }

    /// Declare the result type
    pub fn returns(mut self, validator: Validator) -> Self {
        self.returns = validator;
        self
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter names
    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub(crate) fn check_signature(&self) -> FacetResult<()> {
        if self.params.len() != self.arity {
            return Err(FacetError::Signature {
                name: self.name.clone(),
                message: format!(
                    "{} parameter types declared for a method taking {} arguments",
                    self.params.len(),
                    self.arity
                ),
            });
        }
        Ok(())
    }

    pub(crate) fn invoke(&self, object: &HasFacets, args: &[Value]) -> FacetResult<Value> {
        if args.len() != self.params.len() {
            return Err(FacetError::Signature {
                name: self.name.clone(),
                message: format!("expected {} arguments, got {}", self.params.len(), args.len()),
            });
        }
        let mut checked = Vec::with_capacity(args.len());
        for ((param, validator), arg) in self.params.iter().zip(args) {
            let value = validator
                .validate(arg.clone())
                .map_err(|expected| FacetError::Validation {
                    class: object.class_name().to_string(),
                    name: format!("{}({})", self.name, param),
                    value: arg.clone(),
                    expected,
                })?;
            checked.push(value);
        }
        let result = (self.func)(object, &checked)?;
        self.returns
            .validate(result.clone())
            .map_err(|expected| FacetError::Validation {
                class: object.class_name().to_string(),
                name: format!("{}() result", self.name),
                value: result,
                expected,
            })
    }
}

impl fmt::Debug for TypedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedMethod")
            .field("name", &self.name)
            .field("params", &self.param_names())
            .field("arity", &self.arity)
            .finish()
    }
}
