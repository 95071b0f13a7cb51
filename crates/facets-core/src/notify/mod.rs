//! Change notifiers
//!
//! A [`Notifier`] adapts one of the five supported handler shapes, plus a
//! [`Dispatch`] mode, to a uniform `(object, name, old, new)` delivery.
//! Failures (including panics inside user handlers) are routed to the
//! exception-handler stack in [`errors`].

pub mod dispatch;
pub mod errors;
pub mod ui;

pub use dispatch::{register_dispatch, Dispatch, DispatchStrategy, PendingCall};
pub use errors::{pop_exception_handler, push_exception_handler, NotificationFailure};

use crate::error::{FacetError, FacetResult};
use crate::id::NotifierId;
use crate::object::HasFacets;
use crate::value::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// One delivered change
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    /// Object whose facet changed
    pub object: HasFacets,
    /// Facet name
    pub name: String,
    /// Previous value (`Undefined` if never assigned or not tracked)
    pub old: Value,
    /// New value
    pub new: Value,
}

impl ChangeEvent {
    /// Build an event
    pub fn new(object: &HasFacets, name: &str, old: Value, new: Value) -> Self {
        Self {
            object: object.clone(),
            name: name.to_string(),
            old,
            new,
        }
    }
}

type NoArgsFn = Arc<dyn Fn() + Send + Sync>;
type NewFn = Arc<dyn Fn(&Value) + Send + Sync>;
type NameNewFn = Arc<dyn Fn(&str, &Value) + Send + Sync>;
type ObjectNameNewFn = Arc<dyn Fn(&HasFacets, &str, &Value) + Send + Sync>;
type FullFn = Arc<dyn Fn(&HasFacets, &str, &Value, &Value) + Send + Sync>;

/// Crate-internal callback used for links, sync, delegates and properties
pub(crate) type InternalFn = Arc<dyn Fn(&ChangeEvent) -> FacetResult<()> + Send + Sync>;

/// A change handler in one of the five supported call shapes
#[derive(Clone)]
pub enum Handler {
    /// `handler()`
    NoArgs(NoArgsFn),
    /// `handler(new)`
    New(NewFn),
    /// `handler(name, new)`
    NameNew(NameNewFn),
    /// `handler(object, name, new)`
    ObjectNameNew(ObjectNameNewFn),
    /// `handler(object, name, old, new)`
    Full(FullFn),
}

impl Handler {
    /// Handler taking no arguments
    pub fn no_args<F: Fn() + Send + Sync + 'static>(f: F) -> Self {
        Handler::NoArgs(Arc::new(f))
    }

    /// Handler taking the new value
    pub fn new_value<F: Fn(&Value) + Send + Sync + 'static>(f: F) -> Self {
        Handler::New(Arc::new(f))
    }

    /// Handler taking the facet name and new value
    pub fn name_new<F: Fn(&str, &Value) + Send + Sync + 'static>(f: F) -> Self {
        Handler::NameNew(Arc::new(f))
    }

    /// Handler taking the object, facet name and new value
    pub fn object_name_new<F>(f: F) -> Self
    where
        F: Fn(&HasFacets, &str, &Value) + Send + Sync + 'static,
    {
        Handler::ObjectNameNew(Arc::new(f))
    }

    /// Handler taking the object, facet name, old and new value
    pub fn full<F>(f: F) -> Self
    where
        F: Fn(&HasFacets, &str, &Value, &Value) + Send + Sync + 'static,
    {
        Handler::Full(Arc::new(f))
    }

    /// Number of arguments the handler declares
    pub fn arity(&self) -> usize {
        match self {
            Handler::NoArgs(_) => 0,
            Handler::New(_) => 1,
            Handler::NameNew(_) => 2,
            Handler::ObjectNameNew(_) => 3,
            Handler::Full(_) => 4,
        }
    }

    /// Whether the handler only sees values, not the object that changed
    pub fn is_value_shaped(&self) -> bool {
        matches!(self, Handler::New(_) | Handler::NameNew(_))
    }

    fn ptr(&self) -> *const () {
        match self {
            Handler::NoArgs(f) => Arc::as_ptr(f) as *const (),
            Handler::New(f) => Arc::as_ptr(f) as *const (),
            Handler::NameNew(f) => Arc::as_ptr(f) as *const (),
            Handler::ObjectNameNew(f) => Arc::as_ptr(f) as *const (),
            Handler::Full(f) => Arc::as_ptr(f) as *const (),
        }
    }

    /// Identity comparison: true if both wrap the same closure
    pub fn same_as(&self, other: &Handler) -> bool {
        std::ptr::eq(self.ptr(), other.ptr())
    }

    pub(crate) fn call(&self, object: &HasFacets, name: &str, old: &Value, new: &Value) {
        match self {
            Handler::NoArgs(f) => f(),
            Handler::New(f) => f(new),
            Handler::NameNew(f) => f(name, new),
            Handler::ObjectNameNew(f) => f(object, name, new),
            Handler::Full(f) => f(object, name, old, new),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler(arity={}, {:p})", self.arity(), self.ptr())
    }
}

#[derive(Clone)]
pub(crate) enum Callback {
    User(Handler),
    Internal(InternalFn),
}

/// A handler bound to a dispatch mode, as installed on a facet
#[derive(Clone)]
pub struct Notifier {
    id: NotifierId,
    callback: Callback,
    dispatch: Dispatch,
}

impl Notifier {
    /// Wrap a user handler
    pub fn new(handler: Handler, dispatch: Dispatch) -> Self {
        Self {
            id: NotifierId::new(),
            callback: Callback::User(handler),
            dispatch,
        }
    }

    pub(crate) fn internal<F>(f: F) -> Self
    where
        F: Fn(&ChangeEvent) -> FacetResult<()> + Send + Sync + 'static,
    {
        Self {
            id: NotifierId::new(),
            callback: Callback::Internal(Arc::new(f)),
            dispatch: Dispatch::Same,
        }
    }

    /// Notifier id
    pub fn id(&self) -> NotifierId {
        self.id
    }

    /// Dispatch mode
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// The wrapped user handler, if this is not an internal notifier
    pub fn handler(&self) -> Option<&Handler> {
        match &self.callback {
            Callback::User(h) => Some(h),
            Callback::Internal(_) => None,
        }
    }

    /// Whether this notifier wraps `handler`
    pub fn wraps(&self, handler: &Handler) -> bool {
        self.handler().is_some_and(|h| h.same_as(handler))
    }

    /// Deliver `event` according to the dispatch mode
    ///
    /// Only `same` dispatch can fail back to the caller, and only when the
    /// innermost exception handler asks for failures to be re-raised.
    pub(crate) fn notify(&self, event: &ChangeEvent) -> FacetResult<()> {
        match &self.dispatch {
            Dispatch::Same => match self.run(event) {
                Ok(()) => Ok(()),
                Err(err) => errors::report(event, err, true),
            },
            other => {
                let strategy = dispatch::strategy(other)?;
                strategy.dispatch(PendingCall::new(self.clone(), event.clone()));
                Ok(())
            }
        }
    }

    /// Invoke the callback on the current thread
    pub(crate) fn run(&self, event: &ChangeEvent) -> FacetResult<()> {
        match &self.callback {
            Callback::Internal(f) => f(event),
            Callback::User(handler) => catch_unwind(AssertUnwindSafe(|| {
                handler.call(&event.object, &event.name, &event.old, &event.new)
            }))
            .map_err(|payload| FacetError::Notification {
                name: event.name.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.callback {
            Callback::User(h) => format!("{:?}", h),
            Callback::Internal(_) => "internal".to_string(),
        };
        f.debug_struct("Notifier")
            .field("id", &self.id)
            .field("callback", &kind)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
