//! Notification exception-handler stack
//!
//! Handlers are kept per thread: a failure is reported to the innermost
//! handler pushed on the thread that ran the failing notifier. With no
//! handler installed the failure is logged.

use super::ChangeEvent;
use crate::config;
use crate::error::{FacetError, FacetResult};
use crate::object::HasFacets;
use crate::value::Value;
use std::cell::RefCell;
use std::sync::Arc;

/// A failed notification, as seen by an exception handler
#[derive(Debug)]
pub struct NotificationFailure {
    /// Object whose facet changed
    pub object: HasFacets,
    /// Facet name
    pub name: String,
    /// Previous value
    pub old: Value,
    /// New value
    pub new: Value,
    /// What went wrong
    pub error: FacetError,
}

type ExceptionHandlerFn = Arc<dyn Fn(&NotificationFailure) + Send + Sync>;

#[derive(Clone)]
struct Entry {
    handler: ExceptionHandlerFn,
    reraise: bool,
}

thread_local! {
    static HANDLERS: RefCell<Vec<Entry>> = const { RefCell::new(Vec::new()) };
}

/// Push an exception handler for the current thread
///
/// With `reraise`, failures of inline (`same`) notifications are also
/// returned to the code that made the triggering assignment.
pub fn push_exception_handler<F>(handler: F, reraise: bool)
where
    F: Fn(&NotificationFailure) + Send + Sync + 'static,
{
    HANDLERS.with(|stack| {
        stack.borrow_mut().push(Entry {
            handler: Arc::new(handler),
            reraise,
        })
    });
}

/// Pop the innermost exception handler; returns false if none was installed
pub fn pop_exception_handler() -> bool {
    HANDLERS.with(|stack| stack.borrow_mut().pop().is_some())
}

/// Report a failure; returns it back as an error only when the innermost
/// handler re-raises and the caller can propagate it
pub(crate) fn report(event: &ChangeEvent, error: FacetError, can_reraise: bool) -> FacetResult<()> {
    let top = HANDLERS.with(|stack| stack.borrow().last().cloned());
    let failure = NotificationFailure {
        object: event.object.clone(),
        name: event.name.clone(),
        old: event.old.clone(),
        new: event.new.clone(),
        error,
    };

    match top {
        Some(entry) => {
            (entry.handler)(&failure);
            if entry.reraise && can_reraise {
                return Err(failure.error);
            }
        }
        None => {
            if config::current().log_notification_errors {
                tracing::error!(
                    object = %failure.object.class_name(),
                    facet = %failure.name,
                    old = %failure.old,
                    new = %failure.new,
                    error = %failure.error,
                    "exception occurred in facet notification handler"
                );
            }
        }
    }
    Ok(())
}
