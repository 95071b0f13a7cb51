//! Dispatch modes and the pluggable strategy registry

use super::{errors, ChangeEvent, Notifier};
use crate::error::{FacetError, FacetResult};
use crate::id::{NotifierId, ObjectId};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

/// Execution-context policy used to deliver a notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Dispatch {
    /// Inline, on the thread performing the assignment
    #[default]
    Same,
    /// On a freshly spawned thread
    New,
    /// On the UI thread, coalescing repeated changes
    Ui,
    /// On the UI thread, in order, without coalescing
    FastUi,
    /// A strategy registered with [`register_dispatch`]
    Custom(String),
}

impl Dispatch {
    /// Parse a dispatch mode name
    pub fn parse(name: &str) -> FacetResult<Dispatch> {
        match name {
            "same" => Ok(Dispatch::Same),
            "new" => Ok(Dispatch::New),
            "ui" => Ok(Dispatch::Ui),
            "fast_ui" => Ok(Dispatch::FastUi),
            other if REGISTRY.read().contains_key(other) => Ok(Dispatch::Custom(other.to_string())),
            other => Err(FacetError::UnknownDispatch(other.to_string())),
        }
    }

    /// Registry name of this mode
    pub fn name(&self) -> &str {
        match self {
            Dispatch::Same => "same",
            Dispatch::New => "new",
            Dispatch::Ui => "ui",
            Dispatch::FastUi => "fast_ui",
            Dispatch::Custom(name) => name,
        }
    }
}

impl FromStr for Dispatch {
    type Err = FacetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dispatch::parse(s)
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Key used to coalesce pending deliveries of the same change stream
pub type PendingKey = (ObjectId, String, NotifierId);

/// A notification waiting to be delivered by a strategy
pub struct PendingCall {
    notifier: Notifier,
    event: ChangeEvent,
}

impl PendingCall {
    pub(crate) fn new(notifier: Notifier, event: ChangeEvent) -> Self {
        Self { notifier, event }
    }

    /// The change being delivered
    pub fn event(&self) -> &ChangeEvent {
        &self.event
    }

    /// Mutable access, used when coalescing
    pub fn event_mut(&mut self) -> &mut ChangeEvent {
        &mut self.event
    }

    /// Identity of the change stream this call belongs to
    pub fn key(&self) -> PendingKey {
        (self.event.object.id(), self.event.name.clone(), self.notifier.id())
    }

    /// Run the handler on the current thread; failures go to the
    /// exception-handler stack and are never re-raised
    pub fn run(self) {
        if let Err(err) = self.notifier.run(&self.event) {
            let _ = errors::report(&self.event, err, false);
        }
    }
}

/// Delivers pending calls in some execution context
pub trait DispatchStrategy: Send + Sync {
    /// Take ownership of a call and arrange for it to run
    fn dispatch(&self, call: PendingCall);
}

/// Runs every notification on its own thread
#[derive(Debug, Default)]
pub struct NewThreadDispatch;

impl DispatchStrategy for NewThreadDispatch {
    fn dispatch(&self, call: PendingCall) {
        let spawned = thread::Builder::new()
            .name("facets-notify".to_string())
            .spawn(move || call.run());
        if let Err(err) = spawned {
            tracing::error!(error = %err, "failed to spawn notification thread");
        }
    }
}

static REGISTRY: Lazy<RwLock<FxHashMap<String, Arc<dyn DispatchStrategy>>>> = Lazy::new(|| {
    let mut strategies: FxHashMap<String, Arc<dyn DispatchStrategy>> = FxHashMap::default();
    strategies.insert("new".to_string(), Arc::new(NewThreadDispatch));
    strategies.insert("ui".to_string(), Arc::new(super::ui::UiDispatch::coalescing()));
    strategies.insert("fast_ui".to_string(), Arc::new(super::ui::UiDispatch::ordered()));
    RwLock::new(strategies)
});

/// Register (or replace) a named dispatch strategy
///
/// `same` cannot be replaced; it is always delivered inline.
pub fn register_dispatch(name: &str, strategy: Arc<dyn DispatchStrategy>) -> FacetResult<()> {
    if name == "same" {
        return Err(FacetError::Config("the 'same' dispatch mode cannot be replaced".to_string()));
    }
    REGISTRY.write().insert(name.to_string(), strategy);
    Ok(())
}

/// Strategy responsible for a non-inline dispatch mode
pub(crate) fn strategy(dispatch: &Dispatch) -> FacetResult<Arc<dyn DispatchStrategy>> {
    REGISTRY
        .read()
        .get(dispatch.name())
        .cloned()
        .ok_or_else(|| FacetError::UnknownDispatch(dispatch.name().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builtin_modes() {
        assert_eq!(Dispatch::parse("same").unwrap(), Dispatch::Same);
        assert_eq!(Dispatch::parse("new").unwrap(), Dispatch::New);
        assert_eq!(Dispatch::parse("ui").unwrap(), Dispatch::Ui);
        assert_eq!("fast_ui".parse::<Dispatch>().unwrap(), Dispatch::FastUi);
    }

    #[test]
    fn test_unknown_mode() {
        assert!(matches!(
            Dispatch::parse("nowhere"),
            Err(FacetError::UnknownDispatch(name)) if name == "nowhere"
        ));
    }

    #[test]
    fn test_registered_mode_parses_as_custom() {
        struct Inline;
        impl DispatchStrategy for Inline {
            fn dispatch(&self, call: PendingCall) {
                call.run();
            }
        }
        register_dispatch("inline_test", Arc::new(Inline)).unwrap();
        assert_eq!(
            Dispatch::parse("inline_test").unwrap(),
            Dispatch::Custom("inline_test".to_string())
        );
        assert!(register_dispatch("same", Arc::new(Inline)).is_err());
    }
}
