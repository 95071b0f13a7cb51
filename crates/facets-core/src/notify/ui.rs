//! The designated UI thread and the `ui` / `fast_ui` dispatch strategies
//!
//! Calls made from the UI thread itself run inline. Calls from any other
//! thread are queued over a channel and run by the UI thread in the order
//! received. The `ui` strategy additionally coalesces: while a delivery for
//! the same (object, facet, notifier) is still queued, later changes only
//! update its new value. With no UI thread running both strategies run
//! inline.

use super::dispatch::{DispatchStrategy, PendingCall, PendingKey};
use crate::config;
use crate::error::{FacetError, FacetResult};
use crossbeam::channel::{self, Sender};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

type Job = Box<dyn FnOnce() + Send>;
type Slot = Arc<Mutex<Option<PendingCall>>>;

struct UiShared {
    sender: Sender<Job>,
    thread_id: ThreadId,
    pending: Mutex<FxHashMap<PendingKey, Slot>>,
}

static UI: Lazy<RwLock<Option<Arc<UiShared>>>> = Lazy::new(|| RwLock::new(None));

fn current() -> Option<Arc<UiShared>> {
    UI.read().clone()
}

/// Whether the calling thread is the designated UI thread
pub fn is_ui_thread() -> bool {
    current().is_some_and(|ui| ui.thread_id == thread::current().id())
}

/// Whether a UI thread is running
pub fn is_running() -> bool {
    UI.read().is_some()
}

/// Spawn and designate the UI thread
pub fn start() -> FacetResult<UiHandle> {
    let mut slot = UI.write();
    if slot.is_some() {
        return Err(FacetError::Config("a UI thread is already running".to_string()));
    }

    let (sender, receiver) = channel::unbounded::<Job>();
    let join = thread::Builder::new()
        .name(config::current().ui_thread_name)
        .spawn(move || {
            for job in receiver.iter() {
                job();
            }
        })?;

    let shared = Arc::new(UiShared {
        sender,
        thread_id: join.thread().id(),
        pending: Mutex::new(FxHashMap::default()),
    });
    *slot = Some(shared.clone());
    tracing::debug!("UI dispatch thread started");

    Ok(UiHandle {
        shared: Some(shared),
        join: Some(join),
    })
}

/// Owner of the running UI thread; shuts it down when dropped
pub struct UiHandle {
    shared: Option<Arc<UiShared>>,
    join: Option<JoinHandle<()>>,
}

impl UiHandle {
    /// Block until every call queued before this one has run
    pub fn wait_idle(&self) {
        let Some(shared) = &self.shared else {
            return;
        };
        if shared.thread_id == thread::current().id() {
            return;
        }
        let (done_tx, done_rx) = channel::bounded::<()>(1);
        let job: Job = Box::new(move || {
            let _ = done_tx.send(());
        });
        if shared.sender.send(job).is_ok() {
            let _ = done_rx.recv();
        }
    }

    /// Undesignate the UI thread, let it drain its queue, and join it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        {
            let mut slot = UI.write();
            if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, &shared)) {
                *slot = None;
            }
        }
        drop(shared);
        if let Some(join) = self.join.take() {
            if join.thread().id() != thread::current().id() {
                let _ = join.join();
            }
        }
        tracing::debug!("UI dispatch thread stopped");
    }
}

impl Drop for UiHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The `ui` and `fast_ui` strategies
#[derive(Debug)]
pub struct UiDispatch {
    coalesce: bool,
}

impl UiDispatch {
    /// Strategy that coalesces pending deliveries (`ui`)
    pub fn coalescing() -> Self {
        Self { coalesce: true }
    }

    /// Strategy that delivers every call in order (`fast_ui`)
    pub fn ordered() -> Self {
        Self { coalesce: false }
    }
}

impl DispatchStrategy for UiDispatch {
    fn dispatch(&self, call: PendingCall) {
        let Some(shared) = current() else {
            call.run();
            return;
        };
        if shared.thread_id == thread::current().id() {
            call.run();
            return;
        }

        if !self.coalesce {
            let job: Job = Box::new(move || call.run());
            if let Err(err) = shared.sender.send(job) {
                (err.into_inner())();
            }
            return;
        }

        let key = call.key();
        let slot: Slot = {
            let mut pending = shared.pending.lock();
            if let Some(existing) = pending.get(&key) {
                let mut queued = existing.lock();
                if let Some(queued) = queued.as_mut() {
                    queued.event_mut().new = call.event().new.clone();
                    return;
                }
            }
            let slot = Arc::new(Mutex::new(Some(call)));
            pending.insert(key.clone(), slot.clone());
            slot
        };

        let owner = shared.clone();
        let job: Job = Box::new(move || {
            owner.pending.lock().remove(&key);
            let taken = slot.lock().take();
            if let Some(call) = taken {
                call.run();
            }
        });
        if let Err(err) = shared.sender.send(job) {
            (err.into_inner())();
        }
    }
}
