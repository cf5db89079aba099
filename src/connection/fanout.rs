//! Per-connection event fan-out.
//!
//! Owners sharing one connection register callbacks per event kind under
//! their own id. Dispatch walks listeners in registration order; removing
//! one owner never touches another owner's listeners.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::event::{Event, EventCallback, EventKind};

struct Listener {
    owner: Arc<str>,
    kind: EventKind,
    callback: EventCallback,
}

/// Callback table for one shared connection.
#[derive(Default)]
pub struct EventFanout {
    listeners: Mutex<Vec<Listener>>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `callback` for `(owner, kind)`.
    ///
    /// Registering the same pair twice attaches a second listener; the
    /// callback then fires once per attachment for every matching event.
    pub fn register(&self, owner: Arc<str>, kind: EventKind, callback: EventCallback) {
        trace!(owner = %owner, kind = %kind, "register listener");
        self.listeners.lock().push(Listener {
            owner,
            kind,
            callback,
        });
    }

    /// Detach every listener belonging to `owner`. Other owners keep theirs.
    pub fn remove_owner(&self, owner: &str) {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| l.owner.as_ref() != owner);
        trace!(
            owner = %owner,
            removed = before - listeners.len(),
            "removed listeners"
        );
    }

    /// Invoke every listener registered for the event's kind, in
    /// registration order.
    pub fn dispatch(&self, event: &Event) {
        // clone callbacks out so one may re-register without deadlocking
        let kind = event.kind();
        let callbacks: Vec<EventCallback> = self
            .listeners
            .lock()
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.callback.clone())
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn owner_listener_count(&self, owner: &str) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|l| l.owner.as_ref() == owner)
            .count()
    }
}
