//! Change-notification infrastructure.
//!
//! The store and tracker publish [`WorkbenchEvent`]s through an [`EventBus`];
//! the editor-facing layer is the only expected consumer, which keeps tree
//! refresh and badge logic out of the core.

use serde::Serialize;

/// Events emitted as the store and tracker mutate.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkbenchEvent {
    /// The set of locally modified files changed.
    ModificationsChanged {
        /// Number of files currently pending.
        pending: usize,
    },
    /// Tree structure changed (load, unload, create, rename, delete).
    TreeChanged {
        /// Unit whose subtree changed, when known.
        #[serde(rename = "unitKey")]
        unit_key: Option<String>,
    },
    /// A container/workspace unit finished loading.
    UnitLoaded { key: String },
    /// A unit was removed from the tree.
    UnitUnloaded { key: String },
    /// A push pass finished.
    PushCompleted { succeeded: usize, failed: usize },
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Subscription handle that unsubscribes automatically when dropped.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Publishes [`WorkbenchEvent`]s to subscribers. Wrap in `Arc` to enable
/// subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Arc<dyn Fn(WorkbenchEvent) + Send + Sync>)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. The returned handle unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(WorkbenchEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write so a Drop during panic unwinding cannot deadlock against
        // a read lock held by emit.
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: WorkbenchEvent) {
        // Snapshot the callback list so a callback may subscribe without
        // deadlocking.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}
