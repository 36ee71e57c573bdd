//! In-process event bus.
//!
//! Maps event names to ordered listener lists. `emit` runs listeners
//! synchronously in registration order; a listener that returns an error or
//! panics is logged and skipped, the remaining listeners still run.

use crate::event::{ClientEvent, EventKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace, warn};

/// Result returned by listeners.
pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Listener = Arc<dyn Fn(&ClientEvent) -> ListenerResult + Send + Sync>;

/// Handle identifying one registration, used to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener registry keyed by event name.
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
    emit_count: AtomicU64,
    failure_count: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            emit_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    /// Register a listener. The same closure may be registered any number of times.
    pub fn on<F>(&self, event: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ClientEvent) -> ListenerResult + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(event)
            .or_default()
            .push((id, Arc::new(listener)));
        trace!(event = %event, ?id, "Listener registered");
        id
    }

    /// Remove one registration. Returns false if it was not registered.
    pub fn off(&self, event: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(&event);
        }
        removed
    }

    /// Remove every listener for one event.
    pub fn clear(&self, event: EventKind) {
        self.listeners.write().remove(&event);
    }

    /// Remove every listener.
    pub fn clear_all(&self) {
        self.listeners.write().clear();
    }

    /// Number of listeners registered for an event.
    pub fn listener_count(&self, event: EventKind) -> usize {
        self.listeners.read().get(&event).map_or(0, Vec::len)
    }

    /// Deliver an event to its listeners.
    ///
    /// Returns the number of listeners that completed without error.
    pub fn emit(&self, event: &ClientEvent) -> usize {
        self.emit_count.fetch_add(1, Ordering::Relaxed);
        let kind = event.kind();

        // Snapshot so listeners can call on/off without deadlocking.
        let snapshot: Vec<(ListenerId, Listener)> = match self.listeners.read().get(&kind) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    self.failure_count.fetch_add(1, Ordering::Relaxed);
                    warn!(event = %kind, ?id, error = %e, "Listener returned error");
                }
                Err(panic) => {
                    self.failure_count.fetch_add(1, Ordering::Relaxed);
                    error!(
                        event = %kind,
                        ?id,
                        panic = panic_message(panic.as_ref()),
                        "Listener panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Total events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }

    /// Total listener invocations that failed (error or panic).
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
