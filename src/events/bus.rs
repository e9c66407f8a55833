//! Kind-keyed publish/subscribe for recognition events.
//!
//! Handlers are invoked synchronously on the task that publishes, in the
//! order they were registered for that kind. The registry lock is never held
//! while a handler runs: `publish` takes a snapshot of the handler list first,
//! so handlers may register or unregister (themselves included) and the change
//! takes effect from the next publish.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

use super::types::{EventKind, RecognitionEvent};

pub type EventHandler = Arc<dyn Fn(&RecognitionEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Registry {
    handlers: HashMap<EventKind, Vec<(HandlerId, EventHandler)>>,
    next_id: u64,
}

#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&RecognitionEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = HandlerId(registry.next_id);
        registry.next_id += 1;
        registry
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; returns false if it was not registered
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut registry = self.registry.lock();
        for handlers in registry.handlers.values_mut() {
            if let Some(pos) = handlers.iter().position(|(hid, _)| *hid == id) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver an event to every handler registered for its kind
    pub fn publish(&self, event: &RecognitionEvent) {
        let snapshot: Vec<EventHandler> = {
            let registry = self.registry.lock();
            match registry.handlers.get(&event.kind()) {
                Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Event handler for {:?} panicked", event.kind());
            }
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry
            .lock()
            .handlers
            .get(&kind)
            .map_or(0, |handlers| handlers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> RecognitionEvent {
        RecognitionEvent::SessionStarted {
            session_id: "s".to_string(),
        }
    }

    #[test]
    fn test_event_bus_creation() {
        let bus = EventBus::new();
        assert_eq!(bus.handler_count(EventKind::Recognized), 0);
    }

    #[test]
    fn test_unsubscribe_unknown_id() {
        let bus = EventBus::new();
        let id = bus.subscribe(EventKind::SessionStarted, |_| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_panicking_handler_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0));
        bus.subscribe(EventKind::SessionStarted, |_| panic!("boom"));
        let h = Arc::clone(&hits);
        bus.subscribe(EventKind::SessionStarted, move |_| *h.lock() += 1);

        bus.publish(&started());
        assert_eq!(*hits.lock(), 1);
    }
}
