//! Synchronous, single-context event bus for registry change notification.
//!
//! Handlers run inline on `emit`, in subscription order. Emission iterates a
//! snapshot of the handler list, so a handler may subscribe, unsubscribe or
//! trigger further emissions without disturbing the current dispatch.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use uuid::Uuid;

use super::{EmittedEvent, RegistryEvent};

/// A registered event handler.
pub type EventHandler = Rc<dyn Fn(&EmittedEvent)>;

static SUBSCRIPTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies a subscription for later removal.
#[derive(Clone)]
pub struct SubscriptionId {
    /// Human-readable name.
    pub name: String,
    id: u64,
}

impl SubscriptionId {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: SUBSCRIPTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({}:{})", self.id, self.name)
    }
}

impl PartialEq for SubscriptionId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for SubscriptionId {}

impl std::hash::Hash for SubscriptionId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Clone)]
struct HandlerEntry {
    id: SubscriptionId,
    handler: EventHandler,
}

/// Publishes [`RegistryEvent`]s to subscribers. The registry never depends on
/// a subscriber being present.
#[derive(Default)]
pub struct EventBus {
    handlers: RefCell<Vec<HandlerEntry>>,
    sequence: Cell<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every registry event.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&EmittedEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId::new(name);
        self.handlers.borrow_mut().push(HandlerEntry {
            id: id.clone(),
            handler: Rc::new(handler),
        });
        id
    }

    /// Remove a handler. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|entry| entry.id != *id);
        handlers.len() < before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Sequence number of the last emitted event, 0 before the first one.
    pub fn last_sequence(&self) -> u64 {
        self.sequence.get()
    }

    /// Stamp `event` and dispatch it to every current subscriber.
    pub fn emit(&self, event: RegistryEvent) -> EmittedEvent {
        let sequence = self.sequence.get() + 1;
        self.sequence.set(sequence);
        let emitted = EmittedEvent {
            event_id: Uuid::new_v4(),
            sequence,
            timestamp: Utc::now(),
            event,
        };

        let snapshot: Vec<HandlerEntry> = self.handlers.borrow().clone();
        log::trace!(
            "[EventBus] {} -> {} handler(s)",
            emitted.event.event_type(),
            snapshot.len()
        );
        for entry in snapshot {
            (entry.handler)(&emitted);
        }
        emitted
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .field("sequence", &self.sequence.get())
            .finish()
    }
}
