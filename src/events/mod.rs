//! Registry change notifications.
//!
//! The environment publishes an event whenever the installed-provider set or
//! its ordering changes, a backing object is created, or caches are cleared.
//! Inspection tooling subscribes through [`EventBus`].

pub mod event_bus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::host::ObjectId;

pub use event_bus::{EventBus, EventHandler, SubscriptionId};

/// What changed in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    ProviderInstalled { provider: String, priority: i32 },
    ProviderUninstalled { provider: String },
    /// Provider names in resolution order after a priority change.
    PrioritiesChanged { order: Vec<String> },
    BackingObjectCreated {
        provider: String,
        source: Uuid,
        object: ObjectId,
    },
    CachesCleared,
}

impl RegistryEvent {
    /// Event type discriminator string (e.g. `"provider_installed"`).
    pub fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::ProviderInstalled { .. } => "provider_installed",
            RegistryEvent::ProviderUninstalled { .. } => "provider_uninstalled",
            RegistryEvent::PrioritiesChanged { .. } => "priorities_changed",
            RegistryEvent::BackingObjectCreated { .. } => "backing_object_created",
            RegistryEvent::CachesCleared => "caches_cleared",
        }
    }
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub event_id: Uuid,
    /// Monotonic per-bus emission counter, starting at 1.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: RegistryEvent,
}
