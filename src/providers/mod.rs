//! # Providers
//!
//! A [`Provider`] is a named, prioritized, installable collection of sources.
//! It owns one root [`SourceGroup`]; resolution walks that group flattened.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::groups::SourceGroup;
use crate::host::Scope;
use crate::sources::Source;

/// Where a provider's created objects are owned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderScope {
    Global,
    Scene(String),
}

/// How a provider's priority is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityMode {
    /// Authored value.
    Fixed(i32),
    /// One above every installed provider, assigned on install.
    HighestAtInstall,
}

impl Default for PriorityMode {
    fn default() -> Self {
        PriorityMode::HighestAtInstall
    }
}

pub struct Provider {
    id: Uuid,
    name: String,
    scope: ProviderScope,
    priority_mode: Cell<PriorityMode>,
    priority: Cell<i32>,
    enabled: Cell<bool>,
    group: Rc<SourceGroup>,
}

impl Provider {
    /// Global provider with an empty group and install-order priority.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let group = Rc::new(SourceGroup::new(name.clone()));
        Self::build(name, ProviderScope::Global, group)
    }

    /// Provider owned by a scene.
    pub fn scene(name: impl Into<String>, scene: impl Into<String>) -> Self {
        let name = name.into();
        let group = Rc::new(SourceGroup::new(name.clone()));
        Self::build(name, ProviderScope::Scene(scene.into()), group)
    }

    /// Install `group` as its own root-level provider.
    ///
    /// The group is marked standalone, so flattening any other group that
    /// nests it skips it.
    pub fn from_group(group: Rc<SourceGroup>) -> Self {
        group.set_standalone(true);
        Self::build(group.name().to_string(), ProviderScope::Global, group)
    }

    fn build(name: String, scope: ProviderScope, group: Rc<SourceGroup>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            scope,
            priority_mode: Cell::new(PriorityMode::HighestAtInstall),
            priority: Cell::new(0),
            enabled: Cell::new(true),
            group,
        }
    }

    /// Use a fixed authored priority.
    pub fn with_priority(self, priority: i32) -> Self {
        self.priority_mode.set(PriorityMode::Fixed(priority));
        self.priority.set(priority);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &ProviderScope {
        &self.scope
    }

    /// Effective priority. For `HighestAtInstall` this is only meaningful once installed.
    pub fn priority(&self) -> i32 {
        self.priority.get()
    }

    pub fn priority_mode(&self) -> PriorityMode {
        self.priority_mode.get()
    }

    pub(crate) fn assign_priority(&self, priority: i32) {
        self.priority.set(priority);
    }

    pub(crate) fn set_priority_mode(&self, mode: PriorityMode) {
        self.priority_mode.set(mode);
        if let PriorityMode::Fixed(value) = mode {
            self.priority.set(value);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn group(&self) -> &Rc<SourceGroup> {
        &self.group
    }

    pub fn add_source(&self, source: Source) -> Rc<Source> {
        self.group.add_source(source)
    }

    /// Flattened sources in declaration order.
    pub fn sources(&self, enabled_only: bool) -> Vec<Rc<Source>> {
        self.group.flatten(enabled_only)
    }

    /// Ownership scope newly created backing objects are attached under.
    pub fn attachment_scope(&self) -> Scope {
        Scope {
            owner: self.name.clone(),
            scene: match &self.scope {
                ProviderScope::Global => None,
                ProviderScope::Scene(scene) => Some(scene.clone()),
            },
        }
    }

    /// Drop every cached backing object in this provider.
    pub fn clear_caches(&self) {
        for source in self.sources(false) {
            source.clear_cache();
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("priority_mode", &self.priority_mode.get())
            .field("priority", &self.priority.get())
            .field("enabled", &self.enabled.get())
            .finish()
    }
}
