//! The type universe: every capability type and every registered type.

use std::any::TypeId;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::descriptor::{TypeBuilder, TypeDescriptor};
use super::{CapabilityId, TypeKey};

/// How a type became a capability type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityMarker {
    /// Opted in directly.
    Explicit,
    /// Reached through a typed provider that serves it.
    Implicit,
}

/// A capability type known to the universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityDecl {
    pub id: CapabilityId,
    pub marker: CapabilityMarker,
}

/// Registration table standing in for a scan of all loaded types.
#[derive(Debug, Default)]
pub struct TypeUniverse {
    /// Capability types, in declaration order.
    capabilities: Vec<CapabilityDecl>,

    /// Registered types keyed by `TypeId`.
    types: HashMap<TypeId, Rc<TypeDescriptor>>,

    /// Registration order of `types`.
    order: Vec<TypeId>,

    /// Registered name -> `TypeId`.
    by_name: HashMap<String, TypeId>,
}

impl TypeUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `C` as a capability type.
    pub fn capability<C: ?Sized + 'static>(&mut self) -> CapabilityId {
        self.declare(CapabilityId::of::<C>(), CapabilityMarker::Explicit)
    }

    /// Mark `C` as a capability type served by a typed provider.
    ///
    /// An explicit declaration of the same type takes precedence.
    pub fn typed_capability<C: ?Sized + 'static>(&mut self) -> CapabilityId {
        self.declare(CapabilityId::of::<C>(), CapabilityMarker::Implicit)
    }

    fn declare(&mut self, id: CapabilityId, marker: CapabilityMarker) -> CapabilityId {
        match self.capabilities.iter_mut().find(|decl| decl.id == id) {
            Some(existing) => {
                if marker == CapabilityMarker::Explicit {
                    existing.marker = CapabilityMarker::Explicit;
                }
            }
            None => self.capabilities.push(CapabilityDecl { id, marker }),
        }
        id
    }

    /// Start registering `T` under `name`.
    pub fn concrete<T: 'static>(&mut self, name: impl Into<String>) -> TypeBuilder<'_, T> {
        TypeBuilder::new(self, name.into())
    }

    /// Register a prepared descriptor.
    pub fn insert(&mut self, descriptor: TypeDescriptor) -> TypeKey {
        let key = descriptor.key();
        let type_id = key.type_id();
        if let Some(previous) = self.types.get(&type_id) {
            log::debug!("Re-registering type {} (was '{}')", key, previous.name());
            self.by_name.remove(previous.name());
        } else {
            self.order.push(type_id);
        }
        self.by_name.insert(descriptor.name().to_string(), type_id);
        self.types.insert(type_id, Rc::new(descriptor));
        key
    }

    pub fn descriptor(&self, key: &TypeKey) -> Option<Rc<TypeDescriptor>> {
        self.types.get(&key.type_id()).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Rc<TypeDescriptor>> {
        self.by_name
            .get(name)
            .and_then(|type_id| self.types.get(type_id))
            .cloned()
    }

    /// All registered types in registration order.
    pub fn types(&self) -> impl Iterator<Item = &Rc<TypeDescriptor>> {
        self.order.iter().filter_map(|type_id| self.types.get(type_id))
    }

    pub fn capabilities(&self) -> &[CapabilityDecl] {
        &self.capabilities
    }

    pub fn is_capability(&self, id: &CapabilityId) -> bool {
        self.capabilities.iter().any(|decl| decl.id == *id)
    }

    /// Find any type known to the universe by short name: capability types
    /// first, then every type some registered type can be viewed as.
    pub fn find_type_id_by_name(&self, name: &str) -> Option<CapabilityId> {
        if let Some(decl) = self.capabilities.iter().find(|decl| decl.id.name() == name) {
            return Some(decl.id);
        }
        self.types()
            .flat_map(|descriptor| descriptor.possible_additional_types())
            .find(|id| id.name() == name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
