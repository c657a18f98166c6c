//! # Capability Graph
//!
//! Bidirectional map between capability types and the concrete types that
//! satisfy them, built once from a [`TypeUniverse`].
//!
//! The build visits every capability declaration against every concrete type
//! and records an edge whenever the type can be viewed as the capability.
//! Abstract and generic types are skipped. A missing match is an empty set,
//! never an error.
//!
//! The graph also snapshots the universe's descriptors so that facet lookups
//! made during resolution see the same types the graph was built from, even if
//! more types are registered afterwards.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use crate::host::HostObject;
use crate::universe::{CapabilityId, Facet, TypeDescriptor, TypeKey, TypeUniverse};

/// The built graph.
#[derive(Debug, Default)]
pub struct CapabilityGraph {
    /// Concrete type -> capability types it satisfies, in declaration order.
    by_type: HashMap<TypeKey, Vec<CapabilityId>>,

    /// Capability type -> concrete types satisfying it, in registration order.
    by_capability: HashMap<CapabilityId, Vec<TypeKey>>,

    /// Descriptor snapshot keyed by `TypeId`.
    descriptors: HashMap<TypeId, Rc<TypeDescriptor>>,

    /// Registered name -> `TypeId`.
    names: HashMap<String, TypeId>,
}

impl CapabilityGraph {
    /// Scan the universe and compute both directions.
    pub fn build(universe: &TypeUniverse) -> Self {
        let mut graph = Self::default();

        for decl in universe.capabilities() {
            graph.by_capability.entry(decl.id).or_default();
        }

        for descriptor in universe.types() {
            let key = descriptor.key();
            graph
                .descriptors
                .insert(key.type_id(), Rc::clone(descriptor));
            graph
                .names
                .insert(descriptor.name().to_string(), key.type_id());

            if !descriptor.is_concrete() {
                continue;
            }

            let satisfied: Vec<CapabilityId> = universe
                .capabilities()
                .iter()
                .map(|decl| decl.id)
                .filter(|id| descriptor.can_cast_to(id))
                .collect();

            for capability in &satisfied {
                graph
                    .by_capability
                    .entry(*capability)
                    .or_default()
                    .push(key);
            }
            graph.by_type.insert(key, satisfied);
        }

        log::debug!(
            "Built capability graph: {} capability types, {} concrete types",
            graph.by_capability.len(),
            graph.by_type.len()
        );
        graph
    }

    /// Capability types `key` satisfies. Empty for unknown or non-concrete types.
    pub fn capabilities_of(&self, key: &TypeKey) -> &[CapabilityId] {
        self.by_type.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Concrete types satisfying `capability`.
    pub fn implementors_of(&self, capability: &CapabilityId) -> &[TypeKey] {
        self.by_capability
            .get(capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn satisfies(&self, key: &TypeKey, capability: &CapabilityId) -> bool {
        self.capabilities_of(key).contains(capability)
    }

    pub fn is_capability(&self, capability: &CapabilityId) -> bool {
        self.by_capability.contains_key(capability)
    }

    pub fn descriptor(&self, key: &TypeKey) -> Option<&Rc<TypeDescriptor>> {
        self.descriptors.get(&key.type_id())
    }

    pub fn descriptor_by_name(&self, name: &str) -> Option<&Rc<TypeDescriptor>> {
        self.names
            .get(name)
            .and_then(|type_id| self.descriptors.get(type_id))
    }

    /// Every type `key` can be viewed as, marked as a capability or not.
    pub fn possible_additional_types(&self, key: &TypeKey) -> Vec<CapabilityId> {
        self.descriptor(key)
            .map(|descriptor| descriptor.possible_additional_types())
            .unwrap_or_default()
    }

    /// View `value` (an object of type `key`) as `capability`.
    pub fn cast(&self, key: &TypeKey, value: &Rc<dyn Any>, capability: &CapabilityId) -> Option<Facet> {
        self.descriptor(key)?.cast(value, capability)
    }

    /// The "does this object implement X" test used for capabilities,
    /// conditions, tag contributors and initializers alike.
    pub fn facet(&self, object: &HostObject, capability: &CapabilityId) -> Option<Facet> {
        self.cast(&object.type_key(), &object.value(), capability)
    }

    pub fn capability_count(&self) -> usize {
        self.by_capability.len()
    }

    pub fn type_count(&self) -> usize {
        self.by_type.len()
    }
}
