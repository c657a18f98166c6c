//! The source descriptor and its resolve algorithm.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use crate::conditions::{first_failure, Condition};
use crate::environment::Environment;
use crate::events::RegistryEvent;
use crate::graph::CapabilityGraph;
use crate::host::HostObject;
use crate::providers::Provider;
use crate::tags::{contains_all, Tag, TagContributor};
use crate::universe::{facet_as, CapabilityId, Facet, TypeKey};

use super::hooks::Initialize;
use super::resolver::{Resolver, ResolverCell};
use super::{Origin, OriginKind, Resolvability, TypeRef};

/// Validation result for a manually declared extra capability type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraTypeStatus {
    /// The concrete type can be viewed as it.
    Valid,
    /// Not reachable from the concrete type; shown but never resolvable.
    Dangling,
}

/// One producible origin of capability instances.
pub struct Source {
    id: Uuid,
    enabled: Cell<bool>,
    origin: RefCell<Origin>,
    preferred_kind: Cell<Option<OriginKind>>,
    extra_types: RefCell<Vec<CapabilityId>>,
    tags: RefCell<Vec<Tag>>,
    conditions: RefCell<Vec<Rc<dyn Condition>>>,
    /// Built lazily from the origin; dropped (with its cache) when the origin changes.
    resolver: RefCell<Option<Rc<ResolverCell>>>,
}

impl Source {
    pub fn new(origin: Origin) -> Self {
        Self {
            id: Uuid::new_v4(),
            enabled: Cell::new(true),
            origin: RefCell::new(origin),
            preferred_kind: Cell::new(None),
            extra_types: RefCell::new(Vec::new()),
            tags: RefCell::new(Vec::new()),
            conditions: RefCell::new(Vec::new()),
            resolver: RefCell::new(None),
        }
    }

    /// Source backed by a host object (template, file or live instance).
    pub fn from_object(object: HostObject) -> Self {
        Self::new(Origin::Object(object))
    }

    /// Source constructing a fresh `T`.
    pub fn from_type<T: 'static>() -> Self {
        Self::new(Origin::Type(TypeRef::of::<T>()))
    }

    /// Source constructing the type registered under `name`.
    pub fn from_type_name(name: impl Into<String>) -> Self {
        Self::new(Origin::Type(TypeRef::named(name)))
    }

    // ------------------------------------------------------------------------
    // Builder-style setup
    // ------------------------------------------------------------------------

    pub fn with_kind(self, kind: OriginKind) -> Self {
        self.preferred_kind.set(Some(kind));
        self
    }

    pub fn with_tag(self, tag: impl Into<Tag>) -> Self {
        self.add_tag(tag);
        self
    }

    pub fn with_tags<I, T>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        for tag in tags {
            self.add_tag(tag);
        }
        self
    }

    pub fn with_condition(self, condition: Rc<dyn Condition>) -> Self {
        self.add_condition(condition);
        self
    }

    pub fn with_extra_type<C: ?Sized + 'static>(self) -> Self {
        self.add_extra_type(CapabilityId::of::<C>());
        self
    }

    pub fn disabled(self) -> Self {
        self.enabled.set(false);
        self
    }

    // ------------------------------------------------------------------------
    // Accessors and mutation
    // ------------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Short description of the origin for logs and diagnostics.
    pub fn label(&self) -> String {
        self.origin.borrow().describe()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn origin(&self) -> Origin {
        self.origin.borrow().clone()
    }

    /// Swap the origin. Drops the resolver and everything it cached.
    pub fn set_origin(&self, origin: Origin) {
        *self.origin.borrow_mut() = origin;
        self.invalidate_resolver();
    }

    pub fn preferred_kind(&self) -> Option<OriginKind> {
        self.preferred_kind.get()
    }

    /// Change the preferred kind. Drops the resolver and everything it cached.
    pub fn set_preferred_kind(&self, kind: Option<OriginKind>) {
        if self.preferred_kind.replace(kind) != kind {
            self.invalidate_resolver();
        }
    }

    /// Origin kind actually in use, `None` when the origin is missing.
    pub fn actual_kind(&self) -> Option<OriginKind> {
        self.resolver_cell().map(|cell| cell.resolver().kind())
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.tags.borrow().clone()
    }

    pub fn add_tag(&self, tag: impl Into<Tag>) {
        let tag = tag.into();
        let mut tags = self.tags.borrow_mut();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    pub fn remove_tag(&self, tag: &Tag) -> bool {
        let mut tags = self.tags.borrow_mut();
        let before = tags.len();
        tags.retain(|t| t != tag);
        tags.len() < before
    }

    pub fn add_condition(&self, condition: Rc<dyn Condition>) {
        self.conditions.borrow_mut().push(condition);
    }

    pub fn clear_conditions(&self) {
        self.conditions.borrow_mut().clear();
    }

    pub fn extra_types(&self) -> Vec<CapabilityId> {
        self.extra_types.borrow().clone()
    }

    pub fn add_extra_type(&self, capability: CapabilityId) {
        let mut extra = self.extra_types.borrow_mut();
        if !extra.contains(&capability) {
            extra.push(capability);
        }
    }

    pub fn remove_extra_type(&self, capability: &CapabilityId) -> bool {
        let mut extra = self.extra_types.borrow_mut();
        let before = extra.len();
        extra.retain(|id| id != capability);
        extra.len() < before
    }

    /// The backing object, if one has been obtained this epoch.
    pub fn backing_object(&self) -> Option<HostObject> {
        self.resolver
            .borrow()
            .as_ref()
            .and_then(|cell| cell.backing())
    }

    pub fn is_instantiated(&self) -> bool {
        self.backing_object().is_some()
    }

    /// Drop the backing object and every memoized facet. Enabled flag, origin
    /// and tags are untouched.
    pub fn clear_cache(&self) {
        if let Some(cell) = self.resolver.borrow().as_ref() {
            cell.clear();
        }
    }

    fn invalidate_resolver(&self) {
        *self.resolver.borrow_mut() = None;
    }

    fn resolver_cell(&self) -> Option<Rc<ResolverCell>> {
        if let Some(cell) = self.resolver.borrow().as_ref() {
            return Some(Rc::clone(cell));
        }
        let resolver = Resolver::for_origin(&self.origin.borrow(), self.preferred_kind.get())?;
        let cell = Rc::new(ResolverCell::new(resolver));
        *self.resolver.borrow_mut() = Some(Rc::clone(&cell));
        Some(cell)
    }

    // ------------------------------------------------------------------------
    // Capability types
    // ------------------------------------------------------------------------

    /// Concrete type of the backing object for the current origin kind.
    pub fn concrete_type(&self, graph: &CapabilityGraph) -> Option<TypeKey> {
        self.resolver_cell()?.resolver().concrete_type(graph)
    }

    /// Capability types from the graph plus every valid extra type.
    pub fn capability_types(&self, graph: &CapabilityGraph) -> Vec<CapabilityId> {
        let Some(key) = self.concrete_type(graph) else {
            return Vec::new();
        };
        let mut types = graph.capabilities_of(&key).to_vec();
        let possible = graph.possible_additional_types(&key);
        for extra in self.extra_types.borrow().iter() {
            if possible.contains(extra) && !types.contains(extra) {
                types.push(*extra);
            }
        }
        types
    }

    pub fn satisfies(&self, capability: &CapabilityId, graph: &CapabilityGraph) -> bool {
        self.capability_types(graph).contains(capability)
    }

    /// Each declared extra type with its validation status.
    pub fn extra_type_report(&self, graph: &CapabilityGraph) -> Vec<(CapabilityId, ExtraTypeStatus)> {
        let possible = self
            .concrete_type(graph)
            .map(|key| graph.possible_additional_types(&key))
            .unwrap_or_default();
        self.extra_types
            .borrow()
            .iter()
            .map(|id| {
                let status = if possible.contains(id) {
                    ExtraTypeStatus::Valid
                } else {
                    ExtraTypeStatus::Dangling
                };
                (*id, status)
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Resolvability, tags and resolution
    // ------------------------------------------------------------------------

    /// Current status: origin checks first, then every condition.
    pub fn resolvability(&self, env: &Environment) -> Resolvability {
        if !self.enabled.get() {
            return Resolvability::Disabled;
        }
        let Some(cell) = self.resolver_cell() else {
            return Resolvability::Error("missing origin reference".to_string());
        };
        let graph = env.graph();
        let status = cell.resolver().resolvability(env.host(), &graph);
        if !status.is_resolvable() {
            return status;
        }
        match first_failure(&self.active_conditions(&cell, &graph)) {
            Some(reason) => Resolvability::Blocked(reason),
            None => status,
        }
    }

    /// Attached conditions plus any found on the origin or backing object.
    fn active_conditions(&self, cell: &ResolverCell, graph: &CapabilityGraph) -> Vec<Rc<dyn Condition>> {
        let mut conditions = self.conditions.borrow().clone();
        let condition_id = CapabilityId::of::<dyn Condition>();
        for object in inspected_objects(cell) {
            if let Some(condition) = graph
                .facet(&object, &condition_id)
                .and_then(|facet| facet_as::<dyn Condition>(&facet))
            {
                conditions.push(condition);
            }
        }
        conditions
    }

    /// Authored tags plus tags contributed by the backing object (or, before
    /// one exists, by the origin object).
    pub fn available_tags(&self, env: &Environment) -> Vec<Tag> {
        let mut tags = self.tags();
        let Some(cell) = self.resolver_cell() else {
            return tags;
        };
        let target = cell
            .backing()
            .or_else(|| cell.resolver().origin_object().cloned());
        if let Some(object) = target {
            let graph = env.graph();
            if let Some(contributor) = graph
                .facet(&object, &CapabilityId::of::<dyn TagContributor>())
                .and_then(|facet| facet_as::<dyn TagContributor>(&facet))
            {
                for tag in contributor.tags() {
                    if !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
            }
        }
        tags
    }

    /// Produce the `capability` facet of this source's backing object.
    ///
    /// 1. Disabled or non-resolvable sources fail without side effects.
    /// 2. A constructed type that gates or tags itself is built first, so its
    ///    own conditions and tags are checked before it can be selected.
    /// 3. Requested tags must all be present.
    /// 4. The backing object is obtained once, attached under the provider's
    ///    scope and cached. It is initialized the first time it is selected.
    /// 5. The facet is extracted once per capability type and memoized.
    pub fn resolve(
        &self,
        capability: &CapabilityId,
        provider: &Provider,
        tags: &[Tag],
        env: &Environment,
    ) -> Option<Facet> {
        let graph = env.graph();
        if !self.satisfies(capability, &graph) {
            return None;
        }

        let status = self.resolvability(env);
        if !status.is_resolvable() {
            log::trace!("Skipping source '{}': {}", self.label(), status);
            return None;
        }

        let cell = self.resolver_cell()?;
        let early = if self_describing(&cell, &graph) {
            let backing = self.obtain_backing(&cell, provider, &graph, env)?;
            if let Some(reason) = first_failure(&self.active_conditions(&cell, &graph)) {
                log::trace!("Skipping source '{}': {}", self.label(), Resolvability::Blocked(reason));
                return None;
            }
            Some(backing)
        } else {
            None
        };

        if !tags.is_empty() && !contains_all(&self.available_tags(env), tags) {
            return None;
        }

        let backing = match early {
            Some(backing) => backing,
            None => self.obtain_backing(&cell, provider, &graph, env)?,
        };
        if cell.mark_initialized() {
            run_initializer(&backing, &graph, env);
        }

        cell.facet(capability, &backing, &graph)
    }

    /// Whether this source's own conditions or tags are unknown until its
    /// backing object is constructed.
    pub(crate) fn awaits_instance(&self, env: &Environment) -> bool {
        self.resolver_cell()
            .is_some_and(|cell| cell.backing().is_none() && self_describing(&cell, &env.graph()))
    }

    /// The cached backing object, or a fresh one when there is none or the
    /// cached one was destroyed.
    fn obtain_backing(
        &self,
        cell: &ResolverCell,
        provider: &Provider,
        graph: &CapabilityGraph,
        env: &Environment,
    ) -> Option<HostObject> {
        let stale = match cell.backing() {
            Some(existing) if env.host().exists(&existing) => return Some(existing),
            stale => stale,
        };
        if stale.is_some() {
            log::debug!(
                "Backing object of source '{}' no longer exists; obtaining a new one",
                self.label()
            );
            cell.clear();
        }
        let object = match cell
            .resolver()
            .instantiate(env.host(), graph, &provider.attachment_scope())
        {
            Ok(object) => object,
            Err(e) => {
                log::warn!("Source '{}' failed to produce an object: {}", self.label(), e);
                return None;
            }
        };
        cell.set_backing(object.clone());
        log::debug!(
            "Source '{}' in provider '{}' produced {} ({})",
            self.label(),
            provider.name(),
            object.id(),
            cell.resolver().kind()
        );
        env.events().emit(RegistryEvent::BackingObjectCreated {
            provider: provider.name().to_string(),
            source: self.id,
            object: object.id(),
        });
        Some(object)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("origin", &self.label())
            .field("enabled", &self.enabled.get())
            .field("preferred_kind", &self.preferred_kind.get())
            .field("tags", &self.tags.borrow())
            .field("extra_types", &self.extra_types.borrow())
            .field("instantiated", &self.is_instantiated())
            .finish()
    }
}

fn inspected_objects(cell: &ResolverCell) -> Vec<HostObject> {
    let mut objects: Vec<HostObject> = cell.resolver().origin_object().cloned().into_iter().collect();
    if let Some(backing) = cell.backing() {
        if !objects.iter().any(|o| o.ptr_eq(&backing)) {
            objects.push(backing);
        }
    }
    objects
}

/// A constructed type whose conditions or contributed tags only exist once
/// an instance does.
fn self_describing(cell: &ResolverCell, graph: &CapabilityGraph) -> bool {
    if cell.resolver().origin_object().is_some() {
        return false;
    }
    let Some(descriptor) = cell
        .resolver()
        .concrete_type(graph)
        .and_then(|key| graph.descriptor(&key))
    else {
        return false;
    };
    descriptor.can_cast_to(&CapabilityId::of::<dyn Condition>())
        || descriptor.can_cast_to(&CapabilityId::of::<dyn TagContributor>())
}

fn run_initializer(object: &HostObject, graph: &CapabilityGraph, env: &Environment) {
    if let Some(init) = graph
        .facet(object, &CapabilityId::of::<dyn Initialize>())
        .and_then(|facet| facet_as::<dyn Initialize>(&facet))
    {
        init.initialize(env);
    }
}
