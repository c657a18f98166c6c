//! Type descriptors: what a registered type can be viewed as and how to build one.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::registry::TypeUniverse;
use super::{CapabilityId, Facet, TypeKey};

type Caster = Rc<dyn Fn(&Rc<dyn Any>) -> Option<Facet>>;
type Constructor = Rc<dyn Fn() -> Rc<dyn Any>>;

/// Classification used by the graph builder; only `Concrete` types get edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    #[default]
    Concrete,
    Abstract,
    Generic,
}

/// A registered type.
///
/// Holds one caster per type the object can be viewed as (its own type, every
/// trait it was declared to implement) and an optional default constructor.
#[derive(Clone)]
pub struct TypeDescriptor {
    key: TypeKey,
    name: String,
    kind: TypeKind,
    casters: Vec<(CapabilityId, Caster)>,
    constructor: Option<Constructor>,
}

impl TypeDescriptor {
    /// A descriptor for `T` that can only be viewed as itself.
    pub fn new<T: 'static>(name: impl Into<String>) -> Self {
        let own: Caster = Rc::new(|object: &Rc<dyn Any>| {
            object
                .clone()
                .downcast::<T>()
                .ok()
                .map(|typed| Rc::new(typed) as Facet)
        });
        Self {
            key: TypeKey::of::<T>(),
            name: name.into(),
            kind: TypeKind::Concrete,
            casters: vec![(CapabilityId::of::<T>(), own)],
            constructor: None,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Registered name, used by manifests and diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_concrete(&self) -> bool {
        self.kind == TypeKind::Concrete
    }

    pub fn is_constructible(&self) -> bool {
        self.is_concrete() && self.constructor.is_some()
    }

    /// Whether an object of this type can be viewed as `capability`.
    pub fn can_cast_to(&self, capability: &CapabilityId) -> bool {
        self.casters.iter().any(|(id, _)| id == capability)
    }

    /// Every type this one can be viewed as, including itself, in declaration order.
    pub fn possible_additional_types(&self) -> Vec<CapabilityId> {
        self.casters.iter().map(|(id, _)| *id).collect()
    }

    /// View `object` as `capability`. `None` when the object is not of this
    /// type or the type does not implement the capability.
    pub fn cast(&self, object: &Rc<dyn Any>, capability: &CapabilityId) -> Option<Facet> {
        self.casters
            .iter()
            .find(|(id, _)| id == capability)
            .and_then(|(_, caster)| caster(object))
    }

    /// Build a fresh default instance.
    pub fn construct(&self) -> Option<Rc<dyn Any>> {
        if !self.is_concrete() {
            return None;
        }
        self.constructor.as_ref().map(|ctor| ctor())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("casts_to", &self.possible_additional_types())
            .field("constructible", &self.constructor.is_some())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent registration of one type, returned by [`TypeUniverse::concrete`].
pub struct TypeBuilder<'u, T> {
    universe: &'u mut TypeUniverse,
    descriptor: TypeDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<'u, T: 'static> TypeBuilder<'u, T> {
    pub(crate) fn new(universe: &'u mut TypeUniverse, name: String) -> Self {
        Self {
            universe,
            descriptor: TypeDescriptor::new::<T>(name),
            _marker: PhantomData,
        }
    }

    /// Declare that `T` can be viewed as `C`. `cast` is normally `|t| t as Rc<dyn C>`.
    pub fn implements<C: ?Sized + 'static>(mut self, cast: fn(Rc<T>) -> Rc<C>) -> Self {
        let capability = CapabilityId::of::<C>();
        if self.descriptor.can_cast_to(&capability) {
            return self;
        }
        let caster: Caster = Rc::new(move |object: &Rc<dyn Any>| {
            object
                .clone()
                .downcast::<T>()
                .ok()
                .map(|typed| Rc::new(cast(typed)) as Facet)
        });
        self.descriptor.casters.push((capability, caster));
        self
    }

    /// Default constructor used by construct-from-type sources.
    pub fn constructor(mut self, ctor: impl Fn() -> T + 'static) -> Self {
        self.descriptor.constructor = Some(Rc::new(move || Rc::new(ctor()) as Rc<dyn Any>));
        self
    }

    pub fn kind(mut self, kind: TypeKind) -> Self {
        self.descriptor.kind = kind;
        self
    }

    /// Add the descriptor to the universe, replacing any earlier registration of `T`.
    pub fn register(self) -> TypeKey {
        self.universe.insert(self.descriptor)
    }
}
