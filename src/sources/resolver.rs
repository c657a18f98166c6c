//! Resolvers: one closed variant per origin kind, plus the per-source cache of
//! the backing object and its extracted facets.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::errors::HostError;
use crate::graph::CapabilityGraph;
use crate::host::{HostObject, HostObjectModel, ObjectPlacement, Scope};
use crate::universe::{CapabilityId, Facet, TypeKey};

use super::{Origin, OriginKind, Resolvability, TypeRef};

/// How to obtain a backing object, and whether that is possible right now.
#[derive(Debug, Clone)]
pub enum Resolver {
    CloneTemplate { template: HostObject },
    ReturnFile { file: HostObject },
    LiveInstance { instance: HostObject },
    ConstructType { ty: TypeRef },
}

impl Resolver {
    /// Pick the resolver for `origin`, honouring `preferred` where the origin allows it.
    ///
    /// A live object can only be returned as-is. An asset is cloned unless
    /// `ReturnFile` (use it directly) or `ConstructType` (build a fresh
    /// instance of its type) is preferred. A type origin is always constructed.
    pub fn for_origin(origin: &Origin, preferred: Option<OriginKind>) -> Option<Self> {
        match origin {
            Origin::Missing => None,
            Origin::Type(ty) => Some(Resolver::ConstructType { ty: ty.clone() }),
            Origin::Object(object) => Some(match object.placement() {
                ObjectPlacement::Live => Resolver::LiveInstance {
                    instance: object.clone(),
                },
                ObjectPlacement::Asset => match preferred {
                    Some(OriginKind::ReturnFile) => Resolver::ReturnFile {
                        file: object.clone(),
                    },
                    Some(OriginKind::ConstructType) => Resolver::ConstructType {
                        ty: TypeRef::Key(object.type_key()),
                    },
                    _ => Resolver::CloneTemplate {
                        template: object.clone(),
                    },
                },
            }),
        }
    }

    pub fn kind(&self) -> OriginKind {
        match self {
            Resolver::CloneTemplate { .. } => OriginKind::CloneTemplate,
            Resolver::ReturnFile { .. } => OriginKind::ReturnFile,
            Resolver::LiveInstance { .. } => OriginKind::LiveInstance,
            Resolver::ConstructType { .. } => OriginKind::ConstructType,
        }
    }

    /// The object the origin points at, if the origin is an object.
    pub fn origin_object(&self) -> Option<&HostObject> {
        match self {
            Resolver::CloneTemplate { template } => Some(template),
            Resolver::ReturnFile { file } => Some(file),
            Resolver::LiveInstance { instance } => Some(instance),
            Resolver::ConstructType { .. } => None,
        }
    }

    /// Concrete type of the backing object this resolver produces.
    pub fn concrete_type(&self, graph: &CapabilityGraph) -> Option<TypeKey> {
        match self {
            Resolver::ConstructType { ty } => match ty {
                TypeRef::Key(key) => Some(*key),
                TypeRef::Named(_) => ty.lookup(graph).map(|descriptor| descriptor.key()),
            },
            other => other.origin_object().map(HostObject::type_key),
        }
    }

    pub fn resolvability(&self, host: &dyn HostObjectModel, graph: &CapabilityGraph) -> Resolvability {
        match self {
            Resolver::CloneTemplate { template } => {
                if !template.is_alive() {
                    Resolvability::Error(format!("template '{}' was destroyed", template.name()))
                } else if !template.is_cloneable() {
                    Resolvability::Error(format!("template '{}' cannot be cloned", template.name()))
                } else if !host.is_runtime() {
                    Resolvability::Blocked("cloning requires a running host".to_string())
                } else {
                    Resolvability::Resolvable
                }
            }
            Resolver::ReturnFile { file } => {
                if file.is_alive() {
                    Resolvability::AlwaysResolved
                } else {
                    Resolvability::Error(format!("file '{}' was destroyed", file.name()))
                }
            }
            Resolver::LiveInstance { instance } => {
                if host.exists(instance) {
                    Resolvability::AlwaysResolved
                } else {
                    Resolvability::Error(format!("instance '{}' no longer exists", instance.name()))
                }
            }
            Resolver::ConstructType { ty } => match ty.lookup(graph) {
                None => Resolvability::Error(format!("type '{}' is not registered", ty)),
                Some(descriptor) if !descriptor.is_concrete() => {
                    Resolvability::Error(format!("type '{}' is not concrete", ty))
                }
                Some(descriptor) if !descriptor.is_constructible() => {
                    Resolvability::Error(format!("type '{}' has no default constructor", ty))
                }
                Some(_) => Resolvability::Resolvable,
            },
        }
    }

    /// Obtain the backing object, attaching newly created ones under `scope`.
    pub fn instantiate(
        &self,
        host: &dyn HostObjectModel,
        graph: &CapabilityGraph,
        scope: &Scope,
    ) -> Result<HostObject, HostError> {
        match self {
            Resolver::CloneTemplate { template } => {
                let copy = host.clone_template(template)?;
                host.attach(&copy, scope);
                Ok(copy)
            }
            Resolver::ReturnFile { file } => Ok(file.clone()),
            Resolver::LiveInstance { instance } => {
                if host.exists(instance) {
                    Ok(instance.clone())
                } else {
                    Err(HostError::Destroyed(instance.name().to_string()))
                }
            }
            Resolver::ConstructType { ty } => {
                let descriptor = ty
                    .lookup(graph)
                    .ok_or_else(|| HostError::NotConstructible(ty.to_string()))?;
                let object = host.construct(descriptor)?;
                host.attach(&object, scope);
                Ok(object)
            }
        }
    }
}

// ============================================================================
// ResolverCell
// ============================================================================

#[derive(Default)]
struct ResolverCache {
    backing: Option<HostObject>,
    initialized: bool,
    facets: HashMap<CapabilityId, Facet>,
}

/// A resolver together with what it has produced this epoch.
pub(crate) struct ResolverCell {
    resolver: Resolver,
    cache: RefCell<ResolverCache>,
}

impl ResolverCell {
    pub(crate) fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            cache: RefCell::new(ResolverCache::default()),
        }
    }

    pub(crate) fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub(crate) fn backing(&self) -> Option<HostObject> {
        self.cache.borrow().backing.clone()
    }

    pub(crate) fn set_backing(&self, object: HostObject) {
        let mut cache = self.cache.borrow_mut();
        cache.backing = Some(object);
        cache.initialized = false;
        cache.facets.clear();
    }

    /// True exactly once per backing object: the first time it is selected.
    pub(crate) fn mark_initialized(&self) -> bool {
        let mut cache = self.cache.borrow_mut();
        if cache.backing.is_none() || cache.initialized {
            return false;
        }
        cache.initialized = true;
        true
    }

    /// Memoized facet of `backing` for `capability`.
    pub(crate) fn facet(
        &self,
        capability: &CapabilityId,
        backing: &HostObject,
        graph: &CapabilityGraph,
    ) -> Option<Facet> {
        if let Some(facet) = self.cache.borrow().facets.get(capability) {
            return Some(facet.clone());
        }
        let facet = graph.facet(backing, capability)?;
        self.cache
            .borrow_mut()
            .facets
            .insert(*capability, facet.clone());
        Some(facet)
    }

    pub(crate) fn facet_count(&self) -> usize {
        self.cache.borrow().facets.len()
    }

    pub(crate) fn clear(&self) {
        let mut cache = self.cache.borrow_mut();
        cache.backing = None;
        cache.initialized = false;
        cache.facets.clear();
    }
}
