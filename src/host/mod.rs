//! # Host Object Model
//!
//! The registry never creates, copies or destroys host objects itself. It asks
//! the host through [`HostObjectModel`]:
//!
//! - clone this template ([`HostObjectModel::clone_template`]),
//! - does this live object still exist ([`HostObjectModel::exists`]),
//! - construct a default instance of this type ([`HostObjectModel::construct`]),
//! - attach this object under an ownership scope ([`HostObjectModel::attach`]).
//!
//! [`StandaloneHost`] implements the contract in-process for hosts without an
//! engine object model, and for tests.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::errors::HostError;
use crate::universe::{TypeDescriptor, TypeKey};

static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Where a host object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectPlacement {
    /// Stored asset (template or file), not part of the running environment.
    Asset,
    /// Exists in the running environment.
    Live,
}

/// Ownership context a newly created backing object is attached under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Name of the owning provider.
    pub owner: String,
    /// Scene the owner belongs to, `None` for global scope.
    pub scene: Option<String>,
}

type Cloner = Rc<dyn Fn(&dyn Any) -> Option<Rc<dyn Any>>>;

struct ObjectInner {
    id: ObjectId,
    name: String,
    type_key: TypeKey,
    placement: ObjectPlacement,
    value: Rc<dyn Any>,
    cloner: Option<Cloner>,
    alive: Cell<bool>,
    parent: RefCell<Option<Scope>>,
}

/// Shared handle to a host object.
#[derive(Clone)]
pub struct HostObject {
    inner: Rc<ObjectInner>,
}

impl HostObject {
    fn build<T: 'static>(
        name: impl Into<String>,
        value: T,
        placement: ObjectPlacement,
        cloner: Option<Cloner>,
    ) -> Self {
        Self::from_parts(
            name.into(),
            TypeKey::of::<T>(),
            placement,
            Rc::new(value),
            cloner,
        )
    }

    fn from_parts(
        name: String,
        type_key: TypeKey,
        placement: ObjectPlacement,
        value: Rc<dyn Any>,
        cloner: Option<Cloner>,
    ) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: ObjectId::next(),
                name,
                type_key,
                placement,
                value,
                cloner,
                alive: Cell::new(true),
                parent: RefCell::new(None),
            }),
        }
    }

    /// A stored asset that can be returned as-is but not cloned.
    pub fn asset<T: 'static>(name: impl Into<String>, value: T) -> Self {
        Self::build(name, value, ObjectPlacement::Asset, None)
    }

    /// A stored asset that can be deep-copied.
    pub fn template<T: Clone + 'static>(name: impl Into<String>, value: T) -> Self {
        let cloner: Cloner = Rc::new(|any: &dyn Any| {
            any.downcast_ref::<T>()
                .map(|typed| Rc::new(typed.clone()) as Rc<dyn Any>)
        });
        Self::build(name, value, ObjectPlacement::Asset, Some(cloner))
    }

    /// An object already present in the running environment.
    pub fn live<T: 'static>(name: impl Into<String>, value: T) -> Self {
        Self::build(name, value, ObjectPlacement::Live, None)
    }

    /// Wrap a type-erased value created by the host as a live object.
    pub fn spawned(name: impl Into<String>, type_key: TypeKey, value: Rc<dyn Any>) -> Self {
        Self::from_parts(name.into(), type_key, ObjectPlacement::Live, value, None)
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn type_key(&self) -> TypeKey {
        self.inner.type_key
    }

    pub fn placement(&self) -> ObjectPlacement {
        self.inner.placement
    }

    /// The erased value.
    pub fn value(&self) -> Rc<dyn Any> {
        Rc::clone(&self.inner.value)
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.value.downcast_ref::<T>()
    }

    pub fn is_cloneable(&self) -> bool {
        self.inner.cloner.is_some()
    }

    /// Deep-copy the value into a new live object named `"<name> (clone)"`.
    pub fn deep_copy(&self) -> Option<HostObject> {
        let cloner = self.inner.cloner.as_ref()?;
        let value = cloner(self.inner.value.as_ref())?;
        Some(Self::from_parts(
            format!("{} (clone)", self.inner.name),
            self.inner.type_key,
            ObjectPlacement::Live,
            value,
            self.inner.cloner.clone(),
        ))
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.get()
    }

    /// Mark the object destroyed. Handles stay valid but report not alive.
    pub fn destroy(&self) {
        self.inner.alive.set(false);
    }

    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent.borrow().clone()
    }

    pub fn set_parent(&self, scope: Option<Scope>) {
        *self.inner.parent.borrow_mut() = scope;
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("type", &self.inner.type_key)
            .field("placement", &self.inner.placement)
            .field("alive", &self.inner.alive.get())
            .finish()
    }
}

// ============================================================================
// HostObjectModel
// ============================================================================

/// The host operations the registry consumes.
pub trait HostObjectModel {
    /// Whether the host is running (live context). Cloning is blocked otherwise.
    fn is_runtime(&self) -> bool;

    /// Deep-copy a template into a new live object.
    fn clone_template(&self, template: &HostObject) -> Result<HostObject, HostError>;

    /// Whether `object` currently exists.
    fn exists(&self, object: &HostObject) -> bool;

    /// Build a default instance of a registered type.
    fn construct(&self, descriptor: &TypeDescriptor) -> Result<HostObject, HostError>;

    /// Attach a freshly created object under `scope`.
    fn attach(&self, object: &HostObject, scope: &Scope);
}

/// In-process host: objects are plain Rust values, attachment is recorded
/// until the attached object is destroyed.
#[derive(Debug)]
pub struct StandaloneHost {
    runtime: Cell<bool>,
    attachments: RefCell<Vec<(HostObject, Scope)>>,
    created: Cell<usize>,
}

impl Default for StandaloneHost {
    fn default() -> Self {
        Self::new()
    }
}

impl StandaloneHost {
    /// A host in its running state.
    pub fn new() -> Self {
        Self {
            runtime: Cell::new(true),
            attachments: RefCell::new(Vec::new()),
            created: Cell::new(0),
        }
    }

    /// A host in authoring (non-running) state.
    pub fn authoring() -> Self {
        let host = Self::new();
        host.runtime.set(false);
        host
    }

    pub fn set_runtime(&self, running: bool) {
        self.runtime.set(running);
    }

    /// Live objects attached under `scope`, in attachment order.
    pub fn attached_to(&self, scope: &Scope) -> Vec<ObjectId> {
        self.prune();
        self.attachments
            .borrow()
            .iter()
            .filter(|(_, s)| s == scope)
            .map(|(object, _)| object.id())
            .collect()
    }

    /// Number of recorded attachments, destroyed objects excluded.
    pub fn attachment_count(&self) -> usize {
        self.prune();
        self.attachments.borrow().len()
    }

    fn prune(&self) {
        self.attachments
            .borrow_mut()
            .retain(|(object, _)| object.is_alive());
    }

    /// Number of objects this host has cloned or constructed.
    pub fn created_count(&self) -> usize {
        self.created.get()
    }
}

impl HostObjectModel for StandaloneHost {
    fn is_runtime(&self) -> bool {
        self.runtime.get()
    }

    fn clone_template(&self, template: &HostObject) -> Result<HostObject, HostError> {
        if !self.is_runtime() {
            return Err(HostError::Rejected(format!(
                "cannot clone '{}' outside runtime",
                template.name()
            )));
        }
        if !template.is_alive() {
            return Err(HostError::Destroyed(template.name().to_string()));
        }
        let copy = template
            .deep_copy()
            .ok_or_else(|| HostError::NotCloneable(template.name().to_string()))?;
        self.created.set(self.created.get() + 1);
        Ok(copy)
    }

    fn exists(&self, object: &HostObject) -> bool {
        object.is_alive()
    }

    fn construct(&self, descriptor: &TypeDescriptor) -> Result<HostObject, HostError> {
        let value = descriptor
            .construct()
            .ok_or_else(|| HostError::NotConstructible(descriptor.name().to_string()))?;
        self.created.set(self.created.get() + 1);
        Ok(HostObject::spawned(descriptor.name(), descriptor.key(), value))
    }

    fn attach(&self, object: &HostObject, scope: &Scope) {
        object.set_parent(Some(scope.clone()));
        self.prune();
        self.attachments
            .borrow_mut()
            .push((object.clone(), scope.clone()));
    }
}
