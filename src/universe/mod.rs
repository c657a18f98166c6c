//! # Type Universe
//!
//! The set of types the registry knows about. Rust has no runtime scan of
//! loaded types, so hosts register them explicitly before the capability graph
//! is built:
//!
//! ```rust
//! use std::rc::Rc;
//! use capreg::universe::TypeUniverse;
//!
//! trait Logger { fn log(&self, line: &str); }
//!
//! #[derive(Default)]
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger { fn log(&self, _line: &str) {} }
//!
//! let mut universe = TypeUniverse::new();
//! universe.capability::<dyn Logger>();
//! universe
//!     .concrete::<ConsoleLogger>("ConsoleLogger")
//!     .implements::<dyn Logger>(|c| c as Rc<dyn Logger>)
//!     .constructor(ConsoleLogger::default)
//!     .register();
//! ```
//!
//! ## Identities
//!
//! - [`CapabilityId`]: a requested type, usually `dyn Trait`.
//! - [`TypeKey`]: a registered concrete (or abstract) type.
//! - [`Facet`]: one object viewed as one capability type. The facet is an
//!   `Rc<dyn Any>` wrapping an `Rc<C>`, so it can be memoized type-erased and
//!   recovered with [`facet_as`].

pub mod descriptor;
pub mod registry;

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::rc::Rc;

pub use descriptor::{TypeBuilder, TypeDescriptor, TypeKind};
pub use registry::{CapabilityDecl, CapabilityMarker, TypeUniverse};

/// One object viewed as one capability type (an erased `Rc<C>`).
pub type Facet = Rc<dyn Any>;

/// Recover the typed view from a [`Facet`].
pub fn facet_as<C: ?Sized + 'static>(facet: &Facet) -> Option<Rc<C>> {
    facet.downcast_ref::<Rc<C>>().cloned()
}

/// Shorten `a::b::dyn Logger` style names to `Logger`; generic names are kept whole.
fn short_name(full: &'static str) -> &'static str {
    let trimmed = full.trim_start_matches("dyn ");
    if trimmed.contains('<') {
        return full;
    }
    trimmed.rsplit("::").next().unwrap_or(trimmed)
}

// ============================================================================
// CapabilityId
// ============================================================================

/// Identity of a capability type a caller can request.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityId {
    type_id: TypeId,
    name: &'static str,
}

impl CapabilityId {
    /// Identity of `C`, typically `dyn SomeTrait` or a concrete type.
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: short_name(type_name::<C>()),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Short display name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityId({})", self.name)
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// TypeKey
// ============================================================================

/// Identity of a registered type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    type_id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: short_name(type_name::<T>()),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The same type viewed as a capability id (every type can be requested as itself).
    pub fn as_capability(&self) -> CapabilityId {
        CapabilityId {
            type_id: self.type_id,
            name: self.name,
        }
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
