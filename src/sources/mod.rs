//! # Sources
//!
//! A [`Source`] describes one way to obtain an instance satisfying one or more
//! capability types. It holds an [`Origin`] (a host object or a type), derives
//! the [`Resolver`] for the matching [`OriginKind`], and caches the backing
//! object that resolver produced along with every capability facet extracted
//! from it.
//!
//! ## Origin kinds
//!
//! | Kind | Backing object | Resolvability |
//! |---|---|---|
//! | `CloneTemplate` | deep copy of a template asset | blocked outside runtime |
//! | `ReturnFile` | the asset itself | always resolved |
//! | `LiveInstance` | an object already running | always resolved while it exists |
//! | `ConstructType` | fresh default instance of a type | error if the type is unusable |

pub mod hooks;
pub mod resolver;
pub mod source;

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::graph::CapabilityGraph;
use crate::host::HostObject;
use crate::universe::{TypeDescriptor, TypeKey};

pub use hooks::Initialize;
pub use resolver::Resolver;
pub use source::{ExtraTypeStatus, Source};

/// How a source obtains its backing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    CloneTemplate,
    ReturnFile,
    LiveInstance,
    ConstructType,
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OriginKind::CloneTemplate => "clone-template",
            OriginKind::ReturnFile => "return-file",
            OriginKind::LiveInstance => "live-instance",
            OriginKind::ConstructType => "construct-type",
        };
        f.write_str(name)
    }
}

/// Reference to a registered type, either resolved or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Key(TypeKey),
    /// Looked up in the capability graph when needed; may be dangling.
    Named(String),
}

impl TypeRef {
    pub fn of<T: 'static>() -> Self {
        TypeRef::Key(TypeKey::of::<T>())
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn lookup<'g>(&self, graph: &'g CapabilityGraph) -> Option<&'g Rc<TypeDescriptor>> {
        match self {
            TypeRef::Key(key) => graph.descriptor(key),
            TypeRef::Named(name) => graph.descriptor_by_name(name),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Key(key) => write!(f, "{}", key),
            TypeRef::Named(name) => f.write_str(name),
        }
    }
}

/// Where a source's backing object comes from.
#[derive(Debug, Clone, Default)]
pub enum Origin {
    /// No reference set; the source reports an error resolvability.
    #[default]
    Missing,
    Object(HostObject),
    Type(TypeRef),
}

impl Origin {
    pub fn describe(&self) -> String {
        match self {
            Origin::Missing => "<missing>".to_string(),
            Origin::Object(object) => object.name().to_string(),
            Origin::Type(ty) => ty.to_string(),
        }
    }
}

/// Whether a source can produce an instance right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolvability {
    /// Can be instantiated on demand.
    Resolvable,
    /// Needs no construction; the backing object already exists.
    AlwaysResolved,
    /// Temporarily excluded (failing condition, host not running). Not an error.
    Blocked(String),
    /// Misconfigured (missing origin, unusable type). Excluded until fixed.
    Error(String),
    Disabled,
}

impl Resolvability {
    pub fn is_resolvable(&self) -> bool {
        matches!(self, Resolvability::Resolvable | Resolvability::AlwaysResolved)
    }
}

impl fmt::Display for Resolvability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolvability::Resolvable => f.write_str("resolvable"),
            Resolvability::AlwaysResolved => f.write_str("always resolved"),
            Resolvability::Blocked(reason) => write!(f, "blocked: {}", reason),
            Resolvability::Error(reason) => write!(f, "error: {}", reason),
            Resolvability::Disabled => f.write_str("disabled"),
        }
    }
}
