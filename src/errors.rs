//! Error types for the capability registry.
//!
//! Only [`RegistryError::Unresolved`] is visible to ordinary callers of the
//! resolve API, and only when the configured failure policy asks for it.
//! Configuration problems on individual sources never surface as errors during
//! resolution; they show up as a non-resolvable [`Resolvability`] instead.
//!
//! [`Resolvability`]: crate::sources::Resolvability

use thiserror::Error;

use crate::tags::Tag;

/// Result alias used throughout the crate.
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Errors raised by the registry API.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No installed source satisfies the requested capability and tags.
    #[error("No source can resolve capability {capability}{}", format_tags(.tags))]
    Unresolved {
        /// Display name of the requested capability type.
        capability: String,
        /// Tags that were requested alongside it.
        tags: Vec<Tag>,
    },

    /// Nesting `child` inside `parent` would make one reachable from the other twice.
    #[error("Circular group reference between '{parent}' and '{child}'")]
    CircularGroup { parent: String, child: String },

    /// A group cannot be nested inside itself.
    #[error("Group '{0}' cannot contain itself")]
    SelfReference(String),

    /// A host object model operation failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Loading configuration or a manifest failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn format_tags(tags: &[Tag]) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let names = tags
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(" with tags [{}]", names)
}

/// Failures reported by a [`HostObjectModel`](crate::host::HostObjectModel).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The template has no cloner, so it cannot be deep-copied.
    #[error("Object '{0}' cannot be cloned")]
    NotCloneable(String),

    /// The referenced object has been destroyed.
    #[error("Object '{0}' no longer exists")]
    Destroyed(String),

    /// The type has no default constructor.
    #[error("Type '{0}' cannot be constructed")]
    NotConstructible(String),

    /// The host refused the operation in its current state.
    #[error("Host rejected operation: {0}")]
    Rejected(String),
}

/// Errors loading a [`RegistryConfig`](crate::config::RegistryConfig) or a
/// [`ProviderManifest`](crate::config::ProviderManifest).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A manifest entry referenced an object that was not supplied.
    #[error("Unknown object '{0}' in manifest")]
    UnknownObject(String),

    /// A manifest source declared neither or both of `type` and `object`.
    #[error("Manifest source #{index} in '{provider}' must name exactly one of `type` or `object`")]
    AmbiguousOrigin { provider: String, index: usize },
}
