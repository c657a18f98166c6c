//! Authored provider manifests: a provider and its sources described in YAML.
//!
//! Type names are looked up in the [`TypeUniverse`]; objects are looked up in
//! a name → [`HostObject`] table supplied by the host. An unknown type name is
//! kept as a dangling reference so the source reports an error resolvability
//! instead of failing the whole load.
//!
//! # Example YAML
//!
//! ```yaml
//! name: core
//! priority: 10
//! sources:
//!   - type: ConsoleLogger
//!     tags: [debug]
//!   - object: clock_template
//!     kind: return_file
//!     extra_types: [Clock]
//! groups:
//!   - name: extras
//!     sources:
//!       - type: FileLogger
//!         enabled: false
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, Result};
use crate::groups::SourceGroup;
use crate::host::HostObject;
use crate::providers::Provider;
use crate::sources::{Origin, OriginKind, Source, TypeRef};
use crate::tags::Tag;
use crate::universe::TypeUniverse;

fn default_true() -> bool {
    true
}

/// One provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderManifest {
    pub name: String,
    /// Fixed priority. Omitted means highest-at-install.
    #[serde(default)]
    pub priority: Option<i32>,
    /// Owning scene. Omitted means global scope.
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub sources: Vec<SourceManifest>,
    #[serde(default)]
    pub groups: Vec<GroupManifest>,
}

/// One source. Exactly one of `type` or `object` must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceManifest {
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub kind: Option<OriginKind>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Capability type names, validated against the concrete type on read.
    #[serde(default)]
    pub extra_types: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A nested group, flattened in place after the enclosing entries before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupManifest {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<SourceManifest>,
    #[serde(default)]
    pub groups: Vec<GroupManifest>,
}

impl ProviderManifest {
    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Build the provider. Nothing is installed.
    pub fn build(&self, universe: &TypeUniverse, objects: &HashMap<String, HostObject>) -> Result<Provider> {
        let mut provider = match &self.scene {
            Some(scene) => Provider::scene(&self.name, scene),
            None => Provider::new(&self.name),
        };
        if let Some(priority) = self.priority {
            provider = provider.with_priority(priority);
        }
        provider.set_enabled(self.enabled);

        fill_group(
            provider.group(),
            &self.name,
            &self.sources,
            &self.groups,
            universe,
            objects,
        )?;
        log::debug!(
            "Built provider '{}' from manifest ({} source(s))",
            self.name,
            provider.sources(false).len()
        );
        Ok(provider)
    }
}

fn fill_group(
    group: &SourceGroup,
    provider: &str,
    sources: &[SourceManifest],
    groups: &[GroupManifest],
    universe: &TypeUniverse,
    objects: &HashMap<String, HostObject>,
) -> Result<()> {
    for (index, entry) in sources.iter().enumerate() {
        group.add_source(entry.build(provider, index, universe, objects)?);
    }
    for nested in groups {
        let child = Rc::new(SourceGroup::new(&nested.name));
        fill_group(&child, provider, &nested.sources, &nested.groups, universe, objects)?;
        group.add_nested(child)?;
    }
    Ok(())
}

impl SourceManifest {
    fn build(
        &self,
        provider: &str,
        index: usize,
        universe: &TypeUniverse,
        objects: &HashMap<String, HostObject>,
    ) -> std::result::Result<Source, ConfigError> {
        let origin = match (&self.type_name, &self.object) {
            (Some(name), None) => match universe.find_by_name(name) {
                Some(descriptor) => Origin::Type(TypeRef::Key(descriptor.key())),
                None => {
                    log::warn!("Manifest '{}' names unregistered type '{}'", provider, name);
                    Origin::Type(TypeRef::named(name.clone()))
                }
            },
            (None, Some(name)) => {
                let object = objects
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownObject(name.clone()))?;
                Origin::Object(object.clone())
            }
            _ => {
                return Err(ConfigError::AmbiguousOrigin {
                    provider: provider.to_string(),
                    index,
                })
            }
        };

        let source = Source::new(origin).with_tags(self.tags.iter().map(|t| Tag::text(t.clone())));
        if let Some(kind) = self.kind {
            source.set_preferred_kind(Some(kind));
        }
        for name in &self.extra_types {
            match universe.find_type_id_by_name(name) {
                Some(id) => source.add_extra_type(id),
                None => log::warn!("Manifest '{}' names unknown extra type '{}'", provider, name),
            }
        }
        source.set_enabled(self.enabled);
        Ok(source)
    }
}
