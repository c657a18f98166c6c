//! Registry configuration and authored provider manifests.
//!
//! # Example YAML
//!
//! ```yaml
//! on_missing: error
//! log_resolutions: true
//! ```

pub mod manifest;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub use manifest::{GroupManifest, ProviderManifest, SourceManifest};

/// What `get` does when no source can resolve a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCapabilityPolicy {
    /// Return nothing.
    Silent,
    /// Return nothing and log a warning.
    #[default]
    Warn,
    /// Return [`RegistryError::Unresolved`](crate::errors::RegistryError::Unresolved).
    Error,
}

/// Global registry settings. Read once per failed resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub on_missing: MissingCapabilityPolicy,

    /// Log every successful resolution at debug level.
    #[serde(default)]
    pub log_resolutions: bool,
}

impl RegistryConfig {
    pub fn with_policy(policy: MissingCapabilityPolicy) -> Self {
        Self {
            on_missing: policy,
            ..Self::default()
        }
    }

    /// Parse from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse from a YAML file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}
