//! Tags: typed metadata attached to sources for filtered lookup.
//!
//! A lookup request carries a list of tags; a source matches when every
//! requested tag is present among the source's authored tags plus any tags
//! its backing object contributes through [`TagContributor`]. Unrequested tags
//! on the source never disqualify it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host::{HostObject, ObjectId};

/// The value carried by a [`Tag`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagValue {
    /// Plain string tag, compared case-sensitively.
    Text(String),
    /// Reference to a host object, compared by object identity.
    Object(ObjectId),
    /// Arbitrary structured value.
    Value(Value),
}

/// A typed piece of metadata with an optional display name.
///
/// Equality only considers the value; the display name is presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub value: TagValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Tag {
    /// A string tag.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            value: TagValue::Text(text.into()),
            display_name: None,
        }
    }

    /// A tag referring to a host object. Displays as the object's name.
    pub fn object(object: &HostObject) -> Self {
        Self {
            value: TagValue::Object(object.id()),
            display_name: Some(object.name().to_string()),
        }
    }

    /// A tag holding an arbitrary value.
    pub fn value(value: Value) -> Self {
        Self {
            value: TagValue::Value(value),
            display_name: None,
        }
    }

    /// Override the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name shown in diagnostics.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.display_name {
            return name.clone();
        }
        match &self.value {
            TagValue::Text(text) => text.clone(),
            TagValue::Object(id) => id.to_string(),
            TagValue::Value(value) => value.to_string(),
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

impl From<&str> for Tag {
    fn from(text: &str) -> Self {
        Tag::text(text)
    }
}

impl From<String> for Tag {
    fn from(text: String) -> Self {
        Tag::text(text)
    }
}

/// Implemented by objects that contribute tags dynamically.
///
/// Discovered on a source's backing object (or its origin object before the
/// backing object exists) through the same facet lookup used for capabilities.
pub trait TagContributor {
    fn tags(&self) -> Vec<Tag>;
}

/// Subset containment: every requested tag must appear in `available`.
pub fn contains_all(available: &[Tag], requested: &[Tag]) -> bool {
    requested
        .iter()
        .all(|wanted| available.iter().any(|tag| tag == wanted))
}
