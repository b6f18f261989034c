//! Platform object metadata as read by the controller.
//!
//! Only the fields the reconciler and hooks actually consult are modeled.
//! An [`OwnerReference`] is a lookup record naming the controlling custom
//! resource; the platform, not this process, owns the object's lifetime.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label set used both on objects and as an equality selector.
pub type Labels = BTreeMap<String, String>;

/// Identity of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Create a group/version/kind triple.
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// The `apiVersion` string: `group/version`, or bare `version` for the
    /// core group.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Whether an owner reference points at an object of this type.
    #[must_use]
    pub fn matches(&self, owner: &OwnerReference) -> bool {
        owner.api_version == self.api_version() && owner.kind == self.kind
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.group, self.version, self.kind)
    }
}

/// Back-reference from a sub-resource to the object controlling it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
}

impl OwnerReference {
    /// Build the controller reference a creation hook stamps on the
    /// sub-resources it provisions for `owner`.
    #[must_use]
    pub fn controller_for(owner: &ObjectMeta, gvk: &GroupVersionKind) -> Self {
        Self {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            name: owner.name.clone(),
            uid: owner.uid.clone(),
            controller: Some(true),
        }
    }

    #[must_use]
    pub fn is_controller(&self) -> bool {
        self.controller.unwrap_or(false)
    }
}

/// Object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Create metadata for a named, namespaced object.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// The owner reference flagged as controller, if any.
    #[must_use]
    pub fn controller_ref(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.is_controller())
    }

    /// A deletion timestamp has been set.
    #[must_use]
    pub const fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Whether every selector pair is present on this object.
    #[must_use]
    pub fn matches_labels(&self, selector: &Labels) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|have| have == v))
    }
}

/// A sub-resource of any kind: typed metadata plus the untyped remainder of
/// the object body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicObject {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

impl DynamicObject {
    /// Create an object with the given identity and an empty body.
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        metadata: ObjectMeta,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata,
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Replace the body.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Add an owner reference.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.metadata.owner_references.push(owner);
        self
    }

    /// Look up a body field by JSON pointer, e.g. `/status/phase`.
    #[must_use]
    pub fn field(&self, pointer: &str) -> Option<&serde_json::Value> {
        self.data.pointer(pointer)
    }

    /// Look up a string body field by JSON pointer.
    #[must_use]
    pub fn str_field(&self, pointer: &str) -> Option<&str> {
        self.field(pointer).and_then(serde_json::Value::as_str)
    }
}
