//! The volume manager custom resource.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::meta::{GroupVersionKind, ObjectMeta};
use crate::state::State;

/// API group of the volume manager resource.
pub const GROUP_NAME: &str = "vck.intelai.org";
/// API version of the volume manager resource.
pub const VERSION: &str = "v1";
/// Kind of the volume manager resource.
pub const VOLUME_MANAGER_KIND: &str = "VolumeManager";
/// Plural form used as the resource path segment.
pub const VOLUME_MANAGER_PLURAL: &str = "volumemanagers";
/// Message a data handler reports on a successfully provisioned volume.
pub const SUCCESSFUL_VOLUME_STATUS_MESSAGE: &str = "success";

/// Capabilities the reconciler needs from a user-declared resource.
///
/// The status is written only by the controller (the reconcile loop or the
/// hook path); the spec state is written only by users.
pub trait CustomResource: Clone + fmt::Debug + Send + Sync + 'static {
    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Desired state declared by the user.
    fn spec_state(&self) -> State;

    /// Observed state last written by the controller. `None` until the
    /// first status write.
    fn status_state(&self) -> Option<State>;

    /// Overwrite the observed state and its human-readable message.
    fn set_status(&mut self, state: State, message: String);

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn namespace(&self) -> &str {
        &self.metadata().namespace
    }
}

/// Kind of external data a volume is populated from (e.g. `S3`, `NFS`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSourceType(pub String);

impl DataSourceType {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }
}

impl fmt::Display for DataSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration required for one volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeConfig {
    pub id: String,
    pub replicas: u32,
    pub source_type: Option<DataSourceType>,
    #[serde(rename = "endpointURL")]
    pub endpoint_url: String,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    pub access_mode: String,
    pub capacity: String,
    pub labels: BTreeMap<String, String>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeManagerSpec {
    #[serde(default)]
    pub volume_configs: Vec<VolumeConfig>,
    pub state: State,
}

/// Outcome of provisioning one volume, as reported by its data handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeClaimStatus {
    pub id: String,
    /// Opaque volume source handed to consumers of the volume.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub volume_source: serde_json::Value,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl VolumeClaimStatus {
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.message == SUCCESSFUL_VOLUME_STATUS_MESSAGE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeManagerStatus {
    pub volumes: Vec<VolumeClaimStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// A request to provision a set of data volumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeManager {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: VolumeManagerSpec,
    #[serde(default)]
    pub status: VolumeManagerStatus,
}

impl VolumeManager {
    /// Create a volume manager with the given desired state and no status.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, state: State) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: VolumeManagerSpec {
                volume_configs: Vec::new(),
                state,
            },
            status: VolumeManagerStatus::default(),
        }
    }

    /// Identity of the volume manager type.
    #[must_use]
    pub fn gvk() -> GroupVersionKind {
        GroupVersionKind::new(GROUP_NAME, VERSION, VOLUME_MANAGER_KIND)
    }

    /// Set the observed state.
    #[must_use]
    pub fn with_status(mut self, state: State) -> Self {
        self.status.state = Some(state);
        self
    }

    /// Append a volume config.
    #[must_use]
    pub fn with_volume(mut self, config: VolumeConfig) -> Self {
        self.spec.volume_configs.push(config);
        self
    }
}

impl CustomResource for VolumeManager {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec_state(&self) -> State {
        self.spec.state
    }

    fn status_state(&self) -> Option<State> {
        self.status.state
    }

    fn set_status(&mut self, state: State, message: String) {
        self.status.state = Some(state);
        self.status.message = message;
    }
}
