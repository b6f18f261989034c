//! Core vocabulary for the volume manager controller.
//!
//! Everything the reconciliation engine and the hook path agree on lives
//! here: the lifecycle and status state spaces, the slice of platform object
//! metadata the engine reads, and the `VolumeManager` custom resource itself.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod meta;
pub mod resource;
pub mod state;

pub use error::{Error, Result};
pub use meta::{DynamicObject, GroupVersionKind, Labels, ObjectMeta, OwnerReference};
pub use resource::{
    CustomResource, DataSourceType, SUCCESSFUL_VOLUME_STATUS_MESSAGE, VOLUME_MANAGER_PLURAL,
    VolumeClaimStatus, VolumeConfig, VolumeManager, VolumeManagerSpec, VolumeManagerStatus,
};
pub use state::{Lifecycle, State};
