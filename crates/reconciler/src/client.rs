//! Capability traits for the two kinds of collaborator the engine drives.
//!
//! Neither trait knows anything about the decision table; the grouper,
//! planner and executor stay kind-agnostic by going through these alone.

use std::sync::Arc;

use async_trait::async_trait;
use vck_core::{DynamicObject, Labels, State};

/// Store for the declared custom resource, addressed by namespace and name.
#[async_trait]
pub trait CustomResourceStore<R>: Send + Sync {
    /// Fetch one resource. Absence is reported as `Error::NotFound`.
    async fn get(&self, namespace: &str, name: &str) -> vck_core::Result<R>;

    async fn list(&self, namespace: &str, selector: &Labels) -> vck_core::Result<Vec<R>>;

    /// Version-checked write. A stale resource version yields
    /// `Error::Conflict`.
    async fn update(&self, resource: &R) -> vck_core::Result<R>;

    async fn delete(&self, namespace: &str, name: &str) -> vck_core::Result<()>;
}

/// One registered sub-resource kind.
#[async_trait]
pub trait SubresourceClient<R>: Send + Sync {
    /// Render and create the sub-resource, using the owning resource as
    /// template input.
    async fn create(&self, namespace: &str, template: &R) -> vck_core::Result<()>;

    async fn delete(&self, namespace: &str, name: &str) -> vck_core::Result<()>;

    async fn get(&self, namespace: &str, name: &str) -> vck_core::Result<DynamicObject>;

    async fn list(&self, namespace: &str, selector: &Labels) -> vck_core::Result<Vec<DynamicObject>>;

    /// Whether the named object is in a broken state. Lookup failures count
    /// as not failed.
    async fn is_failed(&self, namespace: &str, name: &str) -> bool {
        self.get(namespace, name)
            .await
            .is_ok_and(|object| self.status_state(&object) == State::Failed)
    }

    /// Ephemeral kinds can be destroyed and recreated without losing state.
    fn is_ephemeral(&self) -> bool;

    /// Plural resource name; also the per-owner grouping key.
    fn plural(&self) -> &str;

    /// Status derived from an existing object of this kind.
    fn status_state(&self, object: &DynamicObject) -> State;
}

/// Shared handle to a store.
pub type SharedStore<R> = Arc<dyn CustomResourceStore<R>>;

/// Shared handle to a sub-resource client.
pub type SharedClient<R> = Arc<dyn SubresourceClient<R>>;
