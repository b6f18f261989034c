//! Edge-triggered hook path.
//!
//! A watch layer outside this crate delivers add/update/delete notifications
//! through [`Hooks`]. The volume manager implementation provisions volumes
//! through pluggable [`DataHandler`]s and writes status through the same
//! [`StatusWriter`] the reconcile loop uses.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use vck_core::{
    CustomResource, DataSourceType, OwnerReference, State, VolumeClaimStatus, VolumeConfig,
    VolumeManager,
};

use crate::error::{Error, Result};
use crate::status::StatusWriter;

/// Callbacks for change notifications on one custom resource type.
#[async_trait]
pub trait Hooks<R>: Send + Sync {
    /// A resource was created.
    async fn on_add(&self, resource: &R) -> Result<()>;

    /// A resource changed.
    async fn on_update(&self, old: &R, new: &R) -> Result<()>;

    /// A resource was removed.
    async fn on_delete(&self, resource: &R) -> Result<()>;
}

/// Provisions volumes of one data source type.
///
/// Handlers render and create the sub-resources for a volume; everything they
/// create must carry `controller_ref` so the reconcile loop can find it.
#[async_trait]
pub trait DataHandler: Send + Sync {
    fn source_type(&self) -> DataSourceType;

    /// Provision one volume. The returned claim's message is
    /// [`vck_core::SUCCESSFUL_VOLUME_STATUS_MESSAGE`] on success and the
    /// failure reason otherwise.
    async fn on_add(
        &self,
        namespace: &str,
        config: &VolumeConfig,
        controller_ref: &OwnerReference,
    ) -> VolumeClaimStatus;

    /// Tear down one volume.
    async fn on_delete(&self, namespace: &str, config: &VolumeConfig, controller_ref: &OwnerReference);
}

/// Shared handle to a data handler.
pub type SharedHandler = Arc<dyn DataHandler>;

/// [`Hooks`] for volume managers.
pub struct VolumeManagerHooks {
    status: Arc<StatusWriter<VolumeManager>>,
    handlers: Vec<SharedHandler>,
}

impl VolumeManagerHooks {
    pub fn new(status: Arc<StatusWriter<VolumeManager>>, handlers: Vec<SharedHandler>) -> Self {
        Self { status, handlers }
    }

    /// Every (handler, config) pair whose source types agree.
    fn matching<'a>(
        &'a self,
        vm: &'a VolumeManager,
    ) -> impl Iterator<Item = (&'a SharedHandler, &'a VolumeConfig)> + 'a {
        self.handlers.iter().flat_map(move |handler| {
            let source = handler.source_type();
            vm.spec
                .volume_configs
                .iter()
                .filter(move |config| config.source_type.as_ref() == Some(&source))
                .map(move |config| (handler, config))
        })
    }

    async fn delete_volumes(&self, vm: &VolumeManager) {
        let controller_ref = OwnerReference::controller_for(&vm.metadata, &VolumeManager::gvk());
        for (handler, config) in self.matching(vm) {
            debug!(name = vm.name(), volume = %config.id, "Deleting volume");
            handler.on_delete(vm.namespace(), config, &controller_ref).await;
        }
    }

    async fn write(&self, vm: &VolumeManager, state: State, message: &str) -> Result<VolumeManager> {
        self.status
            .write(vm, state, message)
            .await
            .map_err(|e| {
                warn!(name = vm.name(), state = %state, error = %e, "Failed to update status");
                Error::status_update(vm.name(), e)
            })
    }
}

#[async_trait]
impl Hooks<VolumeManager> for VolumeManagerHooks {
    async fn on_add(&self, vm: &VolumeManager) -> Result<()> {
        debug!(namespace = vm.namespace(), name = vm.name(), "Volume manager added");

        if vm.spec.state == State::Failed {
            let message = format!(
                "Added with desired state as failed and controller marked volume manager as {}",
                State::Failed
            );
            self.write(vm, State::Failed, &message).await?;
            return Ok(());
        }

        let pending = self
            .write(vm, State::Pending, "Beginning sub-resource deployment")
            .await?;

        let controller_ref = OwnerReference::controller_for(&pending.metadata, &VolumeManager::gvk());
        let mut claims = Vec::new();
        for (handler, config) in self.matching(&pending) {
            claims.push(handler.on_add(pending.namespace(), config, &controller_ref).await);
        }

        let (state, message) = if claims.iter().all(VolumeClaimStatus::is_successful) {
            (State::Running, "successfully deployed all sub-resources")
        } else {
            (State::Failed, "failed to deploy all the sub-resources")
        };
        info!(name = pending.name(), volumes = claims.len(), state = %state, "Provisioned volumes");

        self.status
            .write_with(&pending, move |vm| {
                vm.status.volumes = claims;
                vm.set_status(state, message.to_string());
            })
            .await
            .map_err(|e| Error::status_update(pending.name(), e))?;
        Ok(())
    }

    async fn on_update(&self, old: &VolumeManager, new: &VolumeManager) -> Result<()> {
        debug!(
            name = new.name(),
            old_state = ?old.status_state(),
            new_state = ?new.status_state(),
            "Volume manager updated"
        );
        if new.status_state() == Some(State::Failed) {
            self.delete_volumes(new).await;
        }
        Ok(())
    }

    async fn on_delete(&self, vm: &VolumeManager) -> Result<()> {
        debug!(namespace = vm.namespace(), name = vm.name(), "Volume manager deleted");
        self.delete_volumes(vm).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use tokio::sync::Mutex;
    use vck_core::SUCCESSFUL_VOLUME_STATUS_MESSAGE;

    use super::*;
    use crate::memory::InMemoryStore;

    struct RecordingHandler {
        source: &'static str,
        failure: Option<&'static str>,
        added: Mutex<Vec<(String, OwnerReference)>>,
        deleted: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn new(source: &'static str) -> Arc<Self> {
            Arc::new(Self {
                source,
                failure: None,
                added: Mutex::new(Vec::new()),
                deleted: Mutex::new(Vec::new()),
            })
        }

        fn failing(source: &'static str, reason: &'static str) -> Arc<Self> {
            Arc::new(Self {
                source,
                failure: Some(reason),
                added: Mutex::new(Vec::new()),
                deleted: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DataHandler for RecordingHandler {
        fn source_type(&self) -> DataSourceType {
            DataSourceType::new(self.source)
        }

        async fn on_add(
            &self,
            _namespace: &str,
            config: &VolumeConfig,
            controller_ref: &OwnerReference,
        ) -> VolumeClaimStatus {
            self.added
                .lock()
                .await
                .push((config.id.clone(), controller_ref.clone()));
            VolumeClaimStatus {
                id: config.id.clone(),
                message: self
                    .failure
                    .unwrap_or(SUCCESSFUL_VOLUME_STATUS_MESSAGE)
                    .to_string(),
                ..VolumeClaimStatus::default()
            }
        }

        async fn on_delete(&self, _namespace: &str, config: &VolumeConfig, _controller_ref: &OwnerReference) {
            self.deleted.lock().await.push(config.id.clone());
        }
    }

    fn volume(id: &str, source: &str) -> VolumeConfig {
        VolumeConfig {
            id: id.into(),
            replicas: 1,
            source_type: Some(DataSourceType::new(source)),
            ..VolumeConfig::default()
        }
    }

    async fn setup(
        handlers: Vec<Arc<RecordingHandler>>,
        vm: VolumeManager,
    ) -> (VolumeManagerHooks, Arc<InMemoryStore<VolumeManager>>, VolumeManager) {
        let store = Arc::new(InMemoryStore::volume_managers());
        let vm = store.insert(vm).await;
        let writer = StatusWriter::<VolumeManager>::new_arc(store.clone());
        let handlers = handlers.into_iter().map(|h| h as SharedHandler).collect();
        (VolumeManagerHooks::new(writer, handlers), store, vm)
    }

    #[tokio::test]
    async fn test_add_provisions_matching_volumes() {
        let s3 = RecordingHandler::new("S3");
        let nfs = RecordingHandler::new("NFS");
        let vm = VolumeManager::new("default", "vol1", State::Running)
            .with_volume(volume("a", "S3"))
            .with_volume(volume("b", "NFS"))
            .with_volume(volume("c", "S3"));
        let (hooks, store, vm) = setup(vec![s3.clone(), nfs.clone()], vm).await;

        hooks.on_add(&vm).await.unwrap();

        let stored = store.snapshot("default", "vol1").await.unwrap();
        assert_eq!(stored.status.state, Some(State::Running));
        assert_eq!(stored.status.volumes.len(), 3);
        let s3_ids: Vec<String> = s3.added.lock().await.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(s3_ids, vec!["a", "c"]);
        assert_eq!(nfs.added.lock().await.len(), 1);

        let (_, owner) = s3.added.lock().await[0].clone();
        assert!(owner.is_controller());
        assert!(VolumeManager::gvk().matches(&owner));
        assert_eq!(owner.name, "vol1");
    }

    #[tokio::test]
    async fn test_add_marks_failed_when_a_claim_fails() {
        let s3 = RecordingHandler::failing("S3", "bucket not found");
        let vm = VolumeManager::new("default", "vol1", State::Running).with_volume(volume("a", "S3"));
        let (hooks, store, vm) = setup(vec![s3], vm).await;

        hooks.on_add(&vm).await.unwrap();

        let stored = store.snapshot("default", "vol1").await.unwrap();
        assert_eq!(stored.status.state, Some(State::Failed));
        assert_eq!(stored.status.volumes[0].message, "bucket not found");
    }

    #[tokio::test]
    async fn test_add_with_failed_spec_skips_handlers() {
        let s3 = RecordingHandler::new("S3");
        let vm = VolumeManager::new("default", "vol1", State::Failed).with_volume(volume("a", "S3"));
        let (hooks, store, vm) = setup(vec![s3.clone()], vm).await;

        hooks.on_add(&vm).await.unwrap();

        let stored = store.snapshot("default", "vol1").await.unwrap();
        assert_eq!(stored.status.state, Some(State::Failed));
        assert!(s3.added.lock().await.is_empty());
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_update_to_failed_deletes_volumes() {
        let s3 = RecordingHandler::new("S3");
        let vm = VolumeManager::new("default", "vol1", State::Running).with_volume(volume("a", "S3"));
        let (hooks, _, vm) = setup(vec![s3.clone()], vm).await;

        let running = vm.clone().with_status(State::Running);
        hooks.on_update(&vm, &running).await.unwrap();
        assert!(s3.deleted.lock().await.is_empty());

        let failed = vm.clone().with_status(State::Failed);
        hooks.on_update(&running, &failed).await.unwrap();
        assert_eq!(*s3.deleted.lock().await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_tears_down_volumes() {
        let s3 = RecordingHandler::new("S3");
        let vm = VolumeManager::new("default", "vol1", State::Running)
            .with_volume(volume("a", "S3"))
            .with_volume(volume("b", "S3"));
        let (hooks, _, vm) = setup(vec![s3.clone()], vm).await;

        hooks.on_delete(&vm).await.unwrap();
        assert_eq!(s3.deleted.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_add_reports_status_failure() {
        let vm = VolumeManager::new("default", "vol1", State::Running);
        let (hooks, store, vm) = setup(Vec::new(), vm).await;
        store.fail_update("apiserver unavailable").await;

        let err = hooks.on_add(&vm).await.unwrap_err();
        assert!(matches!(err, Error::StatusUpdate { .. }));
    }
}
