//! In-memory store and sub-resource client.
//!
//! Both behave like the platform API where it matters to the engine: the
//! store rejects stale writes by resource version, deletes of absent objects
//! fail with `NotFound`, and created sub-resources carry a controller
//! reference back to their template.
//!
//! Failure injection (`fail_*`, `clear_failures`) exists for exercising the
//! engine's error paths and is hidden from the documented API.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use vck_core::{
    CustomResource, DynamicObject, Error, GroupVersionKind, Labels, ObjectMeta, OwnerReference,
    State, VolumeManager,
};

use crate::client::{CustomResourceStore, SubresourceClient};
use crate::kinds::SubresourceKind;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn in_namespace(scope: &str, namespace: &str) -> bool {
    scope.is_empty() || scope == namespace
}

#[derive(Debug, Default)]
struct StoreFailures {
    get: Option<String>,
    list: Option<String>,
    update: Option<String>,
}

/// In-memory custom resource store with optimistic concurrency.
#[derive(Debug)]
pub struct InMemoryStore<R> {
    plural: String,
    objects: RwLock<BTreeMap<Key, R>>,
    versions: AtomicU64,
    updates: AtomicU64,
    failures: RwLock<StoreFailures>,
}

impl<R: CustomResource> InMemoryStore<R> {
    /// Create an empty store for resources with the given plural name.
    pub fn new(plural: impl Into<String>) -> Self {
        Self {
            plural: plural.into(),
            objects: RwLock::new(BTreeMap::new()),
            versions: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            failures: RwLock::new(StoreFailures::default()),
        }
    }

    fn next_version(&self) -> String {
        (self.versions.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Insert or replace a resource unconditionally, assigning a uid and a
    /// fresh resource version. Returns the stored copy.
    pub async fn insert(&self, mut resource: R) -> R {
        let version = self.next_version();
        let meta = resource.metadata_mut();
        if meta.uid.is_empty() {
            meta.uid = format!("uid-{}-{}", meta.namespace, meta.name);
        }
        meta.resource_version = Some(version);
        let k = key(resource.namespace(), resource.name());
        self.objects.write().await.insert(k, resource.clone());
        resource
    }

    /// Current stored copy, bypassing failure injection.
    pub async fn snapshot(&self, namespace: &str, name: &str) -> Option<R> {
        self.objects.read().await.get(&key(namespace, name)).cloned()
    }

    /// Remove a resource behind the engine's back.
    pub async fn remove(&self, namespace: &str, name: &str) -> Option<R> {
        self.objects.write().await.remove(&key(namespace, name))
    }

    /// Number of successful updates so far.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    #[doc(hidden)]
    pub async fn fail_get(&self, reason: impl Into<String>) {
        self.failures.write().await.get = Some(reason.into());
    }

    #[doc(hidden)]
    pub async fn fail_list(&self, reason: impl Into<String>) {
        self.failures.write().await.list = Some(reason.into());
    }

    #[doc(hidden)]
    pub async fn fail_update(&self, reason: impl Into<String>) {
        self.failures.write().await.update = Some(reason.into());
    }

    #[doc(hidden)]
    pub async fn clear_failures(&self) {
        *self.failures.write().await = StoreFailures::default();
    }
}

impl InMemoryStore<VolumeManager> {
    /// Store for volume managers.
    pub fn volume_managers() -> Self {
        Self::new(vck_core::VOLUME_MANAGER_PLURAL)
    }
}

#[async_trait]
impl<R: CustomResource> CustomResourceStore<R> for InMemoryStore<R> {
    async fn get(&self, namespace: &str, name: &str) -> vck_core::Result<R> {
        if let Some(reason) = &self.failures.read().await.get {
            return Err(Error::api(format!("get {}", self.plural), reason.clone()));
        }
        self.objects
            .read()
            .await
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| Error::not_found(&self.plural, namespace, name))
    }

    async fn list(&self, namespace: &str, selector: &Labels) -> vck_core::Result<Vec<R>> {
        if let Some(reason) = &self.failures.read().await.list {
            return Err(Error::api(format!("list {}", self.plural), reason.clone()));
        }
        Ok(self
            .objects
            .read()
            .await
            .values()
            .filter(|r| in_namespace(namespace, r.namespace()))
            .filter(|r| r.metadata().matches_labels(selector))
            .cloned()
            .collect())
    }

    async fn update(&self, resource: &R) -> vck_core::Result<R> {
        if let Some(reason) = &self.failures.read().await.update {
            return Err(Error::api(format!("update {}", self.plural), reason.clone()));
        }
        let mut objects = self.objects.write().await;
        let k = key(resource.namespace(), resource.name());
        let stored = objects
            .get(&k)
            .ok_or_else(|| Error::not_found(&self.plural, resource.namespace(), resource.name()))?;

        let have = stored.metadata().resource_version.as_deref();
        let want = resource.metadata().resource_version.as_deref();
        if have != want {
            return Err(Error::conflict(
                &self.plural,
                resource.name(),
                format!(
                    "resource version {} is stale, current is {}",
                    want.unwrap_or("<none>"),
                    have.unwrap_or("<none>")
                ),
            ));
        }

        let mut updated = resource.clone();
        updated.metadata_mut().resource_version = Some(self.next_version());
        objects.insert(k, updated.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> vck_core::Result<()> {
        self.objects
            .write()
            .await
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(&self.plural, namespace, name))
    }
}

#[derive(Debug, Default)]
struct ClientFailures {
    list: Option<String>,
    create: Option<String>,
    delete: Option<String>,
}

/// How an in-memory client derives status from its objects.
#[derive(Debug, Clone, Copy)]
enum StatusPolicy {
    Kind(SubresourceKind),
    /// Read `/status/state` as a [`State`], defaulting to Running.
    Explicit,
}

/// In-memory client for one sub-resource kind.
#[derive(Debug)]
pub struct InMemorySubresourceClient {
    plural: String,
    ephemeral: bool,
    policy: StatusPolicy,
    owner_kind: GroupVersionKind,
    objects: RwLock<BTreeMap<Key, DynamicObject>>,
    created: RwLock<Vec<Key>>,
    deleted: RwLock<Vec<Key>>,
    failures: RwLock<ClientFailures>,
}

impl InMemorySubresourceClient {
    fn with_policy(plural: String, ephemeral: bool, policy: StatusPolicy) -> Self {
        Self {
            plural,
            ephemeral,
            policy,
            owner_kind: VolumeManager::gvk(),
            objects: RwLock::new(BTreeMap::new()),
            created: RwLock::new(Vec::new()),
            deleted: RwLock::new(Vec::new()),
            failures: RwLock::new(ClientFailures::default()),
        }
    }

    /// Client for a known platform kind, using that kind's status policy.
    pub fn for_kind(kind: SubresourceKind) -> Self {
        Self::with_policy(kind.plural().to_string(), kind.is_ephemeral(), StatusPolicy::Kind(kind))
    }

    /// Client for an arbitrary kind whose objects state their control-loop
    /// status directly under `/status/state`.
    pub fn new(plural: impl Into<String>, ephemeral: bool) -> Self {
        Self::with_policy(plural.into(), ephemeral, StatusPolicy::Explicit)
    }

    /// Owner type stamped on created objects.
    #[must_use]
    pub fn with_owner_kind(mut self, gvk: GroupVersionKind) -> Self {
        self.owner_kind = gvk;
        self
    }

    /// Build an object of this kind controlled by `owner`.
    pub fn object_for(&self, owner: &ObjectMeta) -> DynamicObject {
        DynamicObject::new("v1", self.plural.clone(), ObjectMeta::new(&owner.namespace, &owner.name))
            .with_owner(OwnerReference::controller_for(owner, &self.owner_kind))
    }

    /// Store an object as if the platform had it.
    pub async fn insert(&self, object: DynamicObject) {
        let k = key(&object.metadata.namespace, &object.metadata.name);
        self.objects.write().await.insert(k, object);
    }

    pub async fn remove(&self, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.objects.write().await.remove(&key(namespace, name))
    }

    pub async fn contains(&self, namespace: &str, name: &str) -> bool {
        self.objects.read().await.contains_key(&key(namespace, name))
    }

    /// `(namespace, name)` of every successful create call.
    pub async fn created(&self) -> Vec<(String, String)> {
        self.created.read().await.clone()
    }

    /// `(namespace, name)` of every successful delete call.
    pub async fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.read().await.clone()
    }

    #[doc(hidden)]
    pub async fn fail_list(&self, reason: impl Into<String>) {
        self.failures.write().await.list = Some(reason.into());
    }

    #[doc(hidden)]
    pub async fn fail_create(&self, reason: impl Into<String>) {
        self.failures.write().await.create = Some(reason.into());
    }

    #[doc(hidden)]
    pub async fn fail_delete(&self, reason: impl Into<String>) {
        self.failures.write().await.delete = Some(reason.into());
    }

    #[doc(hidden)]
    pub async fn clear_failures(&self) {
        *self.failures.write().await = ClientFailures::default();
    }

    fn derive_status(&self, object: &DynamicObject) -> State {
        match self.policy {
            StatusPolicy::Kind(kind) => kind.status_state(object),
            StatusPolicy::Explicit => object
                .str_field("/status/state")
                .and_then(|s| s.parse().ok())
                .unwrap_or(State::Running),
        }
    }
}

#[async_trait]
impl<R: CustomResource> SubresourceClient<R> for InMemorySubresourceClient {
    async fn create(&self, namespace: &str, template: &R) -> vck_core::Result<()> {
        if let Some(reason) = &self.failures.read().await.create {
            return Err(Error::api(format!("create {}", self.plural), reason.clone()));
        }
        let mut meta = template.metadata().clone();
        meta.namespace = namespace.to_string();
        let object = self.object_for(&meta);
        let k = key(namespace, template.name());
        self.objects.write().await.insert(k.clone(), object);
        self.created.write().await.push(k);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> vck_core::Result<()> {
        if let Some(reason) = &self.failures.read().await.delete {
            return Err(Error::api(format!("delete {}", self.plural), reason.clone()));
        }
        let k = key(namespace, name);
        self.objects
            .write()
            .await
            .remove(&k)
            .ok_or_else(|| Error::not_found(&self.plural, namespace, name))?;
        self.deleted.write().await.push(k);
        Ok(())
    }

    async fn get(&self, namespace: &str, name: &str) -> vck_core::Result<DynamicObject> {
        self.objects
            .read()
            .await
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| Error::not_found(&self.plural, namespace, name))
    }

    async fn list(&self, namespace: &str, selector: &Labels) -> vck_core::Result<Vec<DynamicObject>> {
        if let Some(reason) = &self.failures.read().await.list {
            return Err(Error::api(format!("list {}", self.plural), reason.clone()));
        }
        Ok(self
            .objects
            .read()
            .await
            .values()
            .filter(|o| in_namespace(namespace, &o.metadata.namespace))
            .filter(|o| o.metadata.matches_labels(selector))
            .cloned()
            .collect())
    }

    fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    fn plural(&self) -> &str {
        &self.plural
    }

    fn status_state(&self, object: &DynamicObject) -> State {
        self.derive_status(object)
    }
}
