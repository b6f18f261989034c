//! Serialized status writes.
//!
//! The reconcile loop and the hook path both write the status of the same
//! custom resources. Every such write goes through one [`StatusWriter`],
//! which keeps at most one write per resource in flight inside this process.
//! The store's version check still applies: a write based on a stale copy
//! comes back as a conflict and is left for the next tick.
//!
//! Lock entries live only while a write to that resource is in flight or
//! waiting, so the map is bounded by concurrent writers, not by every
//! resource ever seen.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use vck_core::{CustomResource, State};

use crate::client::SharedStore;

type Key = (String, String);

/// Single write path for custom resource status.
pub struct StatusWriter<R> {
    store: SharedStore<R>,
    locks: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl<R: CustomResource> StatusWriter<R> {
    pub fn new(store: SharedStore<R>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn new_arc(store: SharedStore<R>) -> Arc<Self> {
        Arc::new(Self::new(store))
    }

    /// The store writes go to.
    pub fn store(&self) -> &SharedStore<R> {
        &self.store
    }

    fn lease(&self, namespace: &str, name: &str) -> Lease<'_, R> {
        let key = (namespace.to_string(), name.to_string());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(locks.entry(key.clone()).or_default());
        Lease {
            writer: self,
            key,
            lock,
        }
    }

    /// Set state and message on a copy of `resource` and write it.
    ///
    /// # Errors
    ///
    /// Returns the store's error, including `Conflict` when `resource` is
    /// stale.
    pub async fn write(&self, resource: &R, state: State, message: impl Into<String>) -> vck_core::Result<R> {
        let message = message.into();
        self.write_with(resource, move |r| r.set_status(state, message))
            .await
    }

    /// Apply `mutate` to a copy of `resource` and write it.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn write_with<F>(&self, resource: &R, mutate: F) -> vck_core::Result<R>
    where
        F: FnOnce(&mut R) + Send,
    {
        let lease = self.lease(resource.namespace(), resource.name());
        let _guard = lease.lock.lock().await;

        let mut updated = resource.clone();
        mutate(&mut updated);
        debug!(
            namespace = resource.namespace(),
            name = resource.name(),
            state = ?updated.status_state(),
            "Writing status"
        );
        self.store.update(&updated).await
    }

    /// Number of resources with a write in flight or waiting.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Holds one resource's lock entry for the duration of a write. Dropping
/// the last lease removes the entry, including when the write is cancelled.
struct Lease<'a, R> {
    writer: &'a StatusWriter<R>,
    key: Key,
    lock: Arc<AsyncMutex<()>>,
}

impl<R> Drop for Lease<'_, R> {
    fn drop(&mut self) {
        let mut locks = self
            .writer
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map and this lease are the only holders: nobody else is waiting.
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2)
        {
            locks.remove(&self.key);
        }
    }
}
