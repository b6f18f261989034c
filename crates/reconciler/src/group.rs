//! Ownership grouping of sub-resources.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, info, warn};
use vck_core::{CustomResource, GroupVersionKind, Labels};

use crate::client::{SharedClient, SharedStore};
use crate::types::{OwnerKey, Subresource, SubresourceMap};

/// Result of one grouping pass.
pub struct Grouping<R> {
    /// Classified sub-resources keyed by owner namespace and name.
    pub owners: SubresourceMap<R>,
    /// Listing failures. A kind that failed to list is absent from every
    /// owner this tick, including its synthetic missing entries.
    pub errors: Vec<vck_core::Error>,
}

impl<R: CustomResource> fmt::Debug for Grouping<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grouping")
            .field("owners", &self.owners)
            .field("errors", &self.errors)
            .finish()
    }
}

impl<R> Default for Grouping<R> {
    fn default() -> Self {
        Self {
            owners: SubresourceMap::new(),
            errors: Vec::new(),
        }
    }
}

/// Groups every registered kind's sub-resources under their controlling
/// custom resource.
///
/// Each list call is its own point-in-time read; nothing here is a snapshot
/// across kinds.
pub struct OwnershipGrouper<R> {
    namespace: String,
    target: GroupVersionKind,
    store: SharedStore<R>,
    clients: Vec<SharedClient<R>>,
}

impl<R: CustomResource> OwnershipGrouper<R> {
    pub fn new(
        namespace: impl Into<String>,
        target: GroupVersionKind,
        store: SharedStore<R>,
        clients: Vec<SharedClient<R>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            target,
            store,
            clients,
        }
    }

    pub fn clients(&self) -> &[SharedClient<R>] {
        &self.clients
    }

    /// Run one grouping pass.
    pub async fn group(&self) -> Grouping<R> {
        let selector = Labels::new();
        let resources = match self.store.list(&self.namespace, &selector).await {
            Ok(resources) => resources,
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e, "Failed to list custom resources");
                return Grouping {
                    owners: SubresourceMap::new(),
                    errors: vec![e],
                };
            }
        };
        if resources.is_empty() {
            info!(namespace = %self.namespace, "No custom resources to reconcile");
            return Grouping::default();
        }

        let mut grouping = Grouping::default();
        let mut listed: Vec<&SharedClient<R>> = Vec::with_capacity(self.clients.len());

        for client in &self.clients {
            let objects = match client.list(&self.namespace, &selector).await {
                Ok(objects) => objects,
                Err(e) => {
                    warn!(
                        kind = client.plural(),
                        namespace = %self.namespace,
                        error = %e,
                        "Failed to list sub-resources, skipping kind this tick"
                    );
                    grouping.errors.push(e);
                    continue;
                }
            };
            listed.push(client);

            for object in objects {
                let Some(owner) = object.metadata.controller_ref() else {
                    debug!(
                        kind = client.plural(),
                        name = %object.metadata.name,
                        "Ignoring sub-resource without controller reference"
                    );
                    continue;
                };
                if !self.target.matches(owner) {
                    debug!(
                        kind = client.plural(),
                        name = %object.metadata.name,
                        owner_kind = %owner.kind,
                        owner_api_version = %owner.api_version,
                        "Ignoring sub-resource controlled by another type"
                    );
                    continue;
                }
                let key = OwnerKey::new(&object.metadata.namespace, &owner.name);
                grouping
                    .owners
                    .entry(key)
                    .or_default()
                    .push(Subresource::observed(client.clone(), object));
            }
        }

        for resource in &resources {
            let subs = grouping
                .owners
                .entry(OwnerKey::new(resource.namespace(), resource.name()))
                .or_default();
            let present: BTreeSet<String> = subs.iter().map(|s| s.plural().to_string()).collect();
            for client in listed.iter().filter(|c| !present.contains(c.plural())) {
                subs.push(Subresource::missing((*client).clone()));
            }
        }

        debug!(
            resources = resources.len(),
            owners = grouping.owners.len(),
            degraded = grouping.errors.len(),
            "Grouped sub-resources"
        );
        grouping
    }
}
