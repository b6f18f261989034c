//! Reconciler implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{Instrument, debug, info, info_span, warn};
use vck_core::{CustomResource, GroupVersionKind};

use crate::client::{SharedClient, SharedStore};
use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::execute::ActionExecutor;
use crate::group::OwnershipGrouper;
use crate::plan::ActionPlanner;
use crate::status::StatusWriter;
use crate::types::TickReport;

/// Level-triggered reconciler for one custom resource type.
///
/// Every tick re-derives everything from what the store and the clients
/// report; nothing carries over from one tick to the next.
pub struct Reconciler<R> {
    namespace: String,
    target: GroupVersionKind,
    grouper: OwnershipGrouper<R>,
    planner: ActionPlanner<R>,
    executor: ActionExecutor<R>,
    status: Arc<StatusWriter<R>>,
    ticks: AtomicU64,
}

impl<R: CustomResource> Reconciler<R> {
    /// Create a reconciler scoped to `namespace` (empty for all namespaces)
    /// that manages sub-resources controlled by `target`.
    pub fn new(
        namespace: impl Into<String>,
        target: GroupVersionKind,
        store: SharedStore<R>,
        clients: Vec<SharedClient<R>>,
    ) -> Self {
        let status = StatusWriter::new_arc(Arc::clone(&store));
        Self::with_status_writer(namespace, target, status, clients)
    }

    /// Create a reconciler that shares `status` with another writer, such as
    /// the hook path.
    pub fn with_status_writer(
        namespace: impl Into<String>,
        target: GroupVersionKind,
        status: Arc<StatusWriter<R>>,
        clients: Vec<SharedClient<R>>,
    ) -> Self {
        let namespace = namespace.into();
        let store = Arc::clone(status.store());
        Self {
            grouper: OwnershipGrouper::new(namespace.clone(), target.clone(), Arc::clone(&store), clients),
            planner: ActionPlanner::new(store),
            executor: ActionExecutor::new(Arc::clone(&status)),
            namespace,
            target,
            status,
            ticks: AtomicU64::new(0),
        }
    }

    /// Create a reconciler from configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn from_config(
        config: &ReconcilerConfig,
        store: SharedStore<R>,
        clients: Vec<SharedClient<R>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.namespace.clone(), config.target.clone(), store, clients))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn target(&self) -> &GroupVersionKind {
        &self.target
    }

    /// The status writer, for sharing with the hook path.
    pub fn status_writer(&self) -> Arc<StatusWriter<R>> {
        Arc::clone(&self.status)
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Run one full pass: group, then plan and execute per owner.
    ///
    /// Never fails; every error is contained in the owner that produced it
    /// and reported in the returned [`TickReport`].
    pub async fn reconcile_once(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let span = info_span!("reconcile_tick", tick, namespace = %self.namespace);
        self.tick().instrument(span).await
    }

    async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let grouping = self.grouper.group().await;
        report
            .errors
            .extend(grouping.errors.iter().map(ToString::to_string));
        report.owners = grouping.owners.len();

        for (owner, subs) in &grouping.owners {
            let plan = match self.planner.plan(&owner.namespace, &owner.name, subs).await {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(owner = %owner, error = %e, "Failed to fetch owning resource, skipping");
                    report.errors.push(Error::from(e).to_string());
                    continue;
                }
            };

            if plan.action.is_noop() {
                debug!(owner = %owner, "Nothing to do");
                continue;
            }
            report.planned += 1;
            info!(owner = %owner, action = %plan.action, "Planned action");

            let execution = self
                .executor
                .execute(&owner.namespace, &owner.name, plan.resource.as_ref(), &plan.action)
                .await;
            if execution.status_updated {
                report.status_updates += 1;
            }
            report.created += execution.created;
            report.deleted += execution.deleted;
            report
                .errors
                .extend(execution.errors.iter().map(ToString::to_string));
        }

        if report.converged() {
            info!(owners = report.owners, "System converged");
        } else {
            info!(
                owners = report.owners,
                planned = report.planned,
                status_updates = report.status_updates,
                created = report.created,
                deleted = report.deleted,
                errors = report.errors.len(),
                "Reconciliation complete"
            );
        }
        report
    }
}

/// Builder for [`Reconciler`].
pub struct ReconcilerBuilder<R> {
    config: ReconcilerConfig,
    store: Option<SharedStore<R>>,
    status: Option<Arc<StatusWriter<R>>>,
    clients: Vec<SharedClient<R>>,
}

impl<R: CustomResource> ReconcilerBuilder<R> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: ReconcilerConfig::default(),
            store: None,
            status: None,
            clients: Vec::new(),
        }
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the namespace scope.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Set the managed type.
    #[must_use]
    pub fn target(mut self, target: GroupVersionKind) -> Self {
        self.config.target = target;
        self
    }

    /// Set the custom resource store.
    #[must_use]
    pub fn with_store(mut self, store: SharedStore<R>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an existing status writer. Takes precedence over `with_store`.
    #[must_use]
    pub fn with_status_writer(mut self, status: Arc<StatusWriter<R>>) -> Self {
        self.status = Some(status);
        self
    }

    /// Register one sub-resource kind. Kinds are grouped in registration
    /// order.
    #[must_use]
    pub fn with_client(mut self, client: SharedClient<R>) -> Self {
        self.clients.push(client);
        self
    }

    /// Register several sub-resource kinds.
    #[must_use]
    pub fn with_clients(mut self, clients: impl IntoIterator<Item = SharedClient<R>>) -> Self {
        self.clients.extend(clients);
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when no store was given or the configuration
    /// does not validate.
    pub fn build(self) -> Result<Reconciler<R>> {
        self.config.validate()?;
        let status = match (self.status, self.store) {
            (Some(status), _) => status,
            (None, Some(store)) => StatusWriter::new_arc(store),
            (None, None) => return Err(Error::invalid_config("Custom resource store is required")),
        };
        Ok(Reconciler::with_status_writer(
            self.config.namespace,
            self.config.target,
            status,
            self.clients,
        ))
    }
}

impl<R: CustomResource> Default for ReconcilerBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}
