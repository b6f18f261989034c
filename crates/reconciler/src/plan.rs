//! The decision table.
//!
//! [`decide`] is pure: given the owning resource as fetched this tick (or its
//! absence) and its classified sub-resources, it returns the one corrective
//! [`Action`]. Rules are evaluated in priority order and the first match
//! wins, so failure detection always preempts promotion.

use tracing::debug;
use vck_core::{CustomResource, Lifecycle, State};

use crate::client::SharedStore;
use crate::types::{Action, Subresource};

const ACTIVE: &[State] = &[State::Running, State::Completed];
const TERMINAL: &[State] = &[State::Completed, State::Failed];
const CONVERGING: &[State] = &[State::Pending, State::Running];
const GONE: &[Lifecycle] = &[Lifecycle::DoesNotExist, Lifecycle::Deleting];

/// Owning resource as fetched this tick, plus the action decided for it.
#[derive(Debug)]
pub struct Plan<R> {
    /// `None` when the resource was not found.
    pub resource: Option<R>,
    pub action: Action<R>,
}

/// Fetches the owning resource and applies [`decide`].
pub struct ActionPlanner<R> {
    store: SharedStore<R>,
}

impl<R: CustomResource> ActionPlanner<R> {
    pub fn new(store: SharedStore<R>) -> Self {
        Self { store }
    }

    /// Plan the next action for `owner`.
    ///
    /// An empty owner name is not a managed resource and plans a no-op.
    ///
    /// # Errors
    ///
    /// Returns the store's error when the fetch fails for any reason other
    /// than `NotFound`. The caller skips the owner for this tick.
    pub async fn plan(
        &self,
        namespace: &str,
        owner: &str,
        subs: &[Subresource<R>],
    ) -> vck_core::Result<Plan<R>> {
        if owner.is_empty() {
            debug!("Skipping sub-resources with an empty owner name");
            return Ok(Plan {
                resource: None,
                action: Action::noop(),
            });
        }

        let resource = match self.store.get(namespace, owner).await {
            Ok(resource) => Some(resource),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        let action = decide(resource.as_ref(), subs);
        Ok(Plan { resource, action })
    }
}

/// Lifecycle of the owning resource as seen by the planner.
fn lifecycle_of<R: CustomResource>(resource: Option<&R>) -> Lifecycle {
    match resource {
        None => Lifecycle::DoesNotExist,
        Some(r) if r.metadata().is_deleting() => Lifecycle::Deleting,
        Some(_) => Lifecycle::Exists,
    }
}

/// Decide the corrective action for one owning resource.
///
/// A resource whose status has never been written is left alone; the hook
/// path owns its first transition.
pub fn decide<R: CustomResource>(resource: Option<&R>, subs: &[Subresource<R>]) -> Action<R> {
    let resource = match (lifecycle_of(resource), resource) {
        (Lifecycle::Exists, Some(resource)) => resource,
        _ => return Action::delete_all(subs),
    };

    let spec = resource.spec_state();
    let Some(status) = resource.status_state() else {
        return Action::noop();
    };
    if !spec.is_one_of(ACTIVE) {
        return Action::noop();
    }

    if status.is_one_of(TERMINAL) {
        return Action::delete_all(subs);
    }
    if !status.is_one_of(CONVERGING) {
        return Action::noop();
    }

    if let Some(broken) = subs.iter().find(|s| !s.is_ephemeral() && is_lost(s)) {
        return Action::transition(
            State::Failed,
            format!("{} is {}", broken.plural(), loss_reason(broken)),
        );
    }

    if spec == State::Completed {
        if let Some(done) = subs.iter().find(|s| s.has_status(State::Completed)) {
            return Action::transition(State::Completed, format!("{} completed", done.plural()));
        }
    }

    let recreate: Vec<Subresource<R>> = subs
        .iter()
        .filter(|s| s.is_ephemeral() && needs_recreate(s))
        .cloned()
        .collect();
    if !recreate.is_empty() {
        return Action::create(recreate);
    }

    if status == State::Running {
        if let Some(pending) = subs.iter().find(|s| s.has_status(State::Pending)) {
            return Action::transition(State::Pending, format!("{} is pending", pending.plural()));
        }
    }

    if status == State::Pending && subs.iter().all(|s| s.has_status(State::Running)) {
        return Action::transition(State::Running, "all sub-resources are running");
    }

    Action::noop()
}

/// Missing, leaving, or reporting failure.
fn is_lost<R: CustomResource>(sub: &Subresource<R>) -> bool {
    sub.lifecycle.is_one_of(GONE) || sub.has_status(State::Failed)
}

fn loss_reason<R: CustomResource>(sub: &Subresource<R>) -> &'static str {
    match sub.lifecycle {
        Lifecycle::DoesNotExist => "missing",
        Lifecycle::Deleting => "being deleted",
        Lifecycle::Exists => "failed",
    }
}

/// Missing, or present and failed. Objects already being deleted are left to
/// finish.
fn needs_recreate<R: CustomResource>(sub: &Subresource<R>) -> bool {
    match sub.lifecycle {
        Lifecycle::DoesNotExist => true,
        Lifecycle::Exists => sub.has_status(State::Failed),
        Lifecycle::Deleting => false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use serde_json::json;
    use vck_core::{DynamicObject, ObjectMeta, VolumeManager};

    use super::*;
    use crate::client::SharedClient;
    use crate::kinds::SubresourceKind;
    use crate::memory::{InMemoryStore, InMemorySubresourceClient};

    fn client(kind: SubresourceKind) -> SharedClient<VolumeManager> {
        Arc::new(InMemorySubresourceClient::for_kind(kind))
    }

    fn vm(spec: State, status: State) -> VolumeManager {
        VolumeManager::new("default", "vol1", spec).with_status(status)
    }

    fn existing(kind: SubresourceKind, body: serde_json::Value) -> Subresource<VolumeManager> {
        let object = DynamicObject::new("v1", kind.plural(), ObjectMeta::new("default", "vol1"))
            .with_data(body);
        Subresource::observed(client(kind), object)
    }

    fn running(kind: SubresourceKind) -> Subresource<VolumeManager> {
        existing(kind, json!({}))
    }

    fn missing(kind: SubresourceKind) -> Subresource<VolumeManager> {
        Subresource::missing(client(kind))
    }

    fn failed_pod() -> Subresource<VolumeManager> {
        existing(SubresourceKind::Pod, json!({"status": {"phase": "Failed"}}))
    }

    #[test]
    fn test_absent_owner_deletes_everything() {
        let subs = vec![running(SubresourceKind::Job), running(SubresourceKind::Service)];
        let action = decide::<VolumeManager>(None, &subs);

        assert_eq!(action.new_state, None);
        assert!(action.to_create.is_empty());
        assert_eq!(action.to_delete, subs);
    }

    #[test]
    fn test_deleting_owner_deletes_everything() {
        let mut resource = vm(State::Running, State::Running);
        resource.metadata.deletion_timestamp = Some(chrono::Utc::now());
        let subs = vec![running(SubresourceKind::Pod)];

        let action = decide(Some(&resource), &subs);
        assert_eq!(action.to_delete.len(), 1);
        assert_eq!(action.new_state, None);
    }

    #[test]
    fn test_terminal_owner_is_undeployed() {
        let subs = vec![running(SubresourceKind::Pod)];
        for status in [State::Completed, State::Failed] {
            let action = decide(Some(&vm(State::Running, status)), &subs);
            assert_eq!(action.to_delete.len(), 1);
            assert_eq!(action.new_state, None);
        }
    }

    #[test]
    fn test_non_ephemeral_loss_fails_owner() {
        let subs = vec![running(SubresourceKind::Pod), missing(SubresourceKind::PersistentVolumeClaim)];
        let action = decide(Some(&vm(State::Running, State::Running)), &subs);

        assert_eq!(action.new_state, Some(State::Failed));
        assert!(action.message.contains("persistentvolumeclaims"));
        assert!(action.to_create.is_empty());
        assert!(action.to_delete.is_empty());
    }

    #[test]
    fn test_non_ephemeral_failed_status_fails_owner() {
        let job = existing(
            SubresourceKind::Job,
            json!({"status": {"conditions": [{"type": "Failed", "lastTransitionTime": "2018-03-01T10:00:00Z"}]}}),
        );
        let action = decide(Some(&vm(State::Running, State::Pending)), &[job]);
        assert_eq!(action.new_state, Some(State::Failed));
    }

    #[test]
    fn test_failure_preempts_promotion() {
        let subs = vec![missing(SubresourceKind::Job), missing(SubresourceKind::Pod)];
        let action = decide(Some(&vm(State::Running, State::Pending)), &subs);
        assert_eq!(action.new_state, Some(State::Failed));
        assert!(action.to_create.is_empty());
    }

    #[test]
    fn test_completed_sub_resource_completes_owner() {
        let job = existing(
            SubresourceKind::Job,
            json!({"status": {"conditions": [{"type": "Complete", "lastTransitionTime": "2018-03-01T10:00:00Z"}]}}),
        );
        let action = decide(Some(&vm(State::Completed, State::Running)), &[job.clone()]);
        assert_eq!(action.new_state, Some(State::Completed));

        // Only a Completed desired state completes the owner.
        let action = decide(Some(&vm(State::Running, State::Running)), &[job]);
        assert!(action.is_noop());
    }

    #[test]
    fn test_ephemeral_sub_resources_are_recreated() {
        let subs = vec![
            failed_pod(),
            missing(SubresourceKind::Service),
            running(SubresourceKind::Ingress),
        ];
        let action = decide(Some(&vm(State::Running, State::Running)), &subs);

        assert_eq!(action.new_state, None);
        assert!(action.to_delete.is_empty());
        let kinds: Vec<&str> = action.to_create.iter().map(Subresource::plural).collect();
        assert_eq!(kinds, vec!["pods", "services"]);
    }

    #[test]
    fn test_deleting_ephemeral_is_left_alone() {
        let mut object = DynamicObject::new("v1", "pods", ObjectMeta::new("default", "vol1"));
        object.metadata.deletion_timestamp = Some(chrono::Utc::now());
        let pod = Subresource::observed(client(SubresourceKind::Pod), object);

        let action = decide(Some(&vm(State::Running, State::Running)), &[pod]);
        assert!(action.is_noop());
    }

    #[test]
    fn test_pending_sub_resource_regresses_owner() {
        let pod = existing(SubresourceKind::Pod, json!({"status": {"phase": "Pending"}}));
        let action = decide(Some(&vm(State::Running, State::Running)), &[pod.clone()]);
        assert_eq!(action.new_state, Some(State::Pending));

        let action = decide(Some(&vm(State::Running, State::Pending)), &[pod]);
        assert!(action.is_noop());
    }

    #[test]
    fn test_all_running_promotes_owner() {
        let subs = vec![running(SubresourceKind::Pod), running(SubresourceKind::PersistentVolumeClaim)];
        let action = decide(Some(&vm(State::Running, State::Pending)), &subs);
        assert_eq!(action.new_state, Some(State::Running));

        let action = decide(Some(&vm(State::Running, State::Running)), &subs);
        assert!(action.is_noop());
    }

    #[test]
    fn test_inactive_or_unwritten_owner_is_noop() {
        let subs = vec![missing(SubresourceKind::PersistentVolumeClaim)];
        assert!(decide(Some(&vm(State::Pending, State::Pending)), &subs).is_noop());

        let unwritten = VolumeManager::new("default", "vol1", State::Running);
        assert!(decide(Some(&unwritten), &subs).is_noop());
    }

    #[tokio::test]
    async fn test_planner_treats_not_found_as_absent() {
        let store = Arc::new(InMemoryStore::volume_managers());
        let planner = ActionPlanner::<VolumeManager>::new(store);
        let subs = vec![running(SubresourceKind::Job)];

        let plan = planner.plan("default", "vol3", &subs).await.unwrap();
        assert!(plan.resource.is_none());
        assert_eq!(plan.action.to_delete.len(), 1);
    }

    #[tokio::test]
    async fn test_planner_empty_owner_is_noop() {
        let store = Arc::new(InMemoryStore::volume_managers());
        let planner = ActionPlanner::<VolumeManager>::new(store);
        let subs = vec![running(SubresourceKind::Job)];

        let plan = planner.plan("default", "", &subs).await.unwrap();
        assert!(plan.action.is_noop());
    }

    #[tokio::test]
    async fn test_planner_propagates_fetch_failure() {
        let store = Arc::new(InMemoryStore::volume_managers());
        store.fail_get("connection reset").await;
        let planner = ActionPlanner::<VolumeManager>::new(store);

        let result = planner.plan("default", "vol1", &[]).await;
        assert!(result.is_err());
    }
}
