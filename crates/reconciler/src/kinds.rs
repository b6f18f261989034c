//! Per-kind control-loop policy: which kinds are ephemeral, and how a
//! [`State`] is derived from an object's status block.
//!
//! Status derivation reads the untyped body of a [`DynamicObject`], so a
//! missing or oddly shaped status block never fails: it falls through to the
//! kind's default.

use std::fmt;

use serde_json::Value;
use vck_core::{DynamicObject, State};

/// The platform kinds a volume manager may provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubresourceKind {
    Pod,
    PersistentVolume,
    PersistentVolumeClaim,
    Job,
    Deployment,
    Service,
    Ingress,
    HorizontalPodAutoscaler,
}

impl SubresourceKind {
    /// Every kind, in provisioning order.
    pub const ALL: [Self; 8] = [
        Self::PersistentVolume,
        Self::PersistentVolumeClaim,
        Self::Job,
        Self::Deployment,
        Self::Pod,
        Self::Service,
        Self::Ingress,
        Self::HorizontalPodAutoscaler,
    ];

    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Pod => "pods",
            Self::PersistentVolume => "persistentvolumes",
            Self::PersistentVolumeClaim => "persistentvolumeclaims",
            Self::Job => "jobs",
            Self::Deployment => "deployments",
            Self::Service => "services",
            Self::Ingress => "ingresses",
            Self::HorizontalPodAutoscaler => "horizontalpodautoscalers",
        }
    }

    /// Volumes, claims, jobs and deployments carry state or identity and
    /// must never be blindly recreated.
    #[must_use]
    pub const fn is_ephemeral(self) -> bool {
        match self {
            Self::Pod | Self::Service | Self::Ingress | Self::HorizontalPodAutoscaler => true,
            Self::PersistentVolume
            | Self::PersistentVolumeClaim
            | Self::Job
            | Self::Deployment => false,
        }
    }

    /// Derive the control-loop state of an existing object of this kind.
    #[must_use]
    pub fn status_state(self, object: &DynamicObject) -> State {
        match self {
            Self::Pod => pod_state(object),
            Self::Job => job_state(object),
            Self::Deployment => deployment_state(object),
            Self::PersistentVolumeClaim => match phase(object) {
                Some("Pending") => State::Pending,
                Some("Lost") => State::Failed,
                _ => State::Running,
            },
            Self::PersistentVolume => match phase(object) {
                Some("Pending") => State::Pending,
                Some("Failed") => State::Failed,
                _ => State::Running,
            },
            Self::Service | Self::Ingress | Self::HorizontalPodAutoscaler => State::Running,
        }
    }
}

impl fmt::Display for SubresourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

fn phase(object: &DynamicObject) -> Option<&str> {
    object.str_field("/status/phase")
}

fn pod_state(object: &DynamicObject) -> State {
    if pod_failed(object) {
        return State::Failed;
    }
    match phase(object) {
        Some("Pending") => State::Pending,
        Some("Succeeded") => State::Completed,
        _ => State::Running,
    }
}

/// A pod counts as failed before the platform says so: a container that is
/// not ready and has either restarted or exited non-zero is enough.
fn pod_failed(object: &DynamicObject) -> bool {
    if phase(object) == Some("Failed") {
        return true;
    }
    object
        .field("/status/containerStatuses")
        .and_then(Value::as_array)
        .is_some_and(|statuses| statuses.iter().any(container_failed))
}

fn container_failed(status: &Value) -> bool {
    let ready = status.get("ready").and_then(Value::as_bool).unwrap_or(false);
    if ready {
        return false;
    }
    let restarts = status.get("restartCount").and_then(Value::as_i64).unwrap_or(0);
    let exit_code = status
        .pointer("/state/terminated/exitCode")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    restarts > 0 || exit_code > 0
}

fn job_state(object: &DynamicObject) -> State {
    match latest_condition(object, "lastTransitionTime") {
        Some("Complete") => State::Completed,
        Some("Failed") => State::Failed,
        _ => State::Running,
    }
}

fn deployment_state(object: &DynamicObject) -> State {
    match latest_condition(object, "lastUpdateTime") {
        Some("ReplicaFailure") => State::Failed,
        _ => State::Running,
    }
}

/// Type of the most recent status condition, ordered by `time_field`.
///
/// Timestamps are RFC 3339 in UTC, so lexical order is chronological. On a
/// tie the earliest listed condition wins.
fn latest_condition<'a>(object: &'a DynamicObject, time_field: &str) -> Option<&'a str> {
    let conditions = object.field("/status/conditions")?.as_array()?;
    let mut latest: Option<(&str, &Value)> = None;
    for condition in conditions {
        let time = condition.get(time_field).and_then(Value::as_str).unwrap_or("");
        if latest.is_none_or(|(best, _)| time > best) {
            latest = Some((time, condition));
        }
    }
    latest.and_then(|(_, condition)| condition.get("type").and_then(Value::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vck_core::ObjectMeta;

    fn object(kind: &str, body: Value) -> DynamicObject {
        DynamicObject::new("v1", kind, ObjectMeta::new("default", "vol1")).with_data(body)
    }

    #[test]
    fn test_ephemeral_kinds() {
        assert!(SubresourceKind::Pod.is_ephemeral());
        assert!(SubresourceKind::Service.is_ephemeral());
        assert!(!SubresourceKind::PersistentVolumeClaim.is_ephemeral());
        assert!(!SubresourceKind::Job.is_ephemeral());
    }

    #[test]
    fn test_pod_phases() {
        let kind = SubresourceKind::Pod;
        assert_eq!(kind.status_state(&object("Pod", json!({}))), State::Running);
        assert_eq!(
            kind.status_state(&object("Pod", json!({"status": {"phase": "Pending"}}))),
            State::Pending
        );
        assert_eq!(
            kind.status_state(&object("Pod", json!({"status": {"phase": "Succeeded"}}))),
            State::Completed
        );
        assert_eq!(
            kind.status_state(&object("Pod", json!({"status": {"phase": "Failed"}}))),
            State::Failed
        );
    }

    #[test]
    fn test_pod_crashlooping_container_is_failed() {
        let pod = object(
            "Pod",
            json!({"status": {
                "phase": "Running",
                "containerStatuses": [
                    {"name": "fetch", "ready": true, "restartCount": 0},
                    {"name": "sync", "ready": false, "restartCount": 3}
                ]
            }}),
        );
        assert_eq!(SubresourceKind::Pod.status_state(&pod), State::Failed);
    }

    #[test]
    fn test_pod_non_zero_exit_is_failed() {
        let pod = object(
            "Pod",
            json!({"status": {
                "phase": "Running",
                "containerStatuses": [{
                    "name": "fetch",
                    "ready": false,
                    "restartCount": 0,
                    "state": {"terminated": {"exitCode": 2}}
                }]
            }}),
        );
        assert_eq!(SubresourceKind::Pod.status_state(&pod), State::Failed);
    }

    #[test]
    fn test_job_latest_condition_wins() {
        let job = object(
            "Job",
            json!({"status": {"conditions": [
                {"type": "Failed", "lastTransitionTime": "2018-03-01T10:00:00Z"},
                {"type": "Complete", "lastTransitionTime": "2018-03-01T11:00:00Z"}
            ]}}),
        );
        assert_eq!(SubresourceKind::Job.status_state(&job), State::Completed);

        let failed = object(
            "Job",
            json!({"status": {"conditions": [
                {"type": "Complete", "lastTransitionTime": "2018-03-01T10:00:00Z"},
                {"type": "Failed", "lastTransitionTime": "2018-03-01T12:00:00Z"}
            ]}}),
        );
        assert_eq!(SubresourceKind::Job.status_state(&failed), State::Failed);
        assert_eq!(SubresourceKind::Job.status_state(&object("Job", json!({}))), State::Running);
    }

    #[test]
    fn test_deployment_replica_failure() {
        let deployment = object(
            "Deployment",
            json!({"status": {"conditions": [
                {"type": "Available", "lastUpdateTime": "2018-03-01T10:00:00Z"},
                {"type": "ReplicaFailure", "lastUpdateTime": "2018-03-01T10:05:00Z"}
            ]}}),
        );
        assert_eq!(SubresourceKind::Deployment.status_state(&deployment), State::Failed);
    }

    #[test]
    fn test_claim_phases() {
        let kind = SubresourceKind::PersistentVolumeClaim;
        assert_eq!(
            kind.status_state(&object("PersistentVolumeClaim", json!({"status": {"phase": "Bound"}}))),
            State::Running
        );
        assert_eq!(
            kind.status_state(&object("PersistentVolumeClaim", json!({"status": {"phase": "Pending"}}))),
            State::Pending
        );
        assert_eq!(
            kind.status_state(&object("PersistentVolumeClaim", json!({"status": {"phase": "Lost"}}))),
            State::Failed
        );
    }
}
