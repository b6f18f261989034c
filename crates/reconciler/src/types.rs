//! Core types for the reconciler.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use vck_core::{CustomResource, DynamicObject, Lifecycle, State};

use crate::client::SharedClient;

/// One sub-resource as classified for a single tick: the client for its
/// kind, the observed object (absent for expected-but-missing kinds), and its
/// lifecycle.
///
/// Every record owns its own copy of the object; nothing is shared between
/// records except the client handle.
pub struct Subresource<R> {
    pub client: SharedClient<R>,
    pub object: Option<DynamicObject>,
    pub lifecycle: Lifecycle,
}

impl<R: CustomResource> Subresource<R> {
    /// Classify an observed object: `Deleting` once a deletion timestamp is
    /// set, `Exists` otherwise.
    pub fn observed(client: SharedClient<R>, object: DynamicObject) -> Self {
        let lifecycle = if object.metadata.is_deleting() {
            Lifecycle::Deleting
        } else {
            Lifecycle::Exists
        };
        Self {
            client,
            object: Some(object),
            lifecycle,
        }
    }

    /// Synthetic record for a registered kind with no observed object.
    pub fn missing(client: SharedClient<R>) -> Self {
        Self {
            client,
            object: None,
            lifecycle: Lifecycle::DoesNotExist,
        }
    }

    pub fn plural(&self) -> &str {
        self.client.plural()
    }

    pub fn is_ephemeral(&self) -> bool {
        self.client.is_ephemeral()
    }

    /// Status derived by the kind's client; `None` when there is no object
    /// to derive it from.
    pub fn status_state(&self) -> Option<State> {
        self.object
            .as_ref()
            .map(|object| self.client.status_state(object))
    }

    pub fn has_status(&self, state: State) -> bool {
        self.status_state() == Some(state)
    }
}

impl<R> Clone for Subresource<R> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            object: self.object.clone(),
            lifecycle: self.lifecycle,
        }
    }
}

impl<R: CustomResource> PartialEq for Subresource<R> {
    fn eq(&self, other: &Self) -> bool {
        self.plural() == other.plural()
            && self.lifecycle == other.lifecycle
            && self.object == other.object
    }
}

impl<R> fmt::Debug for Subresource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subresource")
            .field("kind", &self.client.plural())
            .field(
                "name",
                &self.object.as_ref().map(|o| o.metadata.name.as_str()),
            )
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// Identity of an owning resource: its namespace and name.
///
/// Owners in different namespaces may share a name, so grouping never keys
/// on the name alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerKey {
    pub namespace: String,
    pub name: String,
}

impl OwnerKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Sub-resources grouped by their controlling resource.
pub type SubresourceMap<R> = BTreeMap<OwnerKey, Vec<Subresource<R>>>;

/// Corrective action for one owning resource, recomputed every tick.
#[derive(Debug)]
pub struct Action<R> {
    /// New status state for the owning resource, if it should change.
    pub new_state: Option<State>,
    /// Message written alongside `new_state`.
    pub message: String,
    pub to_create: Vec<Subresource<R>>,
    pub to_delete: Vec<Subresource<R>>,
}

impl<R: CustomResource> Action<R> {
    /// Do nothing this tick.
    pub const fn noop() -> Self {
        Self {
            new_state: None,
            message: String::new(),
            to_create: Vec::new(),
            to_delete: Vec::new(),
        }
    }

    /// Move the owning resource to `state`.
    pub fn transition(state: State, message: impl Into<String>) -> Self {
        Self {
            new_state: Some(state),
            message: message.into(),
            ..Self::noop()
        }
    }

    /// Recreate the given sub-resources.
    pub fn create(subs: Vec<Subresource<R>>) -> Self {
        Self {
            to_create: subs,
            ..Self::noop()
        }
    }

    /// Delete every given sub-resource.
    pub fn delete_all(subs: &[Subresource<R>]) -> Self {
        Self {
            to_delete: subs.to_vec(),
            ..Self::noop()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.new_state.is_none() && self.to_create.is_empty() && self.to_delete.is_empty()
    }

    /// Get a description of the action.
    pub fn description(&self) -> String {
        if self.is_noop() {
            return "no-op".to_string();
        }
        let mut parts = Vec::new();
        if let Some(state) = self.new_state {
            parts.push(format!("set status {state}"));
        }
        if !self.to_create.is_empty() {
            parts.push(format!(
                "create [{}]",
                self.to_create.iter().map(Subresource::plural).join(", ")
            ));
        }
        if !self.to_delete.is_empty() {
            parts.push(format!(
                "delete [{}]",
                self.to_delete.iter().map(Subresource::plural).join(", ")
            ));
        }
        parts.join("; ")
    }
}

impl<R: CustomResource> PartialEq for Action<R> {
    fn eq(&self, other: &Self) -> bool {
        self.new_state == other.new_state
            && self.message == other.message
            && self.to_create == other.to_create
            && self.to_delete == other.to_delete
    }
}

impl<R: CustomResource> fmt::Display for Action<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Outcome of one full pass over every owning resource.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Owning resources considered.
    pub owners: usize,
    /// Owning resources that got a non-empty action.
    pub planned: usize,
    /// Successful status writes.
    pub status_updates: usize,
    /// Successful sub-resource creations.
    pub created: usize,
    /// Successful sub-resource deletions.
    pub deleted: usize,
    /// Every error encountered, rendered for logging.
    pub errors: Vec<String>,
}

impl TickReport {
    /// Nothing needed doing and nothing failed.
    pub fn converged(&self) -> bool {
        self.planned == 0 && self.errors.is_empty()
    }
}
