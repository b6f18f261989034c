//! Applying actions.

use std::sync::Arc;

use tracing::{debug, error, info};
use vck_core::CustomResource;

use crate::error::Error;
use crate::status::StatusWriter;
use crate::types::{Action, Subresource};

/// What one [`ActionExecutor::execute`] call achieved.
#[derive(Debug, Default)]
pub struct Execution {
    pub status_updated: bool,
    pub created: usize,
    pub deleted: usize,
    /// Every failed call, in the order attempted.
    pub errors: Vec<Error>,
}

impl Execution {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Applies one owner's [`Action`]: status first, then creates, then
/// deletes, each call awaited in turn.
///
/// A failed call is recorded and the batch carries on. Deleting something
/// that is already gone is not a failure.
pub struct ActionExecutor<R> {
    status: Arc<StatusWriter<R>>,
}

impl<R: CustomResource> ActionExecutor<R> {
    pub fn new(status: Arc<StatusWriter<R>>) -> Self {
        Self { status }
    }

    /// Apply `action` for the owner named `owner`.
    ///
    /// `resource` is the owning resource as fetched this tick; it is the
    /// template input for creates and the base for the status write.
    /// `namespace` is the fallback for deletes when neither the resource nor
    /// the observed object carries one.
    pub async fn execute(
        &self,
        namespace: &str,
        owner: &str,
        resource: Option<&R>,
        action: &Action<R>,
    ) -> Execution {
        let mut execution = Execution::default();

        if let Some(state) = action.new_state {
            match resource {
                Some(resource) => match self.status.write(resource, state, action.message.clone()).await {
                    Ok(_) => {
                        info!(owner, state = %state, message = %action.message, "Updated status");
                        execution.status_updated = true;
                    }
                    Err(e) => {
                        error!(owner, state = %state, error = %e, "Failed to update status");
                        execution.errors.push(Error::status_update(owner, e));
                    }
                },
                None => execution.errors.push(Error::status_update(owner, missing_owner())),
            }
        }

        for sub in &action.to_create {
            let result = match resource {
                Some(resource) => sub.client.create(resource.namespace(), resource).await,
                None => Err(missing_owner()),
            };
            match result {
                Ok(()) => {
                    info!(owner, kind = sub.plural(), "Created sub-resource");
                    execution.created += 1;
                }
                Err(e) => {
                    error!(owner, kind = sub.plural(), error = %e, "Failed to create sub-resource");
                    execution.errors.push(Error::create(owner, sub.plural(), e));
                }
            }
        }

        for sub in &action.to_delete {
            let ns = delete_namespace(namespace, resource, sub);
            match sub.client.delete(ns, owner).await {
                Ok(()) => {
                    info!(owner, kind = sub.plural(), namespace = ns, "Deleted sub-resource");
                    execution.deleted += 1;
                }
                Err(e) if e.is_not_found() => {
                    debug!(owner, kind = sub.plural(), namespace = ns, "Sub-resource already gone");
                }
                Err(e) => {
                    error!(owner, kind = sub.plural(), error = %e, "Failed to delete sub-resource");
                    execution.errors.push(Error::delete(owner, sub.plural(), e));
                }
            }
        }

        execution
    }
}

fn missing_owner() -> vck_core::Error {
    vck_core::Error::invalid_object("owning resource was not fetched")
}

fn delete_namespace<'a, R: CustomResource>(
    fallback: &'a str,
    resource: Option<&'a R>,
    sub: &'a Subresource<R>,
) -> &'a str {
    sub.object
        .as_ref()
        .map(|o| o.metadata.namespace.as_str())
        .or_else(|| resource.map(CustomResource::namespace))
        .filter(|ns| !ns.is_empty())
        .unwrap_or(fallback)
}
