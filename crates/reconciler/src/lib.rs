//! Level-triggered reconciliation for volume managers.
//!
//! This crate keeps each custom resource's reported status consistent with
//! the platform sub-resources provisioned on its behalf:
//!
//! - **Grouping**: every registered kind is listed and each object is filed
//!   under the custom resource its controller reference names
//! - **Planning**: a priority-ordered decision table turns one owner's
//!   state and its sub-resources into a single corrective action
//! - **Execution**: status write, then creates, then deletes; failures are
//!   recorded and the batch carries on
//! - **Loop**: one full pass per interval until stopped
//!
//! # Key Concepts
//!
//! ## Ephemeral kinds
//!
//! Pods, services, ingresses and autoscalers can be destroyed and recreated
//! freely, so a missing or failed one is recreated. Volumes, claims, jobs and
//! deployments are not: losing one fails the owning resource, and the next
//! tick undeploys everything.
//!
//! ## Two writers
//!
//! The edge-triggered [`hooks`] path and the loop both write status. Both go
//! through one [`StatusWriter`], which serializes writes per resource; the
//! store's version check rejects writes based on a stale copy.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use vck_core::VolumeManager;
//! use vck_reconciler::{
//!     InMemoryStore, InMemorySubresourceClient, LoopStopper, ReconcilerBuilder, SubresourceKind,
//! };
//!
//! #[tokio::main]
//! async fn main() -> vck_reconciler::Result<()> {
//!     let store = Arc::new(InMemoryStore::volume_managers());
//!     let reconciler = ReconcilerBuilder::<VolumeManager>::new()
//!         .namespace("default")
//!         .with_store(store)
//!         .with_clients(SubresourceKind::ALL.map(|kind| {
//!             Arc::new(InMemorySubresourceClient::for_kind(kind)) as _
//!         }))
//!         .build()?;
//!
//!     let (stopper, signal) = LoopStopper::new();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         stopper.stop();
//!     });
//!     reconciler.run(signal, Duration::from_secs(10)).await
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod client;
pub mod config;
pub mod error;
pub mod execute;
pub mod group;
pub mod hooks;
pub mod kinds;
pub mod r#loop;
pub mod memory;
pub mod plan;
pub mod reconciler;
pub mod status;
pub mod types;

// Re-export main types
pub use client::{CustomResourceStore, SharedClient, SharedStore, SubresourceClient};
pub use config::ReconcilerConfig;
pub use error::{Error, Result};
pub use execute::{ActionExecutor, Execution};
pub use group::{Grouping, OwnershipGrouper};
pub use hooks::{DataHandler, Hooks, SharedHandler, VolumeManagerHooks};
pub use kinds::SubresourceKind;
pub use memory::{InMemoryStore, InMemorySubresourceClient};
pub use plan::{ActionPlanner, Plan, decide};
pub use r#loop::{LoopStopper, StopSignal};
pub use reconciler::{Reconciler, ReconcilerBuilder};
pub use status::StatusWriter;
pub use types::{Action, OwnerKey, Subresource, SubresourceMap, TickReport};
