//! Core error types shared by every store and client implementation.
//!
//! All errors are explicit and recoverable. The reconciler treats every
//! variant except `NotFound` as a transient failure for the current tick.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by custom resource stores and sub-resource clients.
#[derive(Debug, Error)]
pub enum Error {
    /// The addressed object does not exist.
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// A version-checked write lost against a concurrent writer.
    #[error("conflict writing {kind} '{name}': {reason}")]
    Conflict {
        kind: String,
        name: String,
        reason: String,
    },

    /// Any other API call failure.
    #[error("{operation} failed: {reason}")]
    Api { operation: String, reason: String },

    /// An object that cannot be interpreted as the expected record.
    #[error("invalid object: {reason}")]
    InvalidObject { reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a not found error.
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a write conflict error.
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an API call error.
    pub fn api(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid object error.
    pub fn invalid_object(reason: impl Into<String>) -> Self {
        Self::InvalidObject {
            reason: reason.into(),
        }
    }

    /// Whether this error means the object is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error is a lost optimistic-concurrency race.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
