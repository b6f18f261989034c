//! Error types for the reconciler crate.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
///
/// Nothing here is fatal to the loop: executor errors are collected per
/// owner and logged, then the next tick re-derives everything.
#[derive(Debug, Error)]
pub enum Error {
    /// A store or client call failed.
    #[error(transparent)]
    Core(#[from] vck_core::Error),

    /// Writing the owning resource's status failed.
    #[error("failed to update status of '{owner}': {source}")]
    StatusUpdate {
        owner: String,
        source: vck_core::Error,
    },

    /// Creating a sub-resource failed.
    #[error("failed to create {kind} for '{owner}': {source}")]
    Create {
        owner: String,
        kind: String,
        source: vck_core::Error,
    },

    /// Deleting a sub-resource failed.
    #[error("failed to delete {kind} for '{owner}': {source}")]
    Delete {
        owner: String,
        kind: String,
        source: vck_core::Error,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Configuration file could not be read or parsed.
    #[error("failed to load config '{}': {reason}", .path.display())]
    ConfigLoad { path: PathBuf, reason: String },
}

impl Error {
    /// Create a status update error.
    pub fn status_update(owner: impl Into<String>, source: vck_core::Error) -> Self {
        Self::StatusUpdate {
            owner: owner.into(),
            source,
        }
    }

    /// Create a sub-resource creation error.
    pub fn create(owner: impl Into<String>, kind: impl Into<String>, source: vck_core::Error) -> Self {
        Self::Create {
            owner: owner.into(),
            kind: kind.into(),
            source,
        }
    }

    /// Create a sub-resource deletion error.
    pub fn delete(owner: impl Into<String>, kind: impl Into<String>, source: vck_core::Error) -> Self {
        Self::Delete {
            owner: owner.into(),
            kind: kind.into(),
            source,
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a config load error.
    pub fn config_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the underlying failure was a lost write race.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        match self {
            Self::Core(e)
            | Self::StatusUpdate { source: e, .. }
            | Self::Create { source: e, .. }
            | Self::Delete { source: e, .. } => e.is_conflict(),
            Self::InvalidConfig { .. } | Self::ConfigLoad { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_error_display() {
        let err = Error::create("vol1", "pods", vck_core::Error::api("create pods", "quota exceeded"));
        let msg = err.to_string();
        assert!(msg.contains("pods"));
        assert!(msg.contains("vol1"));
        assert!(msg.contains("quota exceeded"));
    }

    #[test]
    fn test_conflict_detection() {
        let err = Error::status_update(
            "vol1",
            vck_core::Error::conflict("volumemanagers", "vol1", "stale resource version"),
        );
        assert!(err.is_conflict());
        assert!(!Error::invalid_config("zero interval").is_conflict());
    }
}
