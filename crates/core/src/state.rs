//! State spaces for custom resources and their sub-resources.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The state space shared by a custom resource's desired spec state, its
/// observed status state, and the status derived from each sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum State {
    /// Created, but sub-resources are not all up yet.
    Pending,
    /// The ready state: everything is running as expected.
    Running,
    /// Undeployed after finishing. Terminal.
    Completed,
    /// No longer running as expected. Terminal.
    Failed,
}

impl State {
    /// Whether this state is one of `targets`.
    #[must_use]
    pub fn is_one_of(self, targets: &[Self]) -> bool {
        targets.contains(&self)
    }

    /// Completed and Failed are terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Running" => Ok(Self::Running),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            other => Err(Error::invalid_object(format!("invalid state '{other}'"))),
        }
    }
}

/// Lifecycle phase of an object as seen by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Present and not being deleted.
    Exists,
    /// Absent: never created, already removed, or not found.
    DoesNotExist,
    /// Present with a deletion timestamp set.
    Deleting,
}

impl Lifecycle {
    /// Whether this lifecycle is one of `targets`.
    #[must_use]
    pub fn is_one_of(self, targets: &[Self]) -> bool {
        targets.contains(&self)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists => write!(f, "Exists"),
            Self::DoesNotExist => write!(f, "Does-not-exist"),
            Self::Deleting => write!(f, "Deleting"),
        }
    }
}
