//! Configuration for the reconciler.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use vck_core::{GroupVersionKind, VolumeManager};

use crate::error::{Error, Result};

pub const ENV_NAMESPACE: &str = "VCK_NAMESPACE";
pub const ENV_INTERVAL_SECS: &str = "VCK_RECONCILE_INTERVAL_SECS";
pub const ENV_TARGET_GROUP: &str = "VCK_TARGET_GROUP";
pub const ENV_TARGET_VERSION: &str = "VCK_TARGET_VERSION";
pub const ENV_TARGET_KIND: &str = "VCK_TARGET_KIND";

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Namespace scope; empty means all namespaces.
    #[serde(default)]
    pub namespace: String,

    /// Time between tick starts.
    #[serde(with = "duration_secs", default = "default_interval")]
    pub interval: Duration,

    /// Type whose controller references mark a sub-resource as managed.
    #[serde(default = "VolumeManager::gvk")]
    pub target: GroupVersionKind,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            interval: default_interval(),
            target: VolumeManager::gvk(),
        }
    }
}

impl ReconcilerConfig {
    /// Create a config scoped to one namespace.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Set the interval.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the managed type.
    #[must_use]
    pub fn target(mut self, target: GroupVersionKind) -> Self {
        self.target = target;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup, starting from the defaults.
    /// Unparsable values are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            config.namespace = namespace;
        }

        if let Some(secs) = lookup(ENV_INTERVAL_SECS) {
            match secs.trim().parse::<u64>() {
                Ok(secs) => config.interval = Duration::from_secs(secs),
                Err(e) => warn!(key = ENV_INTERVAL_SECS, value = %secs, error = %e, "Ignoring invalid interval"),
            }
        }

        if let Some(group) = lookup(ENV_TARGET_GROUP) {
            config.target.group = group;
        }
        if let Some(version) = lookup(ENV_TARGET_VERSION) {
            config.target.version = version;
        }
        if let Some(kind) = lookup(ENV_TARGET_KIND) {
            config.target.kind = kind;
        }

        config
    }

    /// Load configuration from a file: JSON for `.json`, TOML otherwise.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoad` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::config_load(path, e.to_string()))?;

        if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).map_err(|e| Error::config_load(path, e.to_string()))
        } else {
            toml::from_str(&content)
                .map_err(|e| Error::config_load(path, format!("Failed to parse config: {e}")))
        }
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero interval or an incomplete target.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::invalid_config("interval must be non-zero"));
        }
        if self.target.version.is_empty() {
            return Err(Error::invalid_config("target version is required"));
        }
        if self.target.kind.is_empty() {
            return Err(Error::invalid_config("target kind is required"));
        }
        Ok(())
    }
}

const fn default_interval() -> Duration {
    Duration::from_secs(10)
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
