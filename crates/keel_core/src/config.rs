//! Workspace configuration.
//!
//! Loaded from a YAML file (conventionally `keel.yml`). Every field has a
//! default, so an empty document is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeelConfig {
    pub environment: EnvironmentSettings,
    pub stream: StreamSettings,
    pub runner: RunnerSettings,
}

/// Settings for environment bring-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Whether new environments get an internet-facing load balancer
    pub public_load_balancer: bool,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            public_load_balancer: true,
        }
    }
}

/// Settings for provisioning event streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamSettings {
    /// Capacity of the event channel between watcher and correlator
    pub event_buffer: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self { event_buffer: 64 }
    }
}

/// Settings for the container image builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerSettings {
    /// "docker" or "podman"; auto-detected when absent
    pub runtime: Option<String>,
    /// Log commands instead of executing them
    pub dry_run: bool,
}

impl KeelConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> CoreResult<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        debug!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.stream.event_buffer == 0 {
            return Err(CoreError::Config(
                "stream.event_buffer must be greater than zero".to_string(),
            ));
        }
        if let Some(runtime) = &self.runner.runtime {
            if runtime != "docker" && runtime != "podman" {
                return Err(CoreError::Config(format!(
                    "runner.runtime must be docker or podman, got {}",
                    runtime
                )));
            }
        }
        Ok(())
    }
}
