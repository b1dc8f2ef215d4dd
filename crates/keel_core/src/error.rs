//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Project not found: {0}")]
    NoSuchProject(String),

    #[error("Environment {name} not found in project {project}")]
    NoSuchEnvironment { project: String, name: String },

    #[error("Environment {name} already exists in project {project}")]
    EnvironmentExists { project: String, name: String },

    #[error("Invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Registry error: {0}")]
    Registry(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CoreError {
    /// Whether the error means a required record is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::NoSuchProject(_) | CoreError::NoSuchEnvironment { .. }
        )
    }
}
