//! Error types for image builds.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while building or publishing an image.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Container runtime not available: {0}")]
    RuntimeNotAvailable(String),

    #[error("Unknown container runtime: {0}")]
    UnknownRuntime(String),

    #[error("Dockerfile directory not found: {0}")]
    MissingBuildContext(String),

    #[error("Image build failed for {image}: {message}")]
    BuildFailed { image: String, message: String },

    #[error("Registry login failed for {registry}: {message}")]
    LoginFailed { registry: String, message: String },

    #[error("Image push failed for {image}: {message}")]
    PushFailed { image: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
