//! Error types for stack operations.

use thiserror::Error;

/// Result type alias for stack operations.
pub type StackResult<T> = Result<T, StackError>;

/// Errors that can occur while changing or watching a stack.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Stack {stack_name} already exists")]
    AlreadyExists { stack_name: String },

    #[error("Invalid change request: {0}")]
    InvalidRequest(String),

    #[error("Change set {change_set_name} for stack {stack_name} was rejected: {source}")]
    ChangeRejected {
        stack_name: String,
        change_set_name: String,
        #[source]
        source: Box<StackError>,
    },

    #[error("Stack {stack_name} failed: {reason}")]
    StreamFailed { stack_name: String, reason: String },

    #[error("Event watcher for stack {stack_name} stopped without a result")]
    WatcherDropped { stack_name: String },

    #[error("Stack {stack_name} has no output {key}")]
    MissingOutput { stack_name: String, key: String },

    #[error("Backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StackError {
    /// Whether the error is the backend reporting an existing stack.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StackError::AlreadyExists { .. })
    }
}
