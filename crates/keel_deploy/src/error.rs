//! Error types for deploy workflows.
//!
//! Every variant names the operation that failed and the resource it was
//! acting on, and carries the underlying cause as its source.

use thiserror::Error;

use keel_core::CoreError;
use keel_runner::RunnerError;
use keel_stack::StackError;

/// Result type alias for workflow operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can abort a workflow.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[source] CoreError),

    #[error("Failed to resolve project {project}: {source}")]
    ProjectLookup {
        project: String,
        #[source]
        source: CoreError,
    },

    #[error("Environment {env} not found in project {project} (available: {available})")]
    EnvironmentNotFound {
        project: String,
        env: String,
        available: String,
    },

    #[error("Failed to resolve environment {env} in project {project}: {source}")]
    EnvironmentLookup {
        project: String,
        env: String,
        #[source]
        source: CoreError,
    },

    #[error("Failed to resolve credentials for {context}: {source}")]
    Credentials {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to resolve identity for {context}: {source}")]
    Identity {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to delegate DNS for project {project} to account {account_id}: {source}")]
    DnsDelegation {
        project: String,
        account_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to render template for stack {stack_name}: {source}")]
    Template {
        stack_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to resolve image repository {repository}: {source}")]
    Repository {
        repository: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to {action} image for application {app}: {source}")]
    Image {
        action: &'static str,
        app: String,
        #[source]
        source: RunnerError,
    },

    #[error("Failed to apply change to stack {stack_name}: {source}")]
    ApplyChange {
        stack_name: String,
        #[source]
        source: StackError,
    },

    #[error("Provisioning of stack {stack_name} failed: {source}")]
    Stream {
        stack_name: String,
        #[source]
        source: StackError,
    },

    #[error("Failed to link environment {env} to project {project}: {source}")]
    LinkToProject {
        project: String,
        env: String,
        #[source]
        source: CoreError,
    },

    #[error("Failed to persist environment {env} of project {project}: {source}")]
    Persist {
        project: String,
        env: String,
        #[source]
        source: CoreError,
    },

    #[error("Failed to resolve endpoint of application {app} in environment {env}: {source}")]
    Endpoint {
        app: String,
        env: String,
        #[source]
        source: anyhow::Error,
    },
}
