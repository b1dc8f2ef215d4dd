//! Contracts for the external services the workflows call.
//!
//! Concrete errors from these services are not known here, so every method
//! returns `anyhow::Result` and the workflows wrap the cause with the step
//! and resource that failed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use keel_core::{CredentialContext, Project};
use keel_runner::RegistryAuth;

/// Parameters for rendering an environment stack template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEnvironmentInput {
    pub name: String,
    pub project: String,
    pub prod: bool,
    pub public_load_balancer: bool,
    /// Root identity of the account that administers the project
    pub tools_account_principal_arn: String,
    /// DNS name of the project, when it has one
    pub project_dns_name: Option<String>,
}

/// Parameters for packaging an application deploy template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRequest {
    pub project: String,
    pub app: String,
    pub env: String,
    pub image_tag: String,
}

/// Renders the environment stack template.
#[cfg_attr(test, mockall::automock)]
pub trait EnvironmentTemplater: Send + Sync {
    fn render(&self, input: &CreateEnvironmentInput) -> anyhow::Result<String>;
}

/// Grants an environment account permissions on the project's DNS zone.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DnsDelegator: Send + Sync {
    async fn delegate_permissions(
        &self,
        context: &CredentialContext,
        project: &Project,
        account_id: &str,
    ) -> anyhow::Result<()>;
}

/// Image registry lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageRepository: Send + Sync {
    /// URI of an existing repository. Never creates one.
    async fn get_repository(&self, context: &CredentialContext, name: &str) -> anyhow::Result<String>;

    /// Short-lived credentials for pushing to the registry.
    async fn get_auth(&self, context: &CredentialContext) -> anyhow::Result<RegistryAuth>;
}

/// Renders the application deploy template.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplatePackager: Send + Sync {
    async fn package(&self, context: &CredentialContext, request: &PackageRequest) -> anyhow::Result<String>;
}

/// Resolves the externally reachable endpoint of a deployed application.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EndpointDescriber: Send + Sync {
    async fn uri(
        &self,
        context: &CredentialContext,
        project: &str,
        app: &str,
        env: &str,
    ) -> anyhow::Result<String>;
}
