//! Project, environment and application records.

use serde::{Deserialize, Serialize};

/// Top-level grouping of environments and applications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    /// Project name
    pub name: String,
    /// Account that owns the project-wide resources
    pub account_id: String,
    /// DNS domain registered for the project, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl Project {
    pub fn new(name: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_id: account_id.into(),
            domain: None,
        }
    }

    /// Set the project's DNS domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Environments of a project with a domain need delegated DNS permissions.
    pub fn requires_dns_delegation(&self) -> bool {
        self.domain.as_deref().is_some_and(|d| !d.is_empty())
    }
}

/// A named deployment target inside a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Environment {
    /// Parent project name
    pub project: String,
    /// Environment name
    pub name: String,
    /// Account the environment's stack lives in
    pub account_id: String,
    /// Region the environment's stack lives in
    pub region: String,
    /// Role assumed to manage resources inside the environment
    pub manager_role_arn: String,
    /// Role the stack backend uses to execute change sets
    pub execution_role_arn: String,
    /// Whether the environment is marked as production
    #[serde(default)]
    pub prod: bool,
}

impl Environment {
    /// `account/region` pair, as used when extending project resources.
    pub fn location(&self) -> String {
        format!("{}/{}", self.account_id, self.region)
    }
}

/// A deployable unit inside a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Application {
    /// Parent project name
    pub project: String,
    /// Application name
    pub name: String,
    /// Declared application type (e.g. "Load Balanced Web App")
    #[serde(rename = "type")]
    pub app_type: String,
}

impl Application {
    pub fn new(
        project: impl Into<String>,
        name: impl Into<String>,
        app_type: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
            app_type: app_type.into(),
        }
    }

    /// Name of the image repository holding the application's images.
    pub fn repository_name(&self) -> String {
        Self::repository_for(&self.project, &self.name)
    }

    /// Repository name of application `name` in `project`.
    pub fn repository_for(project: &str, name: &str) -> String {
        format!("{}/{}", project, name)
    }
}
