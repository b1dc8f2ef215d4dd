//! Project registry contract and an in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::model::{Environment, Project};

/// Store of project and environment records, keyed by project + name.
#[async_trait]
pub trait ProjectRegistry: Send + Sync {
    /// Fetch a project by name.
    async fn get_project(&self, name: &str) -> CoreResult<Project>;

    /// Fetch an environment of a project.
    async fn get_environment(&self, project: &str, name: &str) -> CoreResult<Environment>;

    /// List all environments of a project.
    async fn list_environments(&self, project: &str) -> CoreResult<Vec<Environment>>;

    /// Persist a new environment record.
    async fn create_environment(&self, environment: &Environment) -> CoreResult<()>;

    /// Extend project-wide resources to the environment's account/region.
    async fn link_environment_to_project(
        &self,
        project: &Project,
        environment: &Environment,
    ) -> CoreResult<()>;
}

#[derive(Default)]
struct RegistryState {
    projects: HashMap<String, Project>,
    environments: HashMap<(String, String), Environment>,
    /// Linked `account/region` locations per project, in link order
    links: HashMap<String, Vec<String>>,
    /// Simulated failures keyed by method name
    failures: HashMap<String, String>,
}

/// In-memory registry.
///
/// Useful for tests and dry runs. Failures can be injected per method with
/// [`MemoryRegistry::simulate_failure`].
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a project record.
    pub async fn add_project(&self, project: Project) {
        debug!("Registering project: {}", project.name);
        self.state
            .write()
            .await
            .projects
            .insert(project.name.clone(), project);
    }

    /// Add an environment record directly, bypassing failure simulation.
    pub async fn add_environment(&self, environment: Environment) {
        let key = (environment.project.clone(), environment.name.clone());
        self.state.write().await.environments.insert(key, environment);
    }

    /// Make every call of `method` fail with `message`.
    pub async fn simulate_failure(&self, method: &str, message: impl Into<String>) {
        self.state
            .write()
            .await
            .failures
            .insert(method.to_string(), message.into());
    }

    /// Locations linked to a project.
    pub async fn links(&self, project: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .links
            .get(project)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of environment records stored.
    pub async fn environment_count(&self) -> usize {
        self.state.read().await.environments.len()
    }

    fn check_failure(state: &RegistryState, method: &str) -> CoreResult<()> {
        match state.failures.get(method) {
            Some(message) => Err(CoreError::Registry(anyhow::anyhow!(message.clone()))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProjectRegistry for MemoryRegistry {
    async fn get_project(&self, name: &str) -> CoreResult<Project> {
        let state = self.state.read().await;
        Self::check_failure(&state, "get_project")?;
        state
            .projects
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::NoSuchProject(name.to_string()))
    }

    async fn get_environment(&self, project: &str, name: &str) -> CoreResult<Environment> {
        let state = self.state.read().await;
        Self::check_failure(&state, "get_environment")?;
        state
            .environments
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::NoSuchEnvironment {
                project: project.to_string(),
                name: name.to_string(),
            })
    }

    async fn list_environments(&self, project: &str) -> CoreResult<Vec<Environment>> {
        let state = self.state.read().await;
        Self::check_failure(&state, "list_environments")?;
        let mut envs: Vec<Environment> = state
            .environments
            .values()
            .filter(|e| e.project == project)
            .cloned()
            .collect();
        envs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(envs)
    }

    async fn create_environment(&self, environment: &Environment) -> CoreResult<()> {
        let mut state = self.state.write().await;
        Self::check_failure(&state, "create_environment")?;
        let key = (environment.project.clone(), environment.name.clone());
        if state.environments.contains_key(&key) {
            return Err(CoreError::EnvironmentExists {
                project: environment.project.clone(),
                name: environment.name.clone(),
            });
        }
        debug!(
            "Storing environment {} in project {}",
            environment.name, environment.project
        );
        state.environments.insert(key, environment.clone());
        Ok(())
    }

    async fn link_environment_to_project(
        &self,
        project: &Project,
        environment: &Environment,
    ) -> CoreResult<()> {
        let mut state = self.state.write().await;
        Self::check_failure(&state, "link_environment_to_project")?;
        let location = environment.location();
        let links = state.links.entry(project.name.clone()).or_default();
        if !links.contains(&location) {
            links.push(location);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRegistry").finish_non_exhaustive()
    }
}
