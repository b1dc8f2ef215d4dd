//! Application deploy.
//!
//! A single pass that stops at the first failure: resolve the environment,
//! build and push the image, package the template, apply it to the
//! application stack in the environment's account, then look up the
//! endpoint. Nothing is undone on failure; an image pushed before a failed
//! apply stays in the registry.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use keel_core::{
    validate_application_name, validate_environment_name, Application, CoreError,
    CredentialContext, CredentialProvider, Environment, ProjectRegistry,
};
use keel_runner::ImageBuilder;
use keel_stack::{app_stack_name, stack_tags, ChangeCoordinator, ChangeKind, StackChangeRequest};

use crate::collaborators::{EndpointDescriber, ImageRepository, PackageRequest, TemplatePackager};
use crate::error::{DeployError, DeployResult};

/// Steps of an application deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppDeployStep {
    Start,
    EnvironmentResolved,
    CredentialsResolved,
    RepositoryResolved,
    ImageBuilt,
    RegistryAuthenticated,
    ImagePushed,
    TemplatePackaged,
    ChangeApplied,
    EndpointResolved,
    Done,
    Aborted,
}

impl AppDeployStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::EnvironmentResolved => "environment resolved",
            Self::CredentialsResolved => "credentials resolved",
            Self::RepositoryResolved => "repository resolved",
            Self::ImageBuilt => "image built",
            Self::RegistryAuthenticated => "registry authenticated",
            Self::ImagePushed => "image pushed",
            Self::TemplatePackaged => "template packaged",
            Self::ChangeApplied => "change applied",
            Self::EndpointResolved => "endpoint resolved",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for AppDeployStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for an application deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDeployRequest {
    pub project: String,
    pub app: String,
    pub env: String,
    pub image_tag: String,
    /// Directory holding the application's Dockerfile
    pub dockerfile_dir: PathBuf,
}

impl AppDeployRequest {
    pub fn new(
        project: impl Into<String>,
        app: impl Into<String>,
        env: impl Into<String>,
        image_tag: impl Into<String>,
        dockerfile_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project: project.into(),
            app: app.into(),
            env: env.into(),
            image_tag: image_tag.into(),
            dockerfile_dir: dockerfile_dir.into(),
        }
    }
}

/// Successful end of a deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDeployOutcome {
    pub stack_name: String,
    pub change_set_name: String,
    /// Externally reachable endpoint of the application
    pub endpoint: String,
}

/// What a deploy did.
#[derive(Debug)]
pub struct AppDeployReport {
    /// Steps reached, in order, ending in `Done` or `Aborted`
    pub steps: Vec<AppDeployStep>,
    /// Change-set name, once one was generated
    pub change_set_name: Option<String>,
    pub result: DeployResult<AppDeployOutcome>,
}

impl AppDeployReport {
    pub fn reached(&self, step: AppDeployStep) -> bool {
        self.steps.contains(&step)
    }

    pub fn into_result(self) -> DeployResult<AppDeployOutcome> {
        self.result
    }
}

/// Credential contexts of one deploy.
#[derive(Debug, Clone)]
struct DeployContexts {
    /// Tools account in the environment's region
    registry: CredentialContext,
    /// Environment manager role in the environment's account
    environment: CredentialContext,
    /// Tools account for project-level lookups
    project: CredentialContext,
}

/// Deploys applications.
pub struct AppDeployWorkflow {
    registry: Arc<dyn ProjectRegistry>,
    credentials: Arc<dyn CredentialProvider>,
    repository: Arc<dyn ImageRepository>,
    builder: Arc<dyn ImageBuilder>,
    packager: Arc<dyn TemplatePackager>,
    endpoints: Arc<dyn EndpointDescriber>,
    coordinator: ChangeCoordinator,
}

impl AppDeployWorkflow {
    pub fn new(
        registry: Arc<dyn ProjectRegistry>,
        credentials: Arc<dyn CredentialProvider>,
        repository: Arc<dyn ImageRepository>,
        builder: Arc<dyn ImageBuilder>,
        packager: Arc<dyn TemplatePackager>,
        endpoints: Arc<dyn EndpointDescriber>,
        coordinator: ChangeCoordinator,
    ) -> Self {
        Self {
            registry,
            credentials,
            repository,
            builder,
            packager,
            endpoints,
            coordinator,
        }
    }

    /// Run the deploy. Always returns a report; the outcome is in `result`.
    pub async fn run(&self, request: &AppDeployRequest) -> AppDeployReport {
        info!(
            "Deploying {}:{} to environment {}",
            request.app, request.image_tag, request.env
        );

        let mut run = Run {
            steps: vec![AppDeployStep::Start],
            change_set_name: None,
        };
        let result = self.execute(request, &mut run).await;

        match &result {
            Ok(outcome) => {
                run.reach(AppDeployStep::Done);
                info!("Deployed {}, you can access it at {}", request.app, outcome.endpoint);
            }
            Err(e) => {
                run.reach(AppDeployStep::Aborted);
                error!("Deploy of {} aborted: {}", request.app, e);
            }
        }

        AppDeployReport {
            steps: run.steps,
            change_set_name: run.change_set_name,
            result,
        }
    }

    async fn execute(&self, request: &AppDeployRequest, run: &mut Run) -> DeployResult<AppDeployOutcome> {
        validate_application_name(&request.app).map_err(DeployError::InvalidInput)?;
        validate_environment_name(&request.env).map_err(DeployError::InvalidInput)?;

        let environment = self.target_environment(&request.project, &request.env).await?;
        run.reach(AppDeployStep::EnvironmentResolved);

        let contexts = self.resolve_contexts(&environment).await?;
        run.reach(AppDeployStep::CredentialsResolved);

        let repository = Application::repository_for(&request.project, &request.app);
        let uri = self
            .repository
            .get_repository(&contexts.registry, &repository)
            .await
            .map_err(|source| DeployError::Repository {
                repository: repository.clone(),
                source,
            })?;
        run.reach(AppDeployStep::RepositoryResolved);

        self.builder
            .build(&uri, &request.image_tag, &request.dockerfile_dir)
            .await
            .map_err(|source| image_error("build", request, source))?;
        run.reach(AppDeployStep::ImageBuilt);

        let auth = self
            .repository
            .get_auth(&contexts.registry)
            .await
            .map_err(|source| DeployError::Repository {
                repository: repository.clone(),
                source,
            })?;
        self.builder
            .login(&uri, &auth)
            .await
            .map_err(|source| image_error("authenticate", request, source))?;
        run.reach(AppDeployStep::RegistryAuthenticated);

        self.builder
            .push(&uri, &request.image_tag)
            .await
            .map_err(|source| image_error("push", request, source))?;
        run.reach(AppDeployStep::ImagePushed);

        let stack_name = app_stack_name(&request.project, &environment.name, &request.app);
        let package = PackageRequest {
            project: request.project.clone(),
            app: request.app.clone(),
            env: environment.name.clone(),
            image_tag: request.image_tag.clone(),
        };
        let template = self
            .packager
            .package(&contexts.project, &package)
            .await
            .map_err(|source| DeployError::Template {
                stack_name: stack_name.clone(),
                source,
            })?;
        run.reach(AppDeployStep::TemplatePackaged);

        let change = StackChangeRequest::new(&stack_name, template, ChangeKind::CreateOrUpdate)
            .with_execution_role(&environment.execution_role_arn)
            .with_tags(stack_tags(&request.project, &environment.name, Some(&request.app)));
        run.change_set_name = Some(change.change_set_name.clone());

        self.coordinator
            .apply_change(&contexts.environment, &change)
            .await
            .map_err(|source| DeployError::ApplyChange {
                stack_name: stack_name.clone(),
                source,
            })?;
        run.reach(AppDeployStep::ChangeApplied);

        let endpoint = self
            .endpoints
            .uri(&contexts.project, &request.project, &request.app, &environment.name)
            .await
            .map_err(|source| DeployError::Endpoint {
                app: request.app.clone(),
                env: environment.name.clone(),
                source,
            })?;
        run.reach(AppDeployStep::EndpointResolved);

        Ok(AppDeployOutcome {
            stack_name,
            change_set_name: change.change_set_name,
            endpoint,
        })
    }

    /// Look up the target environment, naming the alternatives when it is missing.
    async fn target_environment(&self, project: &str, env: &str) -> DeployResult<Environment> {
        match self.registry.get_environment(project, env).await {
            Ok(environment) => Ok(environment),
            Err(CoreError::NoSuchEnvironment { .. }) => {
                let available = self
                    .registry
                    .list_environments(project)
                    .await
                    .map_err(|source| DeployError::EnvironmentLookup {
                        project: project.to_string(),
                        env: env.to_string(),
                        source,
                    })?;
                let names: Vec<String> = available.into_iter().map(|e| e.name).collect();
                Err(DeployError::EnvironmentNotFound {
                    project: project.to_string(),
                    env: env.to_string(),
                    available: if names.is_empty() {
                        "none".to_string()
                    } else {
                        names.join(", ")
                    },
                })
            }
            Err(CoreError::NoSuchProject(_)) => Err(DeployError::ProjectLookup {
                project: project.to_string(),
                source: CoreError::NoSuchProject(project.to_string()),
            }),
            Err(source) => Err(DeployError::EnvironmentLookup {
                project: project.to_string(),
                env: env.to_string(),
                source,
            }),
        }
    }

    async fn resolve_contexts(&self, environment: &Environment) -> DeployResult<DeployContexts> {
        let registry = self
            .credentials
            .default_with_region(&environment.region)
            .await
            .map_err(|source| DeployError::Credentials {
                context: format!("default in region {}", environment.region),
                source,
            })?;
        let env_ctx = self
            .credentials
            .from_role(&environment.manager_role_arn, &environment.region)
            .await
            .map_err(|source| DeployError::Credentials {
                context: format!("role {}", environment.manager_role_arn),
                source,
            })?;
        let project = self
            .credentials
            .default_context()
            .await
            .map_err(|source| DeployError::Credentials {
                context: "default".to_string(),
                source,
            })?;

        debug!(
            "Resolved contexts: registry {}, environment {}, project {}",
            registry, env_ctx, project
        );
        Ok(DeployContexts {
            registry,
            environment: env_ctx,
            project,
        })
    }
}

impl std::fmt::Debug for AppDeployWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppDeployWorkflow").finish_non_exhaustive()
    }
}

struct Run {
    steps: Vec<AppDeployStep>,
    change_set_name: Option<String>,
}

impl Run {
    fn reach(&mut self, step: AppDeployStep) {
        debug!("Application deploy reached: {}", step);
        self.steps.push(step);
    }
}

fn image_error(action: &'static str, request: &AppDeployRequest, source: keel_runner::RunnerError) -> DeployError {
    DeployError::Image {
        action,
        app: request.app.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockEndpointDescriber, MockImageRepository, MockTemplatePackager};
    use keel_core::{MemoryRegistry, Project, StaticCredentials};
    use keel_runner::{RecordingBuilder, RegistryAuth};
    use keel_stack::ScriptedBackend;

    const REPO_URI: &str = "111111111111.dkr.ecr.us-west-2.amazonaws.com/shop/frontend";

    fn environment(name: &str) -> Environment {
        Environment {
            project: "shop".to_string(),
            name: name.to_string(),
            account_id: "222222222222".to_string(),
            region: "us-west-2".to_string(),
            manager_role_arn: "arn:aws:iam::222222222222:role/manager".to_string(),
            execution_role_arn: "arn:aws:iam::222222222222:role/exec".to_string(),
            prod: false,
        }
    }

    async fn registry() -> MemoryRegistry {
        let registry = MemoryRegistry::new();
        registry.add_project(Project::new("shop", "111111111111")).await;
        registry.add_environment(environment("test")).await;
        registry
    }

    fn repository() -> MockImageRepository {
        let mut repository = MockImageRepository::new();
        repository
            .expect_get_repository()
            .withf(|ctx, name| {
                name == "shop/frontend" && ctx == &CredentialContext::default_chain().with_region("us-west-2")
            })
            .returning(|_, _| Ok(REPO_URI.to_string()));
        repository
            .expect_get_auth()
            .returning(|_| Ok(RegistryAuth::new("AWS", "token")));
        repository
    }

    fn packager() -> MockTemplatePackager {
        let mut packager = MockTemplatePackager::new();
        packager
            .expect_package()
            .withf(|ctx, req| {
                ctx == &CredentialContext::default_chain()
                    && req.env == "test"
                    && req.image_tag == "v1"
            })
            .returning(|_, _| Ok("{}".to_string()));
        packager
    }

    fn endpoints() -> MockEndpointDescriber {
        let mut endpoints = MockEndpointDescriber::new();
        endpoints
            .expect_uri()
            .returning(|_, _, _, _| Ok("http://shop-test.example.com".to_string()));
        endpoints
    }

    fn workflow(
        registry: MemoryRegistry,
        repository: MockImageRepository,
        builder: &RecordingBuilder,
        packager: MockTemplatePackager,
        backend: &ScriptedBackend,
    ) -> AppDeployWorkflow {
        AppDeployWorkflow::new(
            Arc::new(registry),
            Arc::new(StaticCredentials::new()),
            Arc::new(repository),
            Arc::new(builder.clone()),
            Arc::new(packager),
            Arc::new(endpoints()),
            ChangeCoordinator::new(Arc::new(backend.clone())),
        )
    }

    fn request(env: &str) -> AppDeployRequest {
        AppDeployRequest::new("shop", "frontend", env, "v1", "/src/frontend")
    }

    #[tokio::test]
    async fn test_deploy_applies_change_in_environment_account() {
        let builder = RecordingBuilder::new();
        let backend = ScriptedBackend::new();

        let report = workflow(registry().await, repository(), &builder, packager(), &backend)
            .run(&request("test"))
            .await;

        let outcome = report.result.unwrap();
        assert_eq!(outcome.stack_name, "shop-test-frontend");
        assert_eq!(outcome.endpoint, "http://shop-test.example.com");
        assert_eq!(builder.methods(), vec!["build", "login", "push"]);

        let change = &backend.changes()[0];
        assert_eq!(
            change.context,
            CredentialContext::assumed_role("arn:aws:iam::222222222222:role/manager", "us-west-2")
        );
        assert_eq!(
            change.request.execution_role_arn.as_deref(),
            Some("arn:aws:iam::222222222222:role/exec")
        );
        assert_eq!(change.request.tags.len(), 3);
        assert_eq!(change.request.change_set_name, outcome.change_set_name);
    }

    #[tokio::test]
    async fn test_missing_environment_names_available_ones() {
        let builder = RecordingBuilder::new();
        let backend = ScriptedBackend::new();
        let registry = registry().await;
        registry.add_environment(environment("prod")).await;

        let report = workflow(registry, MockImageRepository::new(), &builder, MockTemplatePackager::new(), &backend)
            .run(&request("staging"))
            .await;

        match report.result {
            Err(DeployError::EnvironmentNotFound { available, .. }) => assert_eq!(available, "prod, test"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(report.steps, vec![AppDeployStep::Start, AppDeployStep::Aborted]);
        assert!(builder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_build_failure_stops_before_login() {
        let builder = RecordingBuilder::new().simulate_failure("build", "no Dockerfile");
        let backend = ScriptedBackend::new();

        let mut repository = MockImageRepository::new();
        repository
            .expect_get_repository()
            .returning(|_, _| Ok(REPO_URI.to_string()));
        repository.expect_get_auth().times(0);

        let report = workflow(registry().await, repository, &builder, MockTemplatePackager::new(), &backend)
            .run(&request("test"))
            .await;

        assert!(matches!(report.result, Err(DeployError::Image { action: "build", .. })));
        assert_eq!(builder.methods(), vec!["build"]);
        assert!(report.change_set_name.is_none());
    }

    #[tokio::test]
    async fn test_apply_failure_keeps_change_set_name() {
        let builder = RecordingBuilder::new();
        let backend = ScriptedBackend::new().simulate_rejection("Template format error");

        let report = workflow(registry().await, repository(), &builder, packager(), &backend)
            .run(&request("test"))
            .await;

        assert!(matches!(report.result, Err(DeployError::ApplyChange { .. })));
        assert!(report.reached(AppDeployStep::TemplatePackaged));
        assert!(!report.reached(AppDeployStep::ChangeApplied));
        let name = report.change_set_name.unwrap();
        assert!(name.starts_with("shop-test-frontend-"));
    }
}
