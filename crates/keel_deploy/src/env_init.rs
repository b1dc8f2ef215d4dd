//! Environment bring-up.
//!
//! Creates the environment stack in the target account, follows its
//! provisioning events, then registers the result with the project. The
//! workflow records every step it reaches so a failed run shows exactly
//! which steps completed before it aborted.
//!
//! Re-running is safe: a stack that already exists ends the run
//! successfully right after the change is applied. Steps after that point
//! are not guarded, so a run that failed while linking or persisting
//! repeats them on retry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use keel_core::{
    validate_environment_name, CredentialContext, CredentialProvider, EnvironmentSettings,
    Environment, IdentityResolver, Project, ProjectRegistry,
};
use keel_stack::{
    correlate, env_stack_name, stack_tags, ChangeCoordinator, ChangeKind, PhaseRow, PhaseTable,
    ProgressPhase, StackChangeRequest, StackOutputs,
};

use crate::collaborators::{CreateEnvironmentInput, DnsDelegator, EnvironmentTemplater};
use crate::error::{DeployError, DeployResult};
use crate::progress::{ProgressReporter, TracingProgress};

/// Stack output holding the role that manages the environment.
pub const MANAGER_ROLE_OUTPUT: &str = "EnvironmentManagerRoleARN";
/// Stack output holding the role that executes change sets in the environment.
pub const EXECUTION_ROLE_OUTPUT: &str = "CFNExecutionRoleARN";

/// Steps of an environment bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvInitStep {
    Start,
    ProjectResolved,
    /// Only reached when the project has a DNS domain
    DnsDelegated,
    /// The project has a DNS domain owned by the environment's account
    DnsSkipped,
    ChangeApplied,
    EventsStreamed,
    LinkedToProject,
    Persisted,
    Done,
    Aborted,
}

impl EnvInitStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ProjectResolved => "project resolved",
            Self::DnsDelegated => "dns delegated",
            Self::DnsSkipped => "dns skipped",
            Self::ChangeApplied => "change applied",
            Self::EventsStreamed => "events streamed",
            Self::LinkedToProject => "linked to project",
            Self::Persisted => "persisted",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for EnvInitStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for an environment bring-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvInitRequest {
    pub project: String,
    pub env_name: String,
    /// Local profile holding credentials for the environment's account
    pub profile: String,
    pub prod: bool,
}

impl EnvInitRequest {
    pub fn new(
        project: impl Into<String>,
        env_name: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            env_name: env_name.into(),
            profile: profile.into(),
            prod: false,
        }
    }

    pub fn production(mut self) -> Self {
        self.prod = true;
        self
    }
}

/// Successful end of a bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvInitOutcome {
    /// The stack was provisioned and the environment registered.
    Created(Environment),
    /// The stack existed already; nothing was streamed or written.
    AlreadyExists { stack_name: String },
}

/// What a bring-up did.
#[derive(Debug)]
pub struct EnvInitReport {
    /// Steps reached, in order, ending in `Done` or `Aborted`
    pub steps: Vec<EnvInitStep>,
    /// Progress rows as last reported
    pub rows: Vec<PhaseRow>,
    pub result: DeployResult<EnvInitOutcome>,
}

impl EnvInitReport {
    pub fn reached(&self, step: EnvInitStep) -> bool {
        self.steps.contains(&step)
    }

    pub fn into_result(self) -> DeployResult<EnvInitOutcome> {
        self.result
    }
}

/// Progress phases of an environment stack, in display order.
pub fn environment_phases() -> PhaseTable {
    PhaseTable::new()
        .phase(ProgressPhase::new("VPC", 1, |e| e.resource_type == "AWS::EC2::VPC"))
        .phase(ProgressPhase::new("Internet gateway", 2, |e| {
            e.resource_type == "AWS::EC2::InternetGateway"
                || e.resource_type == "AWS::EC2::VPCGatewayAttachment"
        }))
        .phase(ProgressPhase::new("Public subnets", 2, |e| {
            e.resource_type == "AWS::EC2::Subnet" && e.logical_name.starts_with("Public")
        }))
        .phase(ProgressPhase::new("Private subnets", 2, |e| {
            e.resource_type == "AWS::EC2::Subnet" && e.logical_name.starts_with("Private")
        }))
        .phase(ProgressPhase::new("Route tables", 4, |e| {
            e.logical_name.contains("Route")
        }))
        .phase(ProgressPhase::new("ECS cluster", 1, |e| {
            e.resource_type == "AWS::ECS::Cluster"
        }))
        .phase(ProgressPhase::new("Application load balancer", 4, |e| {
            e.logical_name.contains("LoadBalancer")
                || e.resource_type.contains("ElasticLoadBalancingV2")
        }))
}

/// Brings up environments.
pub struct EnvInitWorkflow {
    registry: Arc<dyn ProjectRegistry>,
    credentials: Arc<dyn CredentialProvider>,
    identity: Arc<dyn IdentityResolver>,
    templater: Arc<dyn EnvironmentTemplater>,
    dns: Arc<dyn DnsDelegator>,
    coordinator: ChangeCoordinator,
    progress: Arc<dyn ProgressReporter>,
    settings: EnvironmentSettings,
}

impl EnvInitWorkflow {
    pub fn new(
        registry: Arc<dyn ProjectRegistry>,
        credentials: Arc<dyn CredentialProvider>,
        identity: Arc<dyn IdentityResolver>,
        templater: Arc<dyn EnvironmentTemplater>,
        dns: Arc<dyn DnsDelegator>,
        coordinator: ChangeCoordinator,
    ) -> Self {
        Self {
            registry,
            credentials,
            identity,
            templater,
            dns,
            coordinator,
            progress: Arc::new(TracingProgress),
            settings: EnvironmentSettings::default(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_settings(mut self, settings: EnvironmentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run the bring-up. Always returns a report; the outcome is in `result`.
    pub async fn run(&self, request: &EnvInitRequest) -> EnvInitReport {
        info!(
            "Starting environment bring-up: {} in project {}",
            request.env_name, request.project
        );

        let mut run = Run {
            steps: vec![EnvInitStep::Start],
            rows: Vec::new(),
        };
        let result = self.execute(request, &mut run).await;

        match &result {
            Ok(_) => {
                run.reach(EnvInitStep::Done);
                info!("Environment {} is ready", request.env_name);
            }
            Err(e) => {
                run.reach(EnvInitStep::Aborted);
                error!("Environment bring-up for {} aborted: {}", request.env_name, e);
            }
        }

        EnvInitReport {
            steps: run.steps,
            rows: run.rows,
            result,
        }
    }

    async fn execute(&self, request: &EnvInitRequest, run: &mut Run) -> DeployResult<EnvInitOutcome> {
        validate_environment_name(&request.env_name).map_err(DeployError::InvalidInput)?;

        let tools_ctx = self
            .credentials
            .default_context()
            .await
            .map_err(|source| DeployError::Credentials {
                context: "default".to_string(),
                source,
            })?;
        let env_ctx = self
            .credentials
            .from_profile(&request.profile)
            .await
            .map_err(|source| DeployError::Credentials {
                context: format!("profile {}", request.profile),
                source,
            })?;

        let project = self
            .registry
            .get_project(&request.project)
            .await
            .map_err(|source| DeployError::ProjectLookup {
                project: request.project.clone(),
                source,
            })?;
        run.reach(EnvInitStep::ProjectResolved);

        if project.requires_dns_delegation() {
            if self.delegate_dns(&project, &tools_ctx, &env_ctx).await? {
                run.reach(EnvInitStep::DnsDelegated);
            } else {
                run.reach(EnvInitStep::DnsSkipped);
            }
        }

        let tools_identity = self.resolve_identity(&tools_ctx).await?;
        let input = CreateEnvironmentInput {
            name: request.env_name.clone(),
            project: project.name.clone(),
            prod: request.prod,
            public_load_balancer: self.settings.public_load_balancer,
            tools_account_principal_arn: tools_identity.root_user_arn,
            project_dns_name: project.domain.clone(),
        };

        let stack_name = env_stack_name(&project.name, &request.env_name);
        let template = self
            .templater
            .render(&input)
            .map_err(|source| DeployError::Template {
                stack_name: stack_name.clone(),
                source,
            })?;
        let change = StackChangeRequest::new(&stack_name, template, ChangeKind::Create)
            .with_tags(stack_tags(&project.name, &request.env_name, None));

        match self.coordinator.apply_change(&env_ctx, &change).await {
            Ok(()) => run.reach(EnvInitStep::ChangeApplied),
            Err(e) if e.is_already_exists() => {
                run.reach(EnvInitStep::ChangeApplied);
                info!("Stack {} already exists, nothing to do", stack_name);
                return Ok(EnvInitOutcome::AlreadyExists { stack_name });
            }
            Err(source) => return Err(DeployError::ApplyChange { stack_name, source }),
        }

        let outputs = self.follow_stack(&env_ctx, &stack_name, run).await?;
        let environment = environment_from_outputs(&project, request, &outputs)?;
        run.reach(EnvInitStep::EventsStreamed);

        self.registry
            .link_environment_to_project(&project, &environment)
            .await
            .map_err(|source| DeployError::LinkToProject {
                project: project.name.clone(),
                env: environment.name.clone(),
                source,
            })?;
        run.reach(EnvInitStep::LinkedToProject);

        self.registry
            .create_environment(&environment)
            .await
            .map_err(|source| DeployError::Persist {
                project: project.name.clone(),
                env: environment.name.clone(),
                source,
            })?;
        run.reach(EnvInitStep::Persisted);

        Ok(EnvInitOutcome::Created(environment))
    }

    async fn delegate_dns(
        &self,
        project: &Project,
        tools_ctx: &CredentialContext,
        env_ctx: &CredentialContext,
    ) -> DeployResult<bool> {
        let env_identity = self.resolve_identity(env_ctx).await?;
        if env_identity.account == project.account_id {
            debug!(
                "Environment account {} owns project {}, no DNS delegation needed",
                env_identity.account, project.name
            );
            return Ok(false);
        }

        info!(
            "Delegating DNS of project {} to account {}",
            project.name, env_identity.account
        );
        self.dns
            .delegate_permissions(tools_ctx, project, &env_identity.account)
            .await
            .map_err(|source| DeployError::DnsDelegation {
                project: project.name.clone(),
                account_id: env_identity.account.clone(),
                source,
            })?;
        Ok(true)
    }

    async fn resolve_identity(&self, context: &CredentialContext) -> DeployResult<keel_core::Identity> {
        self.identity
            .get(context)
            .await
            .map_err(|source| DeployError::Identity {
                context: context.to_string(),
                source,
            })
    }

    async fn follow_stack(
        &self,
        env_ctx: &CredentialContext,
        stack_name: &str,
        run: &mut Run,
    ) -> DeployResult<StackOutputs> {
        let table = environment_phases();
        let stream = self.coordinator.stream(env_ctx, stack_name);
        let progress = &self.progress;

        progress.start(&format!("Provisioning stack {}", stack_name));
        let correlation = correlate(&table, stream, |rows| progress.rows(rows)).await;
        run.rows = correlation.rows;

        match correlation.outcome {
            Ok(outputs) => {
                progress.stop(&format!("Stack {} provisioned", stack_name), true);
                Ok(outputs)
            }
            Err(source) => {
                progress.stop(&format!("Stack {} failed", stack_name), false);
                Err(DeployError::Stream {
                    stack_name: stack_name.to_string(),
                    source,
                })
            }
        }
    }
}

impl std::fmt::Debug for EnvInitWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvInitWorkflow")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

struct Run {
    steps: Vec<EnvInitStep>,
    rows: Vec<PhaseRow>,
}

impl Run {
    fn reach(&mut self, step: EnvInitStep) {
        debug!("Environment bring-up reached: {}", step);
        self.steps.push(step);
    }
}

fn environment_from_outputs(
    project: &Project,
    request: &EnvInitRequest,
    outputs: &StackOutputs,
) -> DeployResult<Environment> {
    let stream_error = |source| DeployError::Stream {
        stack_name: outputs.stack_name.clone(),
        source,
    };
    let manager_role_arn = outputs.require(MANAGER_ROLE_OUTPUT).map_err(stream_error)?;
    let execution_role_arn = outputs.require(EXECUTION_ROLE_OUTPUT).map_err(stream_error)?;

    Ok(Environment {
        project: project.name.clone(),
        name: request.env_name.clone(),
        account_id: outputs.account_id.clone(),
        region: outputs.region.clone(),
        manager_role_arn: manager_role_arn.to_string(),
        execution_role_arn: execution_role_arn.to_string(),
        prod: request.prod,
    })
}
