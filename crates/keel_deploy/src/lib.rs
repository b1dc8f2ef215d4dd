//! # keel_deploy
//!
//! Deployment workflows for keel.
//!
//! # Workflows
//!
//! - **Environment bring-up** ([`EnvInitWorkflow`]): resolve the project,
//!   delegate DNS when needed, create the environment stack, follow its
//!   provisioning events, then link and persist the environment
//! - **Application deploy** ([`AppDeployWorkflow`]): build and push the
//!   image, package the template, apply it in the environment's account and
//!   resolve the endpoint
//!
//! Both return a report holding the steps reached and a single result.
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_deploy::{EnvInitRequest, EnvInitWorkflow};
//!
//! let workflow = EnvInitWorkflow::new(registry, credentials, identity, templater, dns, coordinator);
//! let report = workflow.run(&EnvInitRequest::new("shop", "test", "test-profile")).await;
//! println!("steps: {:?}", report.steps);
//! report.into_result()?;
//! ```

pub mod app_deploy;
pub mod collaborators;
pub mod env_init;
pub mod error;
pub mod progress;

pub use app_deploy::{AppDeployOutcome, AppDeployReport, AppDeployRequest, AppDeployStep, AppDeployWorkflow};
pub use collaborators::{
    CreateEnvironmentInput, DnsDelegator, EndpointDescriber, EnvironmentTemplater, ImageRepository,
    PackageRequest, TemplatePackager,
};
pub use env_init::{
    environment_phases, EnvInitOutcome, EnvInitReport, EnvInitRequest, EnvInitStep, EnvInitWorkflow,
    EXECUTION_ROLE_OUTPUT, MANAGER_ROLE_OUTPUT,
};
pub use error::{DeployError, DeployResult};
pub use progress::{ProgressReporter, TracingProgress};
