//! # keel_runner
//!
//! Container image builds for application deploys.
//!
//! # Features
//!
//! - **Builder contract**: build, registry login and push behind [`ImageBuilder`]
//! - **CLI builder**: Docker or Podman, auto-detected, with dry-run
//! - **Recording builder**: captures calls for tests without a container runtime

pub mod builder;
pub mod cli;
pub mod error;
pub mod mock;

pub use builder::{image_reference, ImageBuilder, RegistryAuth};
pub use cli::{ContainerRuntime, DockerCli, DockerCliOptions};
pub use error::{RunnerError, RunnerResult};
pub use mock::{BuilderCall, RecordingBuilder};
