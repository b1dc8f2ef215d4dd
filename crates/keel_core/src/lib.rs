//! # keel_core
//!
//! Shared model for the keel deployment engine.
//!
//! This crate holds the records the workflows operate on and the contracts
//! for the collaborators that own them.
//!
//! # Architecture
//!
//! - **Model**: Projects, environments and applications
//! - **Credentials**: Explicit credential contexts passed to every backend call
//! - **Registry**: Where project and environment records live
//! - **Config**: Workspace settings loaded from YAML
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_core::{MemoryRegistry, Project, ProjectRegistry};
//!
//! let registry = MemoryRegistry::new();
//! registry.add_project(Project::new("shop", "111122223333")).await;
//!
//! let project = registry.get_project("shop").await?;
//! assert!(!project.requires_dns_delegation());
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod mock;
pub mod model;
pub mod registry;
pub mod validate;

pub use config::{EnvironmentSettings, KeelConfig, RunnerSettings, StreamSettings};
pub use credentials::{CredentialContext, CredentialProvider, CredentialSource, Identity, IdentityResolver};
pub use error::{CoreError, CoreResult};
pub use mock::{StaticCredentials, StaticIdentity};
pub use model::{Application, Environment, Project};
pub use registry::{MemoryRegistry, ProjectRegistry};
pub use validate::{validate_application_name, validate_environment_name};
