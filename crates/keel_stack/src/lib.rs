//! # keel_stack
//!
//! Change coordination and event correlation against a change-set based
//! stack backend.
//!
//! ## Features
//!
//! - Named, uniquely identified change sets applied through [`ChangeCoordinator`]
//! - Provisioning event streams delivered over a channel pair
//! - Projection of raw resource events onto ordered progress phases
//! - A scripted backend for exercising workflows without a real provisioner
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_stack::{correlate, PhaseTable, ProgressPhase};
//!
//! let table = PhaseTable::new()
//!     .phase(ProgressPhase::new("Network", 1, |e| e.resource_type == "AWS::EC2::VPC"))
//!     .phase(ProgressPhase::new("Cluster", 1, |e| e.resource_type == "AWS::ECS::Cluster"));
//!
//! let stream = coordinator.stream(&context, "shop-test");
//! let correlation = correlate(&table, stream, |rows| render(rows)).await;
//! let outputs = correlation.outcome?;
//! ```

pub mod backend;
pub mod change;
pub mod correlator;
pub mod error;
pub mod event;
pub mod mock;
pub mod naming;

pub use backend::{ChangeKind, EventSink, EventStream, StackBackend, StackOutputs};
pub use change::{generate_change_set_name, ChangeCoordinator, StackChangeRequest};
pub use correlator::{correlate, Correlation, EventCorrelator, PhaseRow, PhaseStatus, PhaseTable, ProgressPhase};
pub use error::{StackError, StackResult};
pub use event::{ProvisioningEvent, ResourceStatus};
pub use mock::{CapturedChange, ScriptedBackend, ScriptedOutcome};
pub use naming::{app_stack_name, env_stack_name, stack_tags, APP_TAG_KEY, ENV_TAG_KEY, PROJECT_TAG_KEY};
