//! Raw provisioning events reported by the stack backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse status of a resource event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    InProgress,
    Complete,
    Failed,
    /// Anything else (deletes, rollbacks, skipped resources)
    Other,
}

impl ResourceStatus {
    /// Map a backend status string such as `CREATE_COMPLETE`.
    pub fn from_backend(status: &str) -> Self {
        let status = status.to_ascii_uppercase();
        if status.contains("FAILED") {
            Self::Failed
        } else if status.contains("ROLLBACK") || status.starts_with("DELETE") {
            Self::Other
        } else if status.ends_with("_COMPLETE") {
            Self::Complete
        } else if status.ends_with("_IN_PROGRESS") {
            Self::InProgress
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One resource-level event from the backend.
///
/// Events arrive roughly in timestamp order but may repeat or skip resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisioningEvent {
    /// Backend resource type, e.g. `AWS::EC2::VPC`
    pub resource_type: String,
    /// Logical resource name inside the template
    pub logical_name: String,
    pub status: ResourceStatus,
    pub status_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProvisioningEvent {
    pub fn new(
        resource_type: impl Into<String>,
        logical_name: impl Into<String>,
        status: ResourceStatus,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            logical_name: logical_name.into(),
            status,
            status_reason: None,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a `Complete` event.
    pub fn complete(resource_type: impl Into<String>, logical_name: impl Into<String>) -> Self {
        Self::new(resource_type, logical_name, ResourceStatus::Complete)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.status_reason = Some(reason.into());
        self
    }
}
