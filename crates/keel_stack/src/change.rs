//! Applying rendered templates as named change sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use keel_core::CredentialContext;

use crate::backend::{ChangeKind, EventStream, StackBackend};
use crate::error::{StackError, StackResult};

/// Generate a change-set name that is unique per call.
///
/// A fresh suffix keeps a retry from colliding with the change set left
/// behind by an earlier failed attempt on the same stack.
pub fn generate_change_set_name(stack_name: &str) -> String {
    format!("{}-{}", stack_name, Uuid::new_v4())
}

/// A change against one stack, built per invocation and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackChangeRequest {
    pub stack_name: String,
    pub change_set_name: String,
    /// Rendered template body
    pub template: String,
    /// Role the backend assumes to execute the change set
    pub execution_role_arn: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub kind: ChangeKind,
}

impl StackChangeRequest {
    /// Create a request with a freshly generated change-set name.
    pub fn new(stack_name: impl Into<String>, template: impl Into<String>, kind: ChangeKind) -> Self {
        let stack_name = stack_name.into();
        let change_set_name = generate_change_set_name(&stack_name);
        Self {
            stack_name,
            change_set_name,
            template: template.into(),
            execution_role_arn: None,
            tags: BTreeMap::new(),
            kind,
        }
    }

    pub fn with_execution_role(mut self, role_arn: impl Into<String>) -> Self {
        self.execution_role_arn = Some(role_arn.into());
        self
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    fn validate(&self) -> StackResult<()> {
        if self.stack_name.trim().is_empty() {
            return Err(StackError::InvalidRequest("stack name must not be empty".to_string()));
        }
        if self.change_set_name.trim().is_empty() {
            return Err(StackError::InvalidRequest(format!(
                "change set name for stack {} must not be empty",
                self.stack_name
            )));
        }
        Ok(())
    }
}

/// Submits change sets to the backend and hands out event streams.
///
/// Holds no state of its own and never retries; callers decide what an
/// error means for them.
#[derive(Clone)]
pub struct ChangeCoordinator {
    backend: Arc<dyn StackBackend>,
}

impl ChangeCoordinator {
    pub fn new(backend: Arc<dyn StackBackend>) -> Self {
        Self { backend }
    }

    /// Submit `request` under `context`.
    ///
    /// Success means the backend accepted the change set; the change itself is
    /// observed through [`ChangeCoordinator::stream`]. `AlreadyExists` is
    /// returned as-is so callers can treat it as an idempotency signal; every
    /// other rejection is wrapped with the stack and change-set names.
    pub async fn apply_change(
        &self,
        context: &CredentialContext,
        request: &StackChangeRequest,
    ) -> StackResult<()> {
        request.validate()?;

        info!(
            "Applying change set {} to stack {} ({:?}, context {})",
            request.change_set_name, request.stack_name, request.kind, context
        );

        match self.backend.create_change_set(context, request).await {
            Ok(()) => {
                debug!("Change set {} accepted", request.change_set_name);
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!("Stack {} already exists", request.stack_name);
                Err(e)
            }
            Err(e) => {
                warn!("Change set {} rejected: {}", request.change_set_name, e);
                Err(StackError::ChangeRejected {
                    stack_name: request.stack_name.clone(),
                    change_set_name: request.change_set_name.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Start watching a stack's provisioning events.
    pub fn stream(&self, context: &CredentialContext, stack_name: &str) -> EventStream {
        debug!("Streaming events for stack {} (context {})", stack_name, context);
        self.backend.stream_events(context, stack_name)
    }
}

impl std::fmt::Debug for ChangeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeCoordinator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedBackend;

    fn coordinator(backend: &ScriptedBackend) -> ChangeCoordinator {
        ChangeCoordinator::new(Arc::new(backend.clone()))
    }

    #[test]
    fn test_change_set_names_are_unique() {
        let first = generate_change_set_name("shop-test-frontend");
        let second = generate_change_set_name("shop-test-frontend");
        assert!(first.starts_with("shop-test-frontend-"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_apply_change_submits_request() {
        let backend = ScriptedBackend::new();
        let ctx = CredentialContext::profile("test");
        let request = StackChangeRequest::new("shop-test", "{}", ChangeKind::Create)
            .with_execution_role("arn:aws:iam::1:role/exec")
            .with_tag("keel-project", "shop");

        coordinator(&backend).apply_change(&ctx, &request).await.unwrap();

        let changes = backend.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].context, ctx);
        assert_eq!(changes[0].request, request);
    }

    #[tokio::test]
    async fn test_apply_change_rejects_empty_names() {
        let backend = ScriptedBackend::new();
        let ctx = CredentialContext::default_chain();

        let request = StackChangeRequest::new("", "{}", ChangeKind::Create);
        let err = coordinator(&backend).apply_change(&ctx, &request).await.unwrap_err();
        assert!(matches!(err, StackError::InvalidRequest(_)));

        let mut request = StackChangeRequest::new("shop-test", "{}", ChangeKind::Create);
        request.change_set_name = String::new();
        let err = coordinator(&backend).apply_change(&ctx, &request).await.unwrap_err();
        assert!(matches!(err, StackError::InvalidRequest(_)));

        assert!(backend.changes().is_empty());
    }

    #[tokio::test]
    async fn test_already_exists_is_passed_through() {
        let backend = ScriptedBackend::new().with_existing_stack("shop-test");
        let ctx = CredentialContext::default_chain();
        let request = StackChangeRequest::new("shop-test", "{}", ChangeKind::Create);

        let err = coordinator(&backend).apply_change(&ctx, &request).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_update_of_existing_stack_succeeds() {
        let backend = ScriptedBackend::new().with_existing_stack("shop-test-frontend");
        let ctx = CredentialContext::default_chain();
        let request = StackChangeRequest::new("shop-test-frontend", "{}", ChangeKind::CreateOrUpdate);

        coordinator(&backend).apply_change(&ctx, &request).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejection_is_wrapped_with_stack_name() {
        let backend = ScriptedBackend::new().simulate_rejection("Template format error");
        let ctx = CredentialContext::default_chain();
        let request = StackChangeRequest::new("shop-test", "{}", ChangeKind::Create);

        let err = coordinator(&backend).apply_change(&ctx, &request).await.unwrap_err();
        match &err {
            StackError::ChangeRejected {
                stack_name,
                change_set_name,
                ..
            } => {
                assert_eq!(stack_name, "shop-test");
                assert_eq!(change_set_name, &request.change_set_name);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("Template format error"));
    }
}
