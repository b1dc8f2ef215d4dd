//! Scripted stack backend for testing.
//!
//! Captures every change set and stream request and replays predefined
//! event sequences, so workflows can be exercised without a real
//! provisioning service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::RwLock;

use keel_core::{CredentialContext, StreamSettings};

use crate::backend::{ChangeKind, EventStream, StackBackend, StackOutputs};
use crate::change::StackChangeRequest;
use crate::error::{StackError, StackResult};
use crate::event::ProvisioningEvent;

/// Terminal result replayed after a scripted event sequence.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Success(StackOutputs),
    /// Reported as `StackError::StreamFailed` with this reason
    Failure(String),
}

/// A change set submitted to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedChange {
    pub context: CredentialContext,
    pub request: StackChangeRequest,
}

#[derive(Debug, Clone)]
struct ScriptedStream {
    events: Vec<ProvisioningEvent>,
    outcome: ScriptedOutcome,
}

/// Stack backend that replays scripted streams.
#[derive(Clone)]
pub struct ScriptedBackend {
    /// Stacks that already exist.
    existing: Arc<RwLock<HashSet<String>>>,
    /// Rejection returned for every change set.
    rejection: Arc<RwLock<Option<String>>>,
    /// Report every change set as targeting an existing stack.
    conflict: Arc<RwLock<bool>>,
    /// Streams keyed by stack name.
    scripts: Arc<RwLock<HashMap<String, ScriptedStream>>>,
    changes: Arc<RwLock<Vec<CapturedChange>>>,
    streams: Arc<RwLock<Vec<(CredentialContext, String)>>>,
    buffer: usize,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            existing: Arc::new(RwLock::new(HashSet::new())),
            rejection: Arc::new(RwLock::new(None)),
            conflict: Arc::new(RwLock::new(false)),
            scripts: Arc::new(RwLock::new(HashMap::new())),
            changes: Arc::new(RwLock::new(Vec::new())),
            streams: Arc::new(RwLock::new(Vec::new())),
            buffer: 16,
        }
    }

    /// Size scripted streams from configuration.
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self::new().with_buffer(settings.event_buffer)
    }

    /// Mark a stack as already present.
    pub fn with_existing_stack(self, stack_name: impl Into<String>) -> Self {
        self.existing.write().insert(stack_name.into());
        self
    }

    /// Reject every change set with `message`.
    pub fn simulate_rejection(self, message: impl Into<String>) -> Self {
        *self.rejection.write() = Some(message.into());
        self
    }

    /// Fail every change set with `StackError::AlreadyExists`, whatever its kind.
    pub fn simulate_already_exists(self) -> Self {
        *self.conflict.write() = true;
        self
    }

    /// Script the stream returned for `stack_name`.
    pub fn script_stream(
        self,
        stack_name: impl Into<String>,
        events: Vec<ProvisioningEvent>,
        outcome: ScriptedOutcome,
    ) -> Self {
        self.scripts
            .write()
            .insert(stack_name.into(), ScriptedStream { events, outcome });
        self
    }

    /// Channel capacity used for scripted streams.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Change sets submitted so far, in order.
    pub fn changes(&self) -> Vec<CapturedChange> {
        self.changes.read().clone()
    }

    /// Stream requests made so far, in order.
    pub fn streams(&self) -> Vec<(CredentialContext, String)> {
        self.streams.read().clone()
    }

    pub fn stack_exists(&self, stack_name: &str) -> bool {
        self.existing.read().contains(stack_name)
    }
}

impl std::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedBackend")
            .field("existing", &*self.existing.read())
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StackBackend for ScriptedBackend {
    async fn create_change_set(
        &self,
        context: &CredentialContext,
        request: &StackChangeRequest,
    ) -> StackResult<()> {
        self.changes.write().push(CapturedChange {
            context: context.clone(),
            request: request.clone(),
        });

        if let Some(message) = self.rejection.read().clone() {
            return Err(StackError::Backend(anyhow!(message)));
        }
        if *self.conflict.read() {
            return Err(StackError::AlreadyExists {
                stack_name: request.stack_name.clone(),
            });
        }

        let mut existing = self.existing.write();
        if request.kind == ChangeKind::Create && existing.contains(&request.stack_name) {
            return Err(StackError::AlreadyExists {
                stack_name: request.stack_name.clone(),
            });
        }
        existing.insert(request.stack_name.clone());
        Ok(())
    }

    fn stream_events(&self, context: &CredentialContext, stack_name: &str) -> EventStream {
        self.streams
            .write()
            .push((context.clone(), stack_name.to_string()));

        let script = self.scripts.read().get(stack_name).cloned();
        let (sink, stream) = EventStream::channel(stack_name, self.buffer);
        let stack_name = stack_name.to_string();

        tokio::spawn(async move {
            let Some(script) = script else {
                sink.finish(Err(StackError::Backend(anyhow!(
                    "no scripted stream for stack {}",
                    stack_name
                ))));
                return;
            };

            for event in script.events {
                if !sink.send(event).await {
                    return;
                }
            }

            let result = match script.outcome {
                ScriptedOutcome::Success(outputs) => Ok(outputs),
                ScriptedOutcome::Failure(reason) => Err(StackError::StreamFailed { stack_name, reason }),
            };
            sink.finish(result);
        });

        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_marks_stack_existing() {
        let backend = ScriptedBackend::new();
        let ctx = CredentialContext::default_chain();
        let request = StackChangeRequest::new("shop-test", "{}", ChangeKind::Create);

        backend.create_change_set(&ctx, &request).await.unwrap();
        assert!(backend.stack_exists("shop-test"));

        let again = StackChangeRequest::new("shop-test", "{}", ChangeKind::Create);
        let err = backend.create_change_set(&ctx, &again).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(backend.changes().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_stream_replays_events() {
        let backend = ScriptedBackend::new().script_stream(
            "shop-test",
            vec![
                ProvisioningEvent::complete("AWS::EC2::VPC", "VPC"),
                ProvisioningEvent::complete("AWS::ECS::Cluster", "Cluster"),
            ],
            ScriptedOutcome::Success(StackOutputs::new("shop-test", "1", "us-west-2")),
        );
        let ctx = CredentialContext::profile("test");

        let mut stream = backend.stream_events(&ctx, "shop-test");
        let mut received = Vec::new();
        while let Some(event) = stream.events.recv().await {
            received.push(event.logical_name);
        }

        assert_eq!(received, vec!["VPC", "Cluster"]);
        assert!(stream.outcome.await.unwrap().is_ok());
        assert_eq!(backend.streams(), vec![(ctx, "shop-test".to_string())]);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let backend = ScriptedBackend::new().script_stream(
            "shop-test",
            Vec::new(),
            ScriptedOutcome::Failure("ROLLBACK_COMPLETE".to_string()),
        );

        let stream = backend.stream_events(&CredentialContext::default_chain(), "shop-test");
        let err = stream.outcome.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("ROLLBACK_COMPLETE"));
    }

    #[tokio::test]
    async fn test_buffer_from_settings_bounds_the_event_channel() {
        let settings = StreamSettings { event_buffer: 2 };
        let events: Vec<ProvisioningEvent> = (0..5)
            .map(|i| ProvisioningEvent::complete("AWS::EC2::Subnet", format!("Subnet{}", i)))
            .collect();
        let backend = ScriptedBackend::from_settings(&settings).script_stream(
            "shop-test",
            events,
            ScriptedOutcome::Success(StackOutputs::new("shop-test", "1", "us-west-2")),
        );
        assert_eq!(backend.buffer(), 2);

        let mut stream = backend.stream_events(&CredentialContext::default_chain(), "shop-test");
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        // The replay task is parked on a full channel until the receiver drains it.
        assert_eq!(stream.events.try_recv().unwrap().logical_name, "Subnet0");
        assert_eq!(stream.events.try_recv().unwrap().logical_name, "Subnet1");
        assert!(stream.events.try_recv().is_err());

        let mut rest = Vec::new();
        while let Some(event) = stream.events.recv().await {
            rest.push(event.logical_name);
        }
        assert_eq!(rest, vec!["Subnet2", "Subnet3", "Subnet4"]);
        assert!(stream.outcome.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_simulated_conflict_applies_to_every_kind() {
        let backend = ScriptedBackend::new().simulate_already_exists();
        let ctx = CredentialContext::default_chain();

        for kind in [ChangeKind::Create, ChangeKind::CreateOrUpdate] {
            let request = StackChangeRequest::new("shop-test-frontend", "{}", kind);
            let err = backend.create_change_set(&ctx, &request).await.unwrap_err();
            assert!(err.is_already_exists());
        }
        assert!(!backend.stack_exists("shop-test-frontend"));
    }

    #[tokio::test]
    async fn test_unscripted_stream_fails() {
        let backend = ScriptedBackend::new();
        let stream = backend.stream_events(&CredentialContext::default_chain(), "unknown");
        let err = stream.outcome.await.unwrap().unwrap_err();
        assert!(matches!(err, StackError::Backend(_)));
    }
}
