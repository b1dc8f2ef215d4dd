//! Stack backend contract.
//!
//! The backend accepts change sets and reports what it does with them as a
//! stream of [`ProvisioningEvent`]s. A stream is a channel pair: events on an
//! `mpsc` channel, then exactly one terminal result on a `oneshot` channel.
//! The producer closes the event channel before sending the result, so every
//! event is delivered before the result is final.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use keel_core::CredentialContext;

use crate::change::StackChangeRequest;
use crate::error::{StackError, StackResult};
use crate::event::ProvisioningEvent;

/// How the backend reconciles a change set with the current stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Create a new stack; fails with `AlreadyExists` if the stack is present
    Create,
    /// Create the stack or update it in place
    CreateOrUpdate,
}

/// Values exported by a stack once it reaches a terminal state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackOutputs {
    pub stack_name: String,
    pub account_id: String,
    pub region: String,
    pub outputs: HashMap<String, String>,
}

impl StackOutputs {
    pub fn new(
        stack_name: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            account_id: account_id.into(),
            region: region.into(),
            outputs: HashMap::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(|s| s.as_str())
    }

    /// Get an output that must be present.
    pub fn require(&self, key: &str) -> StackResult<&str> {
        self.get(key).ok_or_else(|| StackError::MissingOutput {
            stack_name: self.stack_name.clone(),
            key: key.to_string(),
        })
    }
}

/// Consumer half of a provisioning event stream.
#[derive(Debug)]
pub struct EventStream {
    pub stack_name: String,
    pub events: mpsc::Receiver<ProvisioningEvent>,
    pub outcome: oneshot::Receiver<StackResult<StackOutputs>>,
}

impl EventStream {
    /// Create a connected sink/stream pair.
    pub fn channel(stack_name: impl Into<String>, buffer: usize) -> (EventSink, EventStream) {
        let (event_tx, event_rx) = mpsc::channel(buffer.max(1));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let stream = EventStream {
            stack_name: stack_name.into(),
            events: event_rx,
            outcome: outcome_rx,
        };
        let sink = EventSink {
            events: event_tx,
            outcome: outcome_tx,
        };
        (sink, stream)
    }
}

/// Producer half of a provisioning event stream, owned by a watcher task.
#[derive(Debug)]
pub struct EventSink {
    events: mpsc::Sender<ProvisioningEvent>,
    outcome: oneshot::Sender<StackResult<StackOutputs>>,
}

impl EventSink {
    /// Send one event. Returns `false` once the consumer has gone away.
    pub async fn send(&self, event: ProvisioningEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Close the event channel, then deliver the terminal result.
    pub fn finish(self, result: StackResult<StackOutputs>) {
        let EventSink { events, outcome } = self;
        drop(events);
        // The consumer may already have stopped listening.
        let _ = outcome.send(result);
    }
}

/// Change-set based stack provisioner.
#[async_trait]
pub trait StackBackend: Send + Sync {
    /// Submit a change set. Returns once the backend has accepted it.
    async fn create_change_set(
        &self,
        context: &CredentialContext,
        request: &StackChangeRequest,
    ) -> StackResult<()>;

    /// Start watching a stack until it reaches a terminal state.
    fn stream_events(&self, context: &CredentialContext, stack_name: &str) -> EventStream;
}
