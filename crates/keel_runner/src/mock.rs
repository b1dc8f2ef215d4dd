//! Recording image builder for testing.
//!
//! Captures every call in order and can be told to fail a single step, so
//! deploy workflows can be tested without Docker or Podman.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::builder::{image_reference, ImageBuilder, RegistryAuth};
use crate::error::{RunnerError, RunnerResult};

/// A call made against the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderCall {
    Build {
        image: String,
        dockerfile_dir: PathBuf,
    },
    Login {
        uri: String,
        username: String,
    },
    Push {
        image: String,
    },
}

impl BuilderCall {
    /// Method name of the call ("build", "login" or "push").
    pub fn method(&self) -> &'static str {
        match self {
            Self::Build { .. } => "build",
            Self::Login { .. } => "login",
            Self::Push { .. } => "push",
        }
    }
}

/// Image builder that records calls instead of running a container runtime.
#[derive(Clone, Default)]
pub struct RecordingBuilder {
    calls: Arc<RwLock<Vec<BuilderCall>>>,
    /// Method name and message of a simulated failure.
    failure: Arc<RwLock<Option<(String, String)>>>,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail calls to `method` ("build", "login" or "push") with `message`.
    pub fn simulate_failure(self, method: impl Into<String>, message: impl Into<String>) -> Self {
        *self.failure.write() = Some((method.into(), message.into()));
        self
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<BuilderCall> {
        self.calls.read().clone()
    }

    /// Method names of the calls made so far.
    pub fn methods(&self) -> Vec<&'static str> {
        self.calls.read().iter().map(BuilderCall::method).collect()
    }

    fn failure_for(&self, method: &str) -> Option<String> {
        self.failure
            .read()
            .as_ref()
            .filter(|(m, _)| m == method)
            .map(|(_, message)| message.clone())
    }
}

impl std::fmt::Debug for RecordingBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingBuilder")
            .field("calls", &self.calls.read().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ImageBuilder for RecordingBuilder {
    async fn build(&self, uri: &str, tag: &str, dockerfile_dir: &Path) -> RunnerResult<()> {
        let image = image_reference(uri, tag);
        self.calls.write().push(BuilderCall::Build {
            image: image.clone(),
            dockerfile_dir: dockerfile_dir.to_path_buf(),
        });
        match self.failure_for("build") {
            Some(message) => Err(RunnerError::BuildFailed { image, message }),
            None => Ok(()),
        }
    }

    async fn login(&self, uri: &str, auth: &RegistryAuth) -> RunnerResult<()> {
        self.calls.write().push(BuilderCall::Login {
            uri: uri.to_string(),
            username: auth.username.clone(),
        });
        match self.failure_for("login") {
            Some(message) => Err(RunnerError::LoginFailed {
                registry: uri.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }

    async fn push(&self, uri: &str, tag: &str) -> RunnerResult<()> {
        let image = image_reference(uri, tag);
        self.calls.write().push(BuilderCall::Push { image: image.clone() });
        match self.failure_for("push") {
            Some(message) => Err(RunnerError::PushFailed { image, message }),
            None => Ok(()),
        }
    }
}
