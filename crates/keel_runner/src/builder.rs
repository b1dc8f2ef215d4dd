//! Image builder contract.

use std::path::Path;

use async_trait::async_trait;

use crate::error::RunnerResult;

/// Short-lived registry credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

impl RegistryAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Full image reference for a repository URI and tag.
pub fn image_reference(uri: &str, tag: &str) -> String {
    format!("{}:{}", uri, tag)
}

/// Builds container images and publishes them to a registry.
///
/// Calls are made in the order build, login, push.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build the Dockerfile in `dockerfile_dir` as `uri:tag`.
    async fn build(&self, uri: &str, tag: &str, dockerfile_dir: &Path) -> RunnerResult<()>;

    /// Authenticate against the registry hosting `uri`.
    async fn login(&self, uri: &str, auth: &RegistryAuth) -> RunnerResult<()>;

    /// Push `uri:tag`.
    async fn push(&self, uri: &str, tag: &str) -> RunnerResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_reference() {
        assert_eq!(
            image_reference("1.dkr.ecr.us-west-2.amazonaws.com/shop/frontend", "v1"),
            "1.dkr.ecr.us-west-2.amazonaws.com/shop/frontend:v1"
        );
    }

    #[test]
    fn test_auth_debug_hides_password() {
        let auth = RegistryAuth::new("AWS", "secret-token");
        let printed = format!("{:?}", auth);
        assert!(printed.contains("AWS"));
        assert!(!printed.contains("secret-token"));
    }
}
