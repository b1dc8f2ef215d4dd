//! Deterministic credential and identity resolvers for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::credentials::{CredentialContext, CredentialProvider, Identity, IdentityResolver};

/// Credential provider that builds contexts without contacting anything.
///
/// Every resolution is recorded as a short description (`default`,
/// `default@region`, `role:arn@region`, `profile:name`).
#[derive(Clone, Default)]
pub struct StaticCredentials {
    missing_profiles: Arc<RwLock<HashSet<String>>>,
    resolved: Arc<RwLock<Vec<String>>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make resolution of `profile` fail as if it were not configured.
    pub fn without_profile(self, profile: impl Into<String>) -> Self {
        self.missing_profiles.write().insert(profile.into());
        self
    }

    /// Contexts resolved so far, in order.
    pub fn resolved(&self) -> Vec<String> {
        self.resolved.read().clone()
    }

    fn record(&self, context: CredentialContext) -> CredentialContext {
        self.resolved.write().push(context.to_string());
        context
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials").finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn default_context(&self) -> anyhow::Result<CredentialContext> {
        Ok(self.record(CredentialContext::default_chain()))
    }

    async fn default_with_region(&self, region: &str) -> anyhow::Result<CredentialContext> {
        Ok(self.record(CredentialContext::default_chain().with_region(region)))
    }

    async fn from_role(&self, role_arn: &str, region: &str) -> anyhow::Result<CredentialContext> {
        Ok(self.record(CredentialContext::assumed_role(role_arn, region)))
    }

    async fn from_profile(&self, profile: &str) -> anyhow::Result<CredentialContext> {
        if self.missing_profiles.read().contains(profile) {
            return Err(anyhow!("profile {} is not configured", profile));
        }
        Ok(self.record(CredentialContext::profile(profile)))
    }
}

/// Identity resolver answering from a fixed table.
///
/// Contexts without an explicit entry resolve to the default account.
#[derive(Clone)]
pub struct StaticIdentity {
    default_account: String,
    accounts: Arc<RwLock<HashMap<CredentialContext, String>>>,
}

impl StaticIdentity {
    pub fn new(default_account: impl Into<String>) -> Self {
        Self {
            default_account: default_account.into(),
            accounts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve `context` to `account`.
    pub fn with_account(self, context: CredentialContext, account: impl Into<String>) -> Self {
        self.accounts.write().insert(context, account.into());
        self
    }
}

impl std::fmt::Debug for StaticIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticIdentity")
            .field("default_account", &self.default_account)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn get(&self, context: &CredentialContext) -> anyhow::Result<Identity> {
        let account = self
            .accounts
            .read()
            .get(context)
            .cloned()
            .unwrap_or_else(|| self.default_account.clone());
        Ok(Identity::new(account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_credentials_record_resolutions() {
        let credentials = StaticCredentials::new().without_profile("ghost");

        credentials.default_with_region("us-west-2").await.unwrap();
        credentials.from_role("arn:aws:iam::2:role/m", "us-west-2").await.unwrap();
        assert!(credentials.from_profile("ghost").await.is_err());

        assert_eq!(
            credentials.resolved(),
            vec!["default@us-west-2", "role:arn:aws:iam::2:role/m@us-west-2"]
        );
    }

    #[tokio::test]
    async fn test_static_identity_per_context() {
        let identity = StaticIdentity::new("111111111111")
            .with_account(CredentialContext::profile("test"), "222222222222");

        let tools = identity.get(&CredentialContext::default_chain()).await.unwrap();
        let env = identity.get(&CredentialContext::profile("test")).await.unwrap();

        assert_eq!(tools.account, "111111111111");
        assert_eq!(env.root_user_arn, "arn:aws:iam::222222222222:root");
    }
}
